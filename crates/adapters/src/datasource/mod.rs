// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Member data source abstraction.
//!
//! Concrete clients (SQL, Graph, LDAP, CSV drops) are integration
//! concerns; the scheduler only needs "run this runbook's query and
//! give me rows".

pub mod fake;
mod file;

pub use file::JsonFileDataSource;

use async_trait::async_trait;
use convoy_runbook::DataSourceDef;
use std::collections::HashMap;
use thiserror::Error;

/// Errors from data-source queries
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("connection env var '{0}' is not set")]
    MissingConnection(String),

    #[error("unsupported data source type '{0}'")]
    UnsupportedType(String),

    #[error("query failed: {0}")]
    Query(String),
}

/// An arbitrary query result: rows of column → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataTable {
    pub rows: Vec<HashMap<String, serde_json::Value>>,
}

impl DataTable {
    pub fn new(rows: Vec<HashMap<String, serde_json::Value>>) -> Self {
        Self { rows }
    }

    /// Build a table from JSON objects; non-object values are skipped.
    pub fn from_json_rows(rows: &[serde_json::Value]) -> Self {
        let rows = rows
            .iter()
            .filter_map(|row| row.as_object())
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .collect();
        Self { rows }
    }

    /// Union of column names across all rows.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .rows
            .iter()
            .flat_map(|row| row.keys().cloned())
            .collect();
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes a runbook's member query.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    async fn query(&self, source: &DataSourceDef) -> Result<DataTable, DataSourceError>;
}
