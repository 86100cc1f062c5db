// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed data source for single-host deployments.
//!
//! The runbook's `connection` names an env var holding a path to a JSON
//! file containing an array of row objects. Useful for CSV-drop style
//! migrations and local runs; networked clients (SQL, Graph, LDAP)
//! plug in behind the same trait.

use super::{DataSource, DataSourceError, DataTable};
use async_trait::async_trait;
use convoy_runbook::DataSourceDef;

#[derive(Clone, Default)]
pub struct JsonFileDataSource;

impl JsonFileDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource for JsonFileDataSource {
    async fn query(&self, source: &DataSourceDef) -> Result<DataTable, DataSourceError> {
        let path = std::env::var(&source.connection)
            .map_err(|_| DataSourceError::MissingConnection(source.connection.clone()))?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DataSourceError::Query(format!("read {}: {}", path, e)))?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&content)
            .map_err(|e| DataSourceError::Query(format!("parse {}: {}", path, e)))?;
        Ok(DataTable::from_json_rows(&rows))
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
