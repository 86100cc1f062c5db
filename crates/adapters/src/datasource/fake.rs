// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted data source for tests and local runs.

use super::{DataSource, DataSourceError, DataTable};
use async_trait::async_trait;
use convoy_runbook::DataSourceDef;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct Script {
    /// One-shot results consumed in order
    queued: VecDeque<Result<DataTable, String>>,
    /// Returned once the queue is empty
    sticky: DataTable,
}

/// Fake data source keyed by query string.
///
/// Queued results are consumed one per tick; after the queue drains the
/// sticky table keeps being returned, so a test can script "tick 1 sees
/// {u1, u2}, every later tick sees {u2, u3}".
#[derive(Clone, Default)]
pub struct FakeDataSource {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
}

impl FakeDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the result every query of this string returns once the
    /// queued results are exhausted.
    pub fn set_rows(&self, query: &str, rows: &[serde_json::Value]) {
        let mut scripts = self.scripts.lock();
        scripts.entry(query.to_string()).or_default().sticky = DataTable::from_json_rows(rows);
    }

    /// Queue a one-shot result for the next query of this string.
    pub fn push_rows(&self, query: &str, rows: &[serde_json::Value]) {
        let mut scripts = self.scripts.lock();
        scripts
            .entry(query.to_string())
            .or_default()
            .queued
            .push_back(Ok(DataTable::from_json_rows(rows)));
    }

    /// Queue a one-shot failure for the next query of this string.
    pub fn push_error(&self, query: &str, message: &str) {
        let mut scripts = self.scripts.lock();
        scripts
            .entry(query.to_string())
            .or_default()
            .queued
            .push_back(Err(message.to_string()));
    }
}

#[async_trait]
impl DataSource for FakeDataSource {
    async fn query(&self, source: &DataSourceDef) -> Result<DataTable, DataSourceError> {
        let mut scripts = self.scripts.lock();
        let script = scripts.entry(source.query.clone()).or_default();
        match script.queued.pop_front() {
            Some(Ok(table)) => {
                // Consumed one-shots become the new sticky result so
                // later ticks see the same population
                script.sticky = table.clone();
                Ok(table)
            }
            Some(Err(message)) => Err(DataSourceError::Query(message)),
            None => Ok(script.sticky.clone()),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
