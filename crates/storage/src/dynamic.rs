// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-runbook-version mirror of data-source query results.
//!
//! Written exclusively by the scheduler. Rows are keyed by the member
//! key and carry the query columns plus the system columns
//! `_batch_time`, `_first_seen_at`, `_last_seen_at`, `_is_current`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One mirrored query row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicRow {
    pub member_key: String,
    pub batch_time: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// False once the key stops appearing in query results
    pub is_current: bool,
    pub columns: HashMap<String, serde_json::Value>,
}

/// The mirror table for one `(runbook, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicTable {
    pub name: String,
    /// Union of every column ever seen in query results
    columns: BTreeSet<String>,
    rows: BTreeMap<String, DynamicRow>,
}

impl DynamicTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: BTreeSet::new(),
            rows: BTreeMap::new(),
        }
    }

    /// Widen the schema to cover the given columns.
    pub fn ensure_columns<I, S>(&mut self, columns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            self.columns.insert(column.into());
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Insert or refresh a row. `_first_seen_at` is preserved across
    /// upserts; everything else reflects the latest query.
    pub fn upsert_row(
        &mut self,
        member_key: &str,
        batch_time: Option<DateTime<Utc>>,
        columns: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.ensure_columns(columns.keys().cloned());
        match self.rows.get_mut(member_key) {
            Some(row) => {
                row.batch_time = batch_time;
                row.last_seen_at = now;
                row.is_current = true;
                row.columns = columns;
            }
            None => {
                self.rows.insert(
                    member_key.to_string(),
                    DynamicRow {
                        member_key: member_key.to_string(),
                        batch_time,
                        first_seen_at: now,
                        last_seen_at: now,
                        is_current: true,
                        columns,
                    },
                );
            }
        }
    }

    /// Flip `_is_current` off for rows whose key no longer appears in
    /// the query. Returns how many rows were retired.
    pub fn retire_missing<'a>(&mut self, present: impl IntoIterator<Item = &'a str>) -> usize {
        let present: BTreeSet<&str> = present.into_iter().collect();
        let mut retired = 0;
        for row in self.rows.values_mut() {
            if row.is_current && !present.contains(row.member_key.as_str()) {
                row.is_current = false;
                retired += 1;
            }
        }
        retired
    }

    pub fn get(&self, member_key: &str) -> Option<&DynamicRow> {
        self.rows.get(member_key)
    }

    pub fn current_rows(&self) -> impl Iterator<Item = &DynamicRow> {
        self.rows.values().filter(|r| r.is_current)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[path = "dynamic_tests.rs"]
mod tests;
