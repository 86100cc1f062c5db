// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory runbook model deserialized from YAML.
//!
//! Fields are defaulted rather than required so that a missing key
//! surfaces as a located validation error instead of an opaque serde
//! failure. Unknown keys are ignored.

use convoy_core::{OnFailure, OverdueBehavior};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Data-source types the scheduler knows how to drive.
pub const RECOGNIZED_SOURCE_TYPES: &[&str] = &["sql", "csv", "graph", "ldap"];

/// Retry budget when a step declares no `retry` block.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base retry interval when a step declares no `retry` block.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 60;

/// How batch groups are derived from query rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTimeMode {
    /// Group rows by a timestamp column
    #[default]
    Column,
    /// All rows form one batch anchored at the current tick
    Immediate,
}

/// Normalization format for a multi-valued column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiValueFormat {
    SemicolonDelimited,
    CommaDelimited,
    JsonArray,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiValuedColumn {
    pub name: String,
    pub format: MultiValueFormat,
}

/// Where members come from and how they group into batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSourceDef {
    #[serde(default, rename = "type")]
    pub source_type: String,
    /// Name of the environment variable holding the connection string
    #[serde(default)]
    pub connection: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub primary_key: String,
    #[serde(default)]
    pub batch_time: BatchTimeMode,
    /// Required when `batch_time = column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_time_column: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_valued_columns: Vec<MultiValuedColumn>,
}

/// Polling configuration: re-invoke the worker on `interval` until it
/// reports completion or `timeout` elapses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollDef {
    #[serde(default)]
    pub interval: String,
    #[serde(default)]
    pub timeout: String,
}

/// Per-step retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDef {
    #[serde(default = "default_retry_max")]
    pub max: u32,
    #[serde(default)]
    pub interval: String,
}

fn default_retry_max() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// A single worker function invocation template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default)]
    pub function: String,
    /// Parameter templates; values may reference `{{columns}}`
    #[serde(default)]
    pub params: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<OnFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryDef>,
}

/// A named, offset-anchored group of steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseDef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub offset: String,
    #[serde(default)]
    pub steps: Vec<StepDef>,
}

/// A parsed runbook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunbookDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_source: DataSourceDef,
    #[serde(default)]
    pub init: Vec<StepDef>,
    #[serde(default)]
    pub phases: Vec<PhaseDef>,
    #[serde(default)]
    pub rollbacks: IndexMap<String, Vec<StepDef>>,
    /// Rollback sequence to run when a member drops out mid-migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_on_removal: Option<String>,
    #[serde(default)]
    pub overdue_behavior: OverdueBehavior,
    #[serde(default)]
    pub rerun_init: bool,
}

impl RunbookDefinition {
    /// Get a rollback sequence by name
    pub fn get_rollback(&self, name: &str) -> Option<&[StepDef]> {
        self.rollbacks.get(name).map(Vec::as_slice)
    }

    /// Get a phase definition by name
    pub fn get_phase(&self, name: &str) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Phases sorted by offset descending in time (largest offset first,
    /// i.e. the earliest-firing phase leads). Assumes offsets validated.
    pub fn phases_by_offset(&self) -> Vec<&PhaseDef> {
        let mut phases: Vec<&PhaseDef> = self.phases.iter().collect();
        phases.sort_by_key(|p| {
            // Unparseable offsets sort last; validation rejects them before
            // the scheduler ever orders phases.
            std::cmp::Reverse(crate::offset::parse_offset(&p.offset).unwrap_or(i64::MIN))
        });
        phases
    }
}

impl StepDef {
    pub fn max_retries(&self) -> u32 {
        self.retry.as_ref().map_or(DEFAULT_MAX_RETRIES, |r| r.max)
    }

    pub fn retry_interval_secs(&self) -> u64 {
        self.retry
            .as_ref()
            .and_then(|r| crate::offset::parse_duration_secs(&r.interval).ok())
            .filter(|&secs| secs > 0)
            .unwrap_or(DEFAULT_RETRY_INTERVAL_SECS)
    }
}
