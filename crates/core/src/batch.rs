// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch record and status state machine.
//!
//! A batch is a cohort of members migrating together, keyed by its
//! runbook and `batch_start_time` (or created manually with no start
//! time).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a batch.
    ///
    /// Detected batches use the natural key `batch:{runbook}:{start_time}`
    /// so that re-detection of the same batch group lands on the same row.
    pub struct BatchId;
}

impl BatchId {
    /// Id for a batch detected from data-source results.
    pub fn detected(runbook_name: &str, start: DateTime<Utc>) -> Self {
        let start = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        Self::new(crate::id::lineage(&["batch", runbook_name, &start]))
    }

    /// Id for a manually created batch. `nonce` is caller-supplied
    /// (typically from [`crate::id::nonce`]) since manual batches have
    /// no natural key.
    pub fn manual(runbook_name: &str, nonce: &str) -> Self {
        Self::new(crate::id::lineage(&["batch", runbook_name, "manual", nonce]))
    }
}

/// Lifecycle status of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created, init steps not yet dispatched
    Detected,
    /// Init steps published to workers
    InitDispatched,
    /// Inits done (or none); phases eligible to fire
    Active,
    /// All phases terminal with at least one surviving member
    Completed,
    /// Failed explicitly or every member removed/failed
    Failed,
}

impl BatchStatus {
    /// A batch cannot leave a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Detected => write!(f, "detected"),
            BatchStatus::InitDispatched => write!(f, "init_dispatched"),
            BatchStatus::Active => write!(f, "active"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A batch instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub runbook_name: String,
    pub runbook_version: u32,
    /// Target migration time. None for manual batches.
    pub batch_start_time: Option<DateTime<Utc>>,
    pub status: BatchStatus,
    #[serde(default)]
    pub is_manual: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Name of the most recently dispatched phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_dispatched_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Create a batch detected from a data-source group.
    pub fn detected(
        runbook_name: &str,
        runbook_version: u32,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::detected(runbook_name, start),
            runbook_name: runbook_name.to_string(),
            runbook_version,
            batch_start_time: Some(start),
            status: BatchStatus::Detected,
            is_manual: false,
            created_by: None,
            current_phase: None,
            detected_at: now,
            init_dispatched_at: None,
        }
    }

    /// Create a manual batch. Never advanced by time.
    pub fn manual(
        runbook_name: &str,
        runbook_version: u32,
        nonce: &str,
        created_by: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchId::manual(runbook_name, nonce),
            runbook_name: runbook_name.to_string(),
            runbook_version,
            batch_start_time: None,
            status: BatchStatus::Detected,
            is_manual: true,
            created_by: Some(created_by.to_string()),
            current_phase: None,
            detected_at: now,
            init_dispatched_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
