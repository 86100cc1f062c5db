// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker job and result envelopes.
//!
//! Jobs fan out to workers keyed by `WorkerId`; results fan in and are
//! routed back to the originating execution record via the echoed
//! `correlationData`.

use crate::batch::BatchId;
use crate::worker::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Opaque identifiers attached to a job and echoed by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_execution_id: Option<String>,
    #[serde(default)]
    pub is_init_step: bool,
    pub runbook_name: String,
    pub runbook_version: u32,
}

impl CorrelationData {
    pub fn for_step(id: &str, runbook_name: &str, runbook_version: u32) -> Self {
        Self {
            step_execution_id: Some(id.to_string()),
            init_execution_id: None,
            is_init_step: false,
            runbook_name: runbook_name.to_string(),
            runbook_version,
        }
    }

    pub fn for_init(id: &str, runbook_name: &str, runbook_version: u32) -> Self {
        Self {
            step_execution_id: None,
            init_execution_id: Some(id.to_string()),
            is_init_step: true,
            runbook_name: runbook_name.to_string(),
            runbook_version,
        }
    }

    /// Uncorrelated dispatch (rollback sequences). Results for these are
    /// logged but advance no execution record.
    pub fn detached(runbook_name: &str, runbook_version: u32) -> Self {
        Self {
            step_execution_id: None,
            init_execution_id: None,
            is_init_step: false,
            runbook_name: runbook_name.to_string(),
            runbook_version,
        }
    }
}

/// A function invocation sent to a worker.
///
/// The job id doubles as the bus message id so retried sends deduplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEnvelope {
    pub job_id: String,
    pub batch_id: BatchId,
    pub worker_id: WorkerId,
    pub function_name: String,
    pub parameters: HashMap<String, String>,
    pub correlation_data: CorrelationData,
}

/// Outcome tag of a worker result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultStatus {
    Success,
    Failure,
}

/// Shape of the result payload, when the worker reports one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultType {
    Boolean,
    Object,
}

/// Error detail attached to a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerFault {
    pub message: String,
    /// Throttled failures are retried regardless of the step's failure
    /// directive, up to a hard cap.
    #[serde(default)]
    pub is_throttled: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

/// A worker's answer to a job, received on the results channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub job_id: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<ResultType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WorkerFault>,
    #[serde(default)]
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub correlation_data: CorrelationData,
}

/// Interpretation of a successful result for a polling step.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// `{complete: false}`: step stays in polling
    InProgress,
    /// `{complete: true, data}`: step succeeds with `data` recorded
    Complete(Option<serde_json::Value>),
}

impl ResultEnvelope {
    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    pub fn is_throttled(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.is_throttled)
    }

    pub fn error_message(&self) -> String {
        self.error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "worker reported failure".to_string())
    }

    /// Read the polling convention out of the result body.
    ///
    /// A successful result with `{complete: false}` keeps the step
    /// polling; `{complete: true}` completes it with the `data`
    /// substructure. Results without a `complete` key are treated as
    /// plain completion with the raw body.
    pub fn poll_outcome(&self) -> PollOutcome {
        match self.result.as_ref().and_then(|r| r.get("complete")) {
            Some(serde_json::Value::Bool(false)) => PollOutcome::InProgress,
            Some(serde_json::Value::Bool(true)) => PollOutcome::Complete(
                self.result
                    .as_ref()
                    .and_then(|r| r.get("data"))
                    .cloned(),
            ),
            _ => PollOutcome::Complete(self.result.clone()),
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
