// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase, step, and init execution records and their state machines.

use crate::batch::BatchId;
use crate::member::BatchMemberId;
use crate::worker::WorkerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

crate::define_id! {
    /// Identifier for a phase execution:
    /// `{batch_id}:phase:{phase_name}:v{version}`.
    ///
    /// The natural key enforces at most one execution per
    /// `(batch, phase, runbook_version)`.
    pub struct PhaseExecutionId;
}

impl PhaseExecutionId {
    pub fn derive(batch_id: &BatchId, phase_name: &str, runbook_version: u32) -> Self {
        let prefix = crate::id::lineage(&[batch_id.as_str(), "phase", phase_name]);
        Self::new(crate::id::versioned(&prefix, runbook_version))
    }
}

crate::define_id! {
    /// Identifier for a per-member step execution:
    /// `{phase_execution_id}:{member_key}:{step_name}`.
    pub struct StepExecutionId;
}

impl StepExecutionId {
    pub fn derive(phase: &PhaseExecutionId, member_key: &str, step_name: &str) -> Self {
        Self::new(crate::id::lineage(&[phase.as_str(), member_key, step_name]))
    }

    /// Deterministic job id for the initial dispatch of an attempt.
    pub fn job_id(&self, retry_count: u32) -> String {
        format!("step-{}-{}", self, retry_count)
    }

    /// Deterministic job id for a retry re-dispatch.
    pub fn retry_job_id(&self, retry_count: u32) -> String {
        format!("step-{}-retry-{}", self, retry_count)
    }

    /// Deterministic job id for a poll round. Poll rounds get distinct
    /// ids so bus message-id dedup does not swallow the re-send.
    pub fn poll_job_id(&self, poll_count: u32) -> String {
        format!("step-{}-poll-{}", self, poll_count)
    }
}

crate::define_id! {
    /// Identifier for a batch-scoped init execution:
    /// `{batch_id}:init:{step_name}:v{version}`.
    pub struct InitExecutionId;
}

impl InitExecutionId {
    pub fn derive(batch_id: &BatchId, step_name: &str, runbook_version: u32) -> Self {
        let prefix = crate::id::lineage(&[batch_id.as_str(), "init", step_name]);
        Self::new(crate::id::versioned(&prefix, runbook_version))
    }

    pub fn job_id(&self, retry_count: u32) -> String {
        format!("init-{}-{}", self, retry_count)
    }

    pub fn retry_job_id(&self, retry_count: u32) -> String {
        format!("init-{}-retry-{}", self, retry_count)
    }

    pub fn poll_job_id(&self, poll_count: u32) -> String {
        format!("init-{}-poll-{}", self, poll_count)
    }
}

/// Deterministic job id for a rollback-sequence step dispatch.
pub fn rollback_job_id(batch_id: &BatchId, rollback_name: &str, index: usize) -> String {
    format!("rollback-{}-{}-{}", batch_id, rollback_name, index)
}

/// Status of a phase execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Dispatched,
    Completed,
    Failed,
    /// Overdue under `overdue_behavior = ignore` during a version transition
    Skipped,
    /// Replaced by a newer runbook version's phase
    Superseded,
}

impl PhaseStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed
                | PhaseStatus::Failed
                | PhaseStatus::Skipped
                | PhaseStatus::Superseded
        )
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseStatus::Pending => write!(f, "pending"),
            PhaseStatus::Dispatched => write!(f, "dispatched"),
            PhaseStatus::Completed => write!(f, "completed"),
            PhaseStatus::Failed => write!(f, "failed"),
            PhaseStatus::Skipped => write!(f, "skipped"),
            PhaseStatus::Superseded => write!(f, "superseded"),
        }
    }
}

/// A time-anchored slice of a runbook for one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseExecution {
    pub id: PhaseExecutionId,
    pub batch_id: BatchId,
    pub phase_name: String,
    pub offset_minutes: i64,
    /// `batch_start_time − offset`. None for manual batches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    pub runbook_version: u32,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl PhaseExecution {
    pub fn pending(
        batch_id: &BatchId,
        phase_name: &str,
        offset_minutes: i64,
        due_at: Option<DateTime<Utc>>,
        runbook_version: u32,
    ) -> Self {
        Self {
            id: PhaseExecutionId::derive(batch_id, phase_name, runbook_version),
            batch_id: batch_id.clone(),
            phase_name: phase_name.to_string(),
            offset_minutes,
            due_at,
            runbook_version,
            status: PhaseStatus::Pending,
            dispatched_at: None,
            completed_at: None,
        }
    }
}

/// Status of a step or init execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Dispatched,
    Succeeded,
    Failed,
    /// Worker reported `{complete: false}`; re-polled on an interval
    Polling,
    PollTimeout,
    Cancelled,
    RolledBack,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded
                | StepStatus::Failed
                | StepStatus::PollTimeout
                | StepStatus::Cancelled
                | StepStatus::RolledBack
                | StepStatus::Skipped
        )
    }

    /// Terminal with a successful outcome. Later steps in the same
    /// `(phase, member)` chain may only dispatch past these.
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, StepStatus::Succeeded)
    }

    /// States from which a cancel transition is legal.
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            StepStatus::Pending | StepStatus::Dispatched | StepStatus::Polling
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Dispatched => write!(f, "dispatched"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Polling => write!(f, "polling"),
            StepStatus::PollTimeout => write!(f, "poll_timeout"),
            StepStatus::Cancelled => write!(f, "cancelled"),
            StepStatus::RolledBack => write!(f, "rolled_back"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Failure directive for a step, string-encoded in runbook YAML as
/// `retry`, `skip`, `fail_phase`, `fail_batch`, or `rollback:<name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnFailure {
    Retry,
    Skip,
    Rollback(String),
    FailPhase,
    FailBatch,
}

impl OnFailure {
    /// Name of the rollback sequence, when this is a rollback directive.
    pub fn rollback_name(&self) -> Option<&str> {
        match self {
            OnFailure::Rollback(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for OnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnFailure::Retry => write!(f, "retry"),
            OnFailure::Skip => write!(f, "skip"),
            OnFailure::Rollback(name) => write!(f, "rollback:{}", name),
            OnFailure::FailPhase => write!(f, "fail_phase"),
            OnFailure::FailBatch => write!(f, "fail_batch"),
        }
    }
}

impl FromStr for OnFailure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "retry" => Ok(OnFailure::Retry),
            "skip" => Ok(OnFailure::Skip),
            "fail_phase" => Ok(OnFailure::FailPhase),
            "fail_batch" => Ok(OnFailure::FailBatch),
            other => match other.strip_prefix("rollback:") {
                Some(name) if !name.is_empty() => Ok(OnFailure::Rollback(name.to_string())),
                _ => Err(format!(
                    "unknown on_failure '{}'; expected retry, skip, fail_phase, \
                     fail_batch, or rollback:<name>",
                    other
                )),
            },
        }
    }
}

impl Serialize for OnFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OnFailure {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What to do with phases already overdue when a newer runbook version
/// takes over a live batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverdueBehavior {
    /// Overdue phases stay pending and fire on the next tick
    #[default]
    Rerun,
    /// Overdue phases are skipped
    Ignore,
}

/// Inputs for materializing a pending execution from a runbook step.
#[derive(Debug, Clone)]
pub struct ExecutionSpec {
    pub step_name: String,
    pub step_index: u32,
    pub worker_id: WorkerId,
    pub function_name: String,
    pub params: HashMap<String, String>,
    pub on_failure: Option<OnFailure>,
    /// `(interval_secs, timeout_secs)` when the step polls
    pub poll: Option<(u64, u64)>,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
}

/// Fields shared by step and init executions: the dispatch target, the
/// resolved parameters, and the polling/retry state machine bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionCore {
    pub step_name: String,
    pub step_index: u32,
    pub worker_id: WorkerId,
    pub function_name: String,
    /// Parameters after template resolution
    pub params: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<OnFailure>,
    pub status: StepStatus,
    /// Job id of the current in-flight attempt. Results carrying any
    /// other job id are stale and ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_poll_step: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub poll_count: u32,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
}

impl ExecutionCore {
    /// Materialize a pending execution.
    pub fn pending(spec: ExecutionSpec) -> Self {
        Self {
            step_name: spec.step_name,
            step_index: spec.step_index,
            worker_id: spec.worker_id,
            function_name: spec.function_name,
            params: spec.params,
            on_failure: spec.on_failure,
            status: StepStatus::Pending,
            job_id: None,
            result: None,
            error_message: None,
            dispatched_at: None,
            completed_at: None,
            is_poll_step: spec.poll.is_some(),
            poll_interval_secs: spec.poll.map(|(interval, _)| interval),
            poll_timeout_secs: spec.poll.map(|(_, timeout)| timeout),
            poll_started_at: None,
            last_polled_at: None,
            poll_count: 0,
            retry_count: 0,
            max_retries: spec.max_retries,
            retry_interval_secs: spec.retry_interval_secs,
            retry_after: None,
        }
    }

    /// True when a result envelope's job id belongs to the current
    /// attempt. Stale results from earlier attempts are ignored.
    pub fn matches_job(&self, job_id: &str) -> bool {
        self.job_id.as_deref() == Some(job_id)
    }

    // Every transition below is compare-and-set: it checks the current
    // status and returns false without side effects on a mismatch, so
    // duplicate deliveries and concurrent handlers are no-ops.

    /// Pending → Dispatched with the attempt's job id.
    pub fn try_dispatch(&mut self, job_id: String, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Dispatched;
        self.job_id = Some(job_id);
        self.dispatched_at = Some(now);
        self.retry_after = None;
        true
    }

    /// Dispatched → Polling on a `{complete: false}` result.
    pub fn try_start_polling(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Dispatched {
            return false;
        }
        self.status = StepStatus::Polling;
        if self.poll_started_at.is_none() {
            self.poll_started_at = Some(now);
        }
        self.last_polled_at = Some(now);
        true
    }

    /// Point the current attempt at a fresh poll-round job id so the
    /// round's result correlates.
    pub fn try_assign_poll_job(&mut self, job_id: String) -> bool {
        if self.status != StepStatus::Polling {
            return false;
        }
        self.job_id = Some(job_id);
        true
    }

    /// A polling round came back still incomplete.
    pub fn record_poll_progress(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Polling {
            return false;
        }
        self.last_polled_at = Some(now);
        true
    }

    /// Scheduler-side poll bookkeeping before publishing a poll-check.
    /// Returns the new poll count.
    pub fn bump_poll(&mut self, now: DateTime<Utc>) -> Option<u32> {
        if self.status != StepStatus::Polling {
            return None;
        }
        self.last_polled_at = Some(now);
        self.poll_count += 1;
        Some(self.poll_count)
    }

    /// Dispatched|Polling → Succeeded with the recorded result.
    pub fn try_succeed(&mut self, result: Option<serde_json::Value>, now: DateTime<Utc>) -> bool {
        if !matches!(self.status, StepStatus::Dispatched | StepStatus::Polling) {
            return false;
        }
        self.status = StepStatus::Succeeded;
        self.result = result;
        self.error_message = None;
        self.completed_at = Some(now);
        true
    }

    /// Any non-terminal state → Failed or PollTimeout.
    pub fn try_fail(&mut self, to: StepStatus, error: &str, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || !matches!(to, StepStatus::Failed | StepStatus::PollTimeout)
        {
            return false;
        }
        self.status = to;
        self.error_message = Some(error.to_string());
        self.completed_at = Some(now);
        true
    }

    /// Pending|Dispatched|Polling → Cancelled.
    pub fn try_cancel(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.is_cancellable() {
            return false;
        }
        self.status = StepStatus::Cancelled;
        self.completed_at = Some(now);
        true
    }

    /// Pending → Skipped (an earlier step in the chain failed with
    /// `on_failure = skip`).
    pub fn try_skip(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != StepStatus::Pending {
            return false;
        }
        self.status = StepStatus::Skipped;
        self.completed_at = Some(now);
        true
    }

    /// Back to Pending with an incremented attempt count and a retry
    /// deadline. Polling state resets so a retried poll step starts its
    /// timeout window over.
    pub fn try_schedule_retry(&mut self, retry_after: DateTime<Utc>) -> bool {
        if !matches!(
            self.status,
            StepStatus::Dispatched
                | StepStatus::Polling
                | StepStatus::Failed
                | StepStatus::PollTimeout
        ) {
            return false;
        }
        self.status = StepStatus::Pending;
        self.retry_count += 1;
        self.retry_after = Some(retry_after);
        self.job_id = None;
        self.poll_started_at = None;
        self.last_polled_at = None;
        self.completed_at = None;
        true
    }

    /// Whether the poll timeout window has elapsed.
    pub fn poll_timed_out(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.poll_started_at, self.poll_timeout_secs) {
            (StepStatus::Polling, Some(started), Some(timeout)) if timeout > 0 => {
                started + chrono::Duration::seconds(timeout as i64) <= now
            }
            _ => false,
        }
    }

    /// Whether the poll interval has elapsed since the last poll.
    pub fn poll_due(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.last_polled_at, self.poll_interval_secs) {
            (StepStatus::Polling, Some(last), Some(interval)) => {
                last + chrono::Duration::seconds(interval.max(1) as i64) <= now
            }
            _ => false,
        }
    }
}

/// A single worker function invocation for one member of one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: StepExecutionId,
    pub phase_execution_id: PhaseExecutionId,
    pub batch_member_id: BatchMemberId,
    #[serde(flatten)]
    pub core: ExecutionCore,
}

/// A batch-scoped step executed before any phase fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitExecution {
    pub id: InitExecutionId,
    pub batch_id: BatchId,
    #[serde(flatten)]
    pub core: ExecutionCore,
}

#[cfg(test)]
#[path = "execution_tests.rs"]
mod tests;
