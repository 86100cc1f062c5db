// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control events that drive the orchestrator.
//!
//! Serialized with the tag in a `messageType` field and camelCase payload
//! fields, matching the wire contract workers and external tooling see.

use crate::batch::BatchId;
use crate::execution::PhaseExecutionId;
use crate::member::BatchMemberId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events published on the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum ControlEvent {
    /// A batch was detected and has init steps to run.
    #[serde(rename = "batch-init", rename_all = "camelCase")]
    BatchInit {
        runbook_name: String,
        runbook_version: u32,
        batch_id: BatchId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        batch_start_time: Option<DateTime<Utc>>,
        member_count: usize,
    },

    /// A phase's due time has arrived (or a manual advance fired it).
    #[serde(rename = "phase-due", rename_all = "camelCase")]
    PhaseDue {
        runbook_name: String,
        runbook_version: u32,
        batch_id: BatchId,
        phase_execution_id: PhaseExecutionId,
        phase_name: String,
        offset_minutes: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        due_at: Option<DateTime<Utc>>,
        member_ids: Vec<BatchMemberId>,
    },

    /// A new member key appeared in the data-source query.
    #[serde(rename = "member-added", rename_all = "camelCase")]
    MemberAdded {
        runbook_name: String,
        runbook_version: u32,
        batch_id: BatchId,
        batch_member_id: BatchMemberId,
        member_key: String,
    },

    /// A member key vanished from the data-source query.
    #[serde(rename = "member-removed", rename_all = "camelCase")]
    MemberRemoved {
        runbook_name: String,
        runbook_version: u32,
        batch_id: BatchId,
        batch_member_id: BatchMemberId,
        member_key: String,
    },

    /// A polling execution's interval elapsed; re-dispatch its job.
    #[serde(rename = "poll-check", rename_all = "camelCase")]
    PollCheck {
        runbook_name: String,
        runbook_version: u32,
        batch_id: BatchId,
        step_execution_id: String,
        step_name: String,
        poll_count: u32,
        is_init_step: bool,
    },

    /// Scheduled-delivery retry trigger for a pending execution.
    #[serde(rename = "retry-check", rename_all = "camelCase")]
    RetryCheck {
        step_execution_id: String,
        is_init_step: bool,
        runbook_name: String,
        runbook_version: u32,
        batch_id: BatchId,
    },
}

impl ControlEvent {
    pub fn name(&self) -> &str {
        match self {
            ControlEvent::BatchInit { .. } => "batch-init",
            ControlEvent::PhaseDue { .. } => "phase-due",
            ControlEvent::MemberAdded { .. } => "member-added",
            ControlEvent::MemberRemoved { .. } => "member-removed",
            ControlEvent::PollCheck { .. } => "poll-check",
            ControlEvent::RetryCheck { .. } => "retry-check",
        }
    }

    pub fn batch_id(&self) -> &BatchId {
        match self {
            ControlEvent::BatchInit { batch_id, .. }
            | ControlEvent::PhaseDue { batch_id, .. }
            | ControlEvent::MemberAdded { batch_id, .. }
            | ControlEvent::MemberRemoved { batch_id, .. }
            | ControlEvent::PollCheck { batch_id, .. }
            | ControlEvent::RetryCheck { batch_id, .. } => batch_id,
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            ControlEvent::BatchInit {
                batch_id,
                member_count,
                ..
            } => format!("{t} batch={batch_id} members={member_count}"),
            ControlEvent::PhaseDue {
                batch_id,
                phase_name,
                member_ids,
                ..
            } => format!(
                "{t} batch={batch_id} phase={phase_name} members={}",
                member_ids.len()
            ),
            ControlEvent::MemberAdded {
                batch_id,
                member_key,
                ..
            }
            | ControlEvent::MemberRemoved {
                batch_id,
                member_key,
                ..
            } => format!("{t} batch={batch_id} member={member_key}"),
            ControlEvent::PollCheck {
                step_execution_id,
                poll_count,
                ..
            } => format!("{t} exec={step_execution_id} polls={poll_count}"),
            ControlEvent::RetryCheck {
                step_execution_id, ..
            } => format!("{t} exec={step_execution_id}"),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
