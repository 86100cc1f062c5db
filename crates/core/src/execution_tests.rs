// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::batch::BatchId;
use crate::execution::{
    rollback_job_id, ExecutionCore, ExecutionSpec, InitExecutionId, OnFailure, PhaseExecutionId,
    PhaseStatus, StepExecutionId, StepStatus,
};
use crate::worker::WorkerId;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use yare::parameterized;

fn pending_core(poll: Option<(u64, u64)>) -> ExecutionCore {
    ExecutionCore::pending(ExecutionSpec {
        step_name: "provision".to_string(),
        step_index: 0,
        worker_id: WorkerId::new("identity"),
        function_name: "provision_user".to_string(),
        params: HashMap::new(),
        on_failure: None,
        poll,
        max_retries: 3,
        retry_interval_secs: 60,
    })
}

#[test]
fn execution_ids_compose_from_lineage() {
    let batch_id = BatchId::new("batch:mv:2030-01-10T00:00:00Z");
    let phase_id = PhaseExecutionId::derive(&batch_id, "preflight", 1);
    assert_eq!(
        phase_id.as_str(),
        "batch:mv:2030-01-10T00:00:00Z:phase:preflight:v1"
    );

    let step_id = StepExecutionId::derive(&phase_id, "u1", "provision");
    assert_eq!(
        step_id.as_str(),
        "batch:mv:2030-01-10T00:00:00Z:phase:preflight:v1:u1:provision"
    );

    let init_id = InitExecutionId::derive(&batch_id, "reserve", 1);
    assert_eq!(
        init_id.as_str(),
        "batch:mv:2030-01-10T00:00:00Z:init:reserve:v1"
    );
}

#[test]
fn job_ids_are_deterministic_per_attempt() {
    let step_id = StepExecutionId::new("s1");
    assert_eq!(step_id.job_id(0), "step-s1-0");
    assert_eq!(step_id.retry_job_id(2), "step-s1-retry-2");
    assert_eq!(step_id.poll_job_id(3), "step-s1-poll-3");

    let init_id = InitExecutionId::new("i1");
    assert_eq!(init_id.job_id(0), "init-i1-0");
    assert_eq!(init_id.retry_job_id(1), "init-i1-retry-1");

    let batch_id = BatchId::new("b1");
    assert_eq!(rollback_job_id(&batch_id, "undo-dns", 0), "rollback-b1-undo-dns-0");
}

#[parameterized(
    pending = { StepStatus::Pending, false, true },
    dispatched = { StepStatus::Dispatched, false, true },
    polling = { StepStatus::Polling, false, true },
    succeeded = { StepStatus::Succeeded, true, false },
    failed = { StepStatus::Failed, true, false },
    poll_timeout = { StepStatus::PollTimeout, true, false },
    cancelled = { StepStatus::Cancelled, true, false },
    rolled_back = { StepStatus::RolledBack, true, false },
    skipped = { StepStatus::Skipped, true, false },
)]
fn step_status_classification(status: StepStatus, terminal: bool, cancellable: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.is_cancellable(), cancellable);
}

#[test]
fn only_succeeded_is_terminal_success() {
    assert!(StepStatus::Succeeded.is_terminal_success());
    assert!(!StepStatus::Skipped.is_terminal_success());
    assert!(!StepStatus::Failed.is_terminal_success());
}

#[parameterized(
    completed = { PhaseStatus::Completed, true },
    failed = { PhaseStatus::Failed, true },
    skipped = { PhaseStatus::Skipped, true },
    superseded = { PhaseStatus::Superseded, true },
    pending = { PhaseStatus::Pending, false },
    dispatched = { PhaseStatus::Dispatched, false },
)]
fn phase_status_terminality(status: PhaseStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[parameterized(
    retry = { "retry", OnFailure::Retry },
    skip = { "skip", OnFailure::Skip },
    fail_phase = { "fail_phase", OnFailure::FailPhase },
    fail_batch = { "fail_batch", OnFailure::FailBatch },
)]
fn on_failure_parses_simple_directives(input: &str, expected: OnFailure) {
    let parsed: OnFailure = input.parse().unwrap();
    assert_eq!(parsed, expected);
    assert_eq!(parsed.to_string(), input);
}

#[test]
fn on_failure_parses_rollback_with_name() {
    let parsed: OnFailure = "rollback:undo-dns".parse().unwrap();
    assert_eq!(parsed, OnFailure::Rollback("undo-dns".to_string()));
    assert_eq!(parsed.rollback_name(), Some("undo-dns"));
    assert_eq!(parsed.to_string(), "rollback:undo-dns");
}

#[parameterized(
    unknown = { "explode" },
    empty_rollback = { "rollback:" },
    blank = { "" },
)]
fn on_failure_rejects_bad_input(input: &str) {
    assert!(input.parse::<OnFailure>().is_err());
}

#[test]
fn on_failure_serde_round_trips_as_string() {
    let json = serde_json::to_string(&OnFailure::Rollback("r".to_string())).unwrap();
    assert_eq!(json, "\"rollback:r\"");
    let back: OnFailure = serde_json::from_str(&json).unwrap();
    assert_eq!(back, OnFailure::Rollback("r".to_string()));
}

#[test]
fn dispatch_is_compare_and_set() {
    let now = Utc::now();
    let mut core = pending_core(None);
    assert!(core.try_dispatch("step-s1-0".to_string(), now));
    assert_eq!(core.status, StepStatus::Dispatched);
    assert!(core.matches_job("step-s1-0"));
    assert_eq!(core.dispatched_at, Some(now));

    // Second dispatch observes the transition already happened
    assert!(!core.try_dispatch("step-s1-0".to_string(), now));
}

#[test]
fn success_records_result_and_is_idempotent() {
    let now = Utc::now();
    let mut core = pending_core(None);
    core.try_dispatch("j".to_string(), now);
    assert!(core.try_succeed(Some(serde_json::json!({"ok": true})), now));
    assert_eq!(core.status, StepStatus::Succeeded);
    assert_eq!(core.result, Some(serde_json::json!({"ok": true})));

    // Duplicate result delivery is a no-op
    assert!(!core.try_succeed(Some(serde_json::json!({"ok": false})), now));
    assert_eq!(core.result, Some(serde_json::json!({"ok": true})));
}

#[test]
fn polling_lifecycle_tracks_timeout_window() {
    let start = Utc::now();
    let mut core = pending_core(Some((30, 300)));
    core.try_dispatch("j".to_string(), start);
    assert!(core.try_start_polling(start));
    assert_eq!(core.poll_started_at, Some(start));
    assert!(!core.poll_due(start));

    // Interval elapses → poll due; bump increments the round counter
    let later = start + Duration::seconds(31);
    assert!(core.poll_due(later));
    assert_eq!(core.bump_poll(later), Some(1));
    assert!(!core.poll_due(later));

    // Timeout window measured from poll_started_at
    assert!(!core.poll_timed_out(later));
    assert!(core.poll_timed_out(start + Duration::seconds(300)));
}

#[test]
fn retry_resets_attempt_state() {
    let now = Utc::now();
    let mut core = pending_core(Some((30, 300)));
    core.try_dispatch("j0".to_string(), now);
    core.try_start_polling(now);

    let retry_at = now + Duration::seconds(60);
    assert!(core.try_schedule_retry(retry_at));
    assert_eq!(core.status, StepStatus::Pending);
    assert_eq!(core.retry_count, 1);
    assert_eq!(core.retry_after, Some(retry_at));
    assert!(core.job_id.is_none());
    assert!(core.poll_started_at.is_none());

    // Stale result from attempt 0 no longer matches
    assert!(!core.matches_job("j0"));
}

#[test]
fn terminal_states_reject_further_transitions() {
    let now = Utc::now();
    let mut core = pending_core(None);
    core.try_dispatch("j".to_string(), now);
    assert!(core.try_fail(StepStatus::Failed, "boom", now));
    assert_eq!(core.error_message.as_deref(), Some("boom"));

    assert!(!core.try_cancel(now));
    assert!(!core.try_succeed(None, now));
    assert!(!core.try_fail(StepStatus::Failed, "again", now));
    // Explicit retry scheduling from failed is allowed (throttle path)
    assert!(core.try_schedule_retry(now + Duration::seconds(5)));
}

#[test]
fn skip_only_applies_to_pending_steps() {
    let now = Utc::now();
    let mut core = pending_core(None);
    assert!(core.try_skip(now));
    assert_eq!(core.status, StepStatus::Skipped);

    let mut dispatched = pending_core(None);
    dispatched.try_dispatch("j".to_string(), now);
    assert!(!dispatched.try_skip(now));
}
