// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{json_row, TestEnv};
use chrono::Duration;
use convoy_core::{ControlEvent, MemberStatus, StepStatus};

const ROLLBACK_YAML: &str = r#"
name: tenant-move
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, mailbox FROM waves"
  primary_key: user_id
  batch_time: immediate
phases:
  - name: cutover
    offset: T-0
    steps:
      - name: move-mailbox
        worker_id: exchange
        function: move_mailbox
        params: { mailbox: "{{mailbox}}" }
        poll: { interval: 30s, timeout: 1h }
rollbacks:
  undo-move:
    - name: restore-mailbox
      worker_id: exchange
      function: restore_mailbox
      params: { mailbox: "{{mailbox}}" }
rollback_on_removal: undo-move
"#;

#[tokio::test]
async fn late_member_catches_up_on_dispatched_phase() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, ROLLBACK_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.pump().await;
    assert_eq!(env.jobs("exchange").len(), 1);

    // u2 appears while cutover is in flight
    env.advance(Duration::minutes(1));
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1"), json_row("u2")],
    );
    env.tick().await;
    env.pump().await;

    let jobs = env.jobs("exchange");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters["mailbox"], "u2@contoso.com");
}

#[tokio::test]
async fn removed_member_has_steps_cancelled_and_rollback_dispatched() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, ROLLBACK_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1"), json_row("u2")],
    );
    env.tick().await;
    env.pump().await;
    env.jobs("exchange");

    // u1 vanishes from the query
    env.advance(Duration::minutes(1));
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u2")],
    );
    env.tick().await;
    env.pump().await;

    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    let u1 = members.iter().find(|m| m.member_key == "u1").unwrap();
    assert_eq!(u1.status, MemberStatus::Removed);

    // u1's dispatched step was cancelled
    let steps = env
        .store
        .read(|state| state.steps_of_member(&u1.id).into_iter().cloned().collect::<Vec<_>>());
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].core.status, StepStatus::Cancelled);

    // Removal rollback went out with deterministic job ids
    let rollback_jobs = env.jobs("exchange");
    assert_eq!(rollback_jobs.len(), 1);
    assert_eq!(rollback_jobs[0].function_name, "restore_mailbox");
    assert_eq!(rollback_jobs[0].parameters["mailbox"], "u1@contoso.com");
    assert!(rollback_jobs[0].job_id.starts_with("rollback-"));
    assert!(rollback_jobs[0].job_id.ends_with("-undo-move-0"));
    // Detached correlation: no execution record to advance
    assert!(rollback_jobs[0].correlation_data.step_execution_id.is_none());
}

#[tokio::test]
async fn late_result_for_cancelled_step_is_dropped() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, ROLLBACK_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1"), json_row("u2")],
    );
    env.tick().await;
    env.pump().await;
    let jobs = env.jobs("exchange");
    let u1_job = jobs
        .iter()
        .find(|j| j.parameters["mailbox"] == "u1@contoso.com")
        .unwrap();

    env.advance(Duration::minutes(1));
    env.datasource
        .set_rows("SELECT user_id, mailbox FROM waves", &[json_row("u2")]);
    env.tick().await;
    env.pump().await;
    env.jobs("exchange");

    // The in-flight worker job completes after cancellation
    env.deliver_success(u1_job, None).await;

    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    let u1 = members.iter().find(|m| m.member_key == "u1").unwrap();
    let steps = env.store.read(|state| {
        state
            .steps_of_member(&u1.id)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    });
    // Cancelled stays cancelled; the late result is suppressed
    assert_eq!(steps[0].core.status, StepStatus::Cancelled);
}

#[tokio::test]
async fn member_events_carry_keys_for_external_consumers() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, ROLLBACK_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.bus.drain_control(env.now());

    env.advance(Duration::minutes(1));
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u2")],
    );
    env.tick().await;

    let events = env.bus.drain_control(env.now());
    let added = events
        .iter()
        .find_map(|e| match e {
            ControlEvent::MemberAdded { member_key, .. } => Some(member_key.clone()),
            _ => None,
        })
        .unwrap();
    let removed = events
        .iter()
        .find_map(|e| match e {
            ControlEvent::MemberRemoved { member_key, .. } => Some(member_key.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(added, "u2");
    assert_eq!(removed, "u1");
}
