// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::test_helpers::{json_row, scheduled_row, t0, TestEnv, IMMEDIATE_YAML, SCHEDULED_YAML};
use chrono::{Duration, TimeZone, Utc};
use convoy_core::{BatchStatus, ControlEvent, MemberStatus, PhaseStatus, StepStatus};

#[tokio::test]
async fn tick_is_a_noop_when_lease_held_elsewhere() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.lease.block("scheduler");

    env.scheduler.run_tick().await.unwrap();

    assert!(env
        .store
        .read(|state| state.batches_of_runbook("tenant-move").is_empty()));
    assert!(env.bus.drain_control(env.now()).is_empty());
}

#[tokio::test]
async fn immediate_batch_is_detected_and_phase_fires_same_tick() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );

    env.tick().await;

    let batch = env.only_batch("tenant-move");
    // No inits: straight to active, anchored at the 5-minute window
    assert_eq!(batch.status, BatchStatus::Active);
    assert_eq!(batch.batch_start_time, Some(t0()));
    assert!(!batch.is_manual);

    let events = env.bus.drain_control(env.now());
    assert_eq!(events.len(), 1);
    match &events[0] {
        ControlEvent::PhaseDue {
            phase_name,
            member_ids,
            ..
        } => {
            assert_eq!(phase_name, "cutover");
            assert_eq!(member_ids.len(), 1);
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Steps pre-materialized with resolved params
    let steps = env.store.read(|state| {
        state
            .phases_of_batch(&batch.id)
            .iter()
            .flat_map(|p| state.steps_of_phase(&p.id))
            .cloned()
            .collect::<Vec<_>>()
    });
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].core.params["user"], "u1");
    assert_eq!(steps[0].core.params["batch"], batch.id.as_str());
}

#[tokio::test]
async fn redetection_in_same_window_reconciles_instead_of_duplicating() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.bus.drain_control(env.now());

    // Same window, one more member
    env.advance(Duration::minutes(1));
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1"), json_row("u2")],
    );
    env.tick().await;

    let batch = env.only_batch("tenant-move");
    assert_eq!(env.members(&batch.id).len(), 2);
    let events = env.bus.drain_control(env.now());
    assert!(events
        .iter()
        .any(|e| matches!(e, ControlEvent::MemberAdded { member_key, .. } if member_key == "u2")));
}

#[tokio::test]
async fn scheduled_batch_fires_preamble_phase_only() {
    let env = TestEnv::new();
    // Tick six days before the start time: T-5d due, T-0 pending
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[scheduled_row("u1", "2030-01-10T00:00:00Z")],
    );

    env.tick().await;
    env.pump().await; // batch-init → dispatch init
    let init_jobs = env.jobs("capacity");
    assert_eq!(init_jobs.len(), 1);
    env.deliver_success(&init_jobs[0], None).await;

    let batch = env.only_batch("tenant-move");
    assert_eq!(batch.status, BatchStatus::Active);

    // Next tick: preflight (due 2030-01-05) is due at 2030-01-05+
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 5, 0, 0, 0).single().unwrap());
    env.tick().await;

    let phases = env
        .store
        .read(|state| state.phases_of_batch(&batch.id).into_iter().cloned().collect::<Vec<_>>());
    let preflight = phases.iter().find(|p| p.phase_name == "preflight").unwrap();
    let cutover = phases.iter().find(|p| p.phase_name == "cutover").unwrap();
    assert_eq!(preflight.status, PhaseStatus::Dispatched);
    assert_eq!(cutover.status, PhaseStatus::Pending);
    assert_eq!(
        env.batch(&batch.id).current_phase.as_deref(),
        Some("preflight")
    );
}

#[tokio::test]
async fn member_diff_adds_removes_and_refreshes() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1"), json_row("u2")],
    );
    env.tick().await;
    env.bus.drain_control(env.now());

    env.advance(Duration::minutes(1));
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[
            serde_json::json!({ "user_id": "u2", "mailbox": "u2@fabrikam.com" }),
            json_row("u3"),
        ],
    );
    env.tick().await;

    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    let by_key = |key: &str| members.iter().find(|m| m.member_key == key).unwrap();

    assert_eq!(by_key("u1").status, MemberStatus::Removed);
    assert!(by_key("u1").removed_at.is_some());
    assert_eq!(by_key("u2").status, MemberStatus::Active);
    assert_eq!(
        by_key("u2").data["mailbox"],
        serde_json::json!("u2@fabrikam.com")
    );
    assert_eq!(by_key("u3").status, MemberStatus::Active);

    let events = env.bus.drain_control(env.now());
    assert!(events
        .iter()
        .any(|e| matches!(e, ControlEvent::MemberAdded { member_key, .. } if member_key == "u3")));
    assert!(events.iter().any(
        |e| matches!(e, ControlEvent::MemberRemoved { member_key, .. } if member_key == "u1")
    ));
}

#[tokio::test]
async fn invalid_batch_times_drop_rows_from_grouping() {
    let env = TestEnv::new();
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[
            scheduled_row("u1", "2030-01-10T00:00:00Z"),
            scheduled_row("u2", "not-a-date"),
        ],
    );

    env.tick().await;

    let batch = env.only_batch("tenant-move");
    assert_eq!(env.members(&batch.id).len(), 1);
    // The bad row is still mirrored, just without a batch time
    let table = env
        .store
        .read(|state| state.get_table("runbook_tenant_move_v1").cloned())
        .unwrap();
    assert!(table.get("u2").unwrap().batch_time.is_none());
}

#[tokio::test]
async fn data_source_failure_records_last_error_but_phases_still_fire() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.bus.drain_control(env.now());
    let batch = env.only_batch("tenant-move");

    // Freeze phase state by completing nothing; next tick's query fails
    env.datasource
        .push_error("SELECT user_id, mailbox FROM waves", "tenant throttled us");
    env.advance(Duration::minutes(10));
    env.tick().await;

    let record = env
        .store
        .read(|state| state.get_runbook("tenant-move", 1).cloned())
        .unwrap();
    assert!(record.last_error.as_deref().unwrap().contains("tenant throttled us"));
    // Existing batch untouched and still progressing
    assert_eq!(env.batch(&batch.id).status, BatchStatus::Active);

    // A clean tick clears the error
    env.advance(Duration::minutes(10));
    env.tick().await;
    let record = env
        .store
        .read(|state| state.get_runbook("tenant-move", 1).cloned())
        .unwrap();
    assert!(record.last_error.is_none());
}

#[tokio::test]
async fn automation_disabled_stops_discovery_not_existing_batches() {
    let env = TestEnv::new();
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[scheduled_row("u1", "2030-01-10T00:00:00Z")],
    );
    env.tick().await;
    env.pump().await;
    let init_jobs = env.jobs("capacity");
    env.deliver_success(&init_jobs[0], None).await;
    let batch = env.only_batch("tenant-move");

    env.store
        .write(|state| state.set_automation("tenant-move", false));

    // New data would create another batch, but automation is off
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[
            scheduled_row("u1", "2030-01-10T00:00:00Z"),
            scheduled_row("u9", "2031-06-01T00:00:00Z"),
        ],
    );
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 5, 0, 0, 0).single().unwrap());
    env.tick().await;

    assert_eq!(
        env.store
            .read(|state| state.batches_of_runbook("tenant-move").len()),
        1
    );
    // The existing batch still fired its due phase
    let phases = env
        .store
        .read(|state| state.phases_of_batch(&batch.id).into_iter().cloned().collect::<Vec<_>>());
    assert!(phases
        .iter()
        .any(|p| p.phase_name == "preflight" && p.status == PhaseStatus::Dispatched));
}

#[tokio::test]
async fn multi_valued_columns_normalize_to_json_arrays() {
    let env = TestEnv::new();
    let yaml = r#"
name: tenant-move
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, aliases FROM waves"
  primary_key: user_id
  batch_time: immediate
  multi_valued_columns:
    - { name: aliases, format: semicolon_delimited }
phases:
  - name: cutover
    offset: T-0
    steps:
      - { name: s, worker_id: w, function: f }
"#;
    env.register("tenant-move", 1, yaml);
    env.datasource.set_rows(
        "SELECT user_id, aliases FROM waves",
        &[serde_json::json!({ "user_id": "u1", "aliases": "a@x.com; b@x.com" })],
    );

    env.tick().await;

    let batch = env.only_batch("tenant-move");
    let member = &env.members(&batch.id)[0];
    assert_eq!(
        member.data["aliases"],
        serde_json::json!(["a@x.com", "b@x.com"])
    );
    let table = env
        .store
        .read(|state| state.get_table("runbook_tenant_move_v1").cloned())
        .unwrap();
    assert!(table.get("u1").unwrap().columns["aliases"].is_array());
}

#[tokio::test]
async fn version_transition_supersedes_and_applies_overdue_behavior() {
    let env = TestEnv::new();
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[scheduled_row("u1", "2030-01-10T00:00:00Z")],
    );
    env.tick().await;
    env.pump().await;
    let init_jobs = env.jobs("capacity");
    env.deliver_success(&init_jobs[0], None).await;
    let batch = env.only_batch("tenant-move");

    // Fire preflight under v1
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 5, 0, 0, 0).single().unwrap());
    env.tick().await;

    // Publish v2 with different phases and overdue_behavior = ignore
    let v2 = r#"
name: tenant-move
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, mailbox, migrate_at FROM waves"
  primary_key: user_id
  batch_time: column
  batch_time_column: migrate_at
phases:
  - name: early-prep
    offset: T-6d
    steps:
      - { name: prep, worker_id: identity, function: prep_user, params: { user: "{{user_id}}" } }
  - name: cutover
    offset: T-0
    steps:
      - { name: move, worker_id: exchange, function: move_mailbox, params: { mailbox: "{{mailbox}}" } }
overdue_behavior: ignore
"#;
    env.register("tenant-move", 2, v2);
    env.tick().await;

    let phases = env
        .store
        .read(|state| state.phases_of_batch(&batch.id).into_iter().cloned().collect::<Vec<_>>());

    // v1 phases: the dispatched preflight and pending cutover are both superseded
    let v1: Vec<_> = phases.iter().filter(|p| p.runbook_version == 1).collect();
    assert_eq!(v1.len(), 2);
    assert!(v1.iter().all(|p| p.status == PhaseStatus::Superseded));

    // v2: early-prep was due 2030-01-04 (before now) → skipped under
    // ignore; cutover is still in the future → pending
    let early = phases
        .iter()
        .find(|p| p.runbook_version == 2 && p.phase_name == "early-prep")
        .unwrap();
    let cutover = phases
        .iter()
        .find(|p| p.runbook_version == 2 && p.phase_name == "cutover")
        .unwrap();
    assert_eq!(early.status, PhaseStatus::Skipped);
    assert_eq!(cutover.status, PhaseStatus::Pending);
    assert_eq!(env.batch(&batch.id).runbook_version, 2);
}

#[tokio::test]
async fn rerun_init_cancels_old_inits_and_republishes_batch_init() {
    let env = TestEnv::new();
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[scheduled_row("u1", "2030-01-10T00:00:00Z")],
    );
    env.tick().await;
    env.pump().await;
    let init_jobs = env.jobs("capacity");
    env.deliver_success(&init_jobs[0], None).await;
    let batch = env.only_batch("tenant-move");

    let v2 = r#"
name: tenant-move
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, mailbox, migrate_at FROM waves"
  primary_key: user_id
  batch_time: column
  batch_time_column: migrate_at
init:
  - name: reserve-capacity
    worker_id: capacity
    function: reserve
    params: { batch: "{{_batch_id}}" }
phases:
  - name: cutover
    offset: T-0
    steps:
      - { name: move, worker_id: exchange, function: move_mailbox, params: { mailbox: "{{mailbox}}" } }
rerun_init: true
"#;
    env.register("tenant-move", 2, v2);
    env.tick().await;

    let inits = env.inits(&batch.id);
    assert_eq!(inits.len(), 2);
    let v1_init = inits.iter().find(|i| i.id.as_str().ends_with(":v1")).unwrap();
    let v2_init = inits.iter().find(|i| i.id.as_str().ends_with(":v2")).unwrap();
    // The v1 init already succeeded, so it stays as history
    assert_eq!(v1_init.core.status, StepStatus::Succeeded);
    assert_eq!(v2_init.core.status, StepStatus::Pending);

    // The new batch-init dispatches the v2 init
    env.pump().await;
    let jobs = env.jobs("capacity");
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].job_id.contains(":v2"));
}
