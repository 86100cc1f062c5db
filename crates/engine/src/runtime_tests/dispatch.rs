// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{json_row, scheduled_row, t0, TestEnv, IMMEDIATE_YAML, SCHEDULED_YAML};
use chrono::{TimeZone, Utc};
use convoy_core::{BatchStatus, PhaseStatus, StepStatus};

#[tokio::test]
async fn immediate_batch_runs_to_completion() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );

    env.tick().await;
    env.pump().await;

    let jobs = env.jobs("exchange");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].function_name, "move_mailbox");
    assert_eq!(jobs[0].parameters["user"], "u1");
    assert!(jobs[0].job_id.starts_with("step-"));
    assert!(jobs[0].job_id.ends_with("-0"));

    env.deliver_success(&jobs[0], Some(serde_json::json!({ "moved": true })))
        .await;

    let batch = env.only_batch("tenant-move");
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.batch_start_time, Some(t0()));

    let phases = env.store.read(|state| {
        state
            .phases_of_batch(&batch.id)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    });
    assert_eq!(phases.len(), 1);
    assert_eq!(phases[0].status, PhaseStatus::Completed);

    let steps = env
        .store
        .read(|state| state.steps_of_phase(&phases[0].id).into_iter().cloned().collect::<Vec<_>>());
    assert_eq!(steps[0].core.status, StepStatus::Succeeded);
    assert_eq!(
        steps[0].core.result,
        Some(serde_json::json!({ "moved": true }))
    );
}

#[tokio::test]
async fn steps_are_serial_per_member_and_parallel_across_members() {
    let env = TestEnv::new();
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[
            scheduled_row("u1", "2030-01-10T00:00:00Z"),
            scheduled_row("u2", "2030-01-10T00:00:00Z"),
        ],
    );

    // Tick 1: detection + init
    env.tick().await;
    env.pump().await;
    for job in env.jobs("capacity") {
        env.deliver_success(&job, None).await;
    }

    // Tick 2: both phases are due at/after the start time; preflight
    // first, then cutover after it completes
    env.tick().await;
    env.pump().await;
    let preflight_jobs = env.jobs("identity");
    assert_eq!(preflight_jobs.len(), 2);
    for job in &preflight_jobs {
        env.deliver_success(job, None).await;
    }
    let batch = env.only_batch("tenant-move");
    env.tick().await;
    env.pump().await;

    // Cutover dispatched: step 0 (move-mailbox) for both members only
    let move_jobs = env.jobs("exchange");
    assert_eq!(move_jobs.len(), 2);
    assert!(move_jobs
        .iter()
        .all(|j| j.function_name == "move_mailbox"));

    // u1 finishes its move: its verify dispatches, u2's does not
    let u1_move = move_jobs
        .iter()
        .find(|j| j.parameters["mailbox"] == "u1@contoso.com")
        .unwrap();
    env.deliver_success(u1_move, None).await;

    let verify_jobs = env.jobs("exchange");
    assert_eq!(verify_jobs.len(), 1);
    assert_eq!(verify_jobs[0].function_name, "verify_mailbox");
    assert_eq!(verify_jobs[0].parameters["mailbox"], "u1@contoso.com");

    // Finish everything
    env.deliver_success(&verify_jobs[0], None).await;
    let u2_move = move_jobs
        .iter()
        .find(|j| j.parameters["mailbox"] == "u2@contoso.com")
        .unwrap();
    env.deliver_success(u2_move, None).await;
    let u2_verify = env.jobs("exchange");
    assert_eq!(u2_verify.len(), 1);
    env.deliver_success(&u2_verify[0], None).await;

    let batch = env.batch(&batch.id);
    assert_eq!(batch.status, BatchStatus::Completed);
}

#[tokio::test]
async fn duplicate_phase_due_does_not_double_dispatch() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;

    let events = env.bus.drain_control(env.now());
    assert_eq!(events.len(), 1);
    env.orchestrator.handle_control(events[0].clone()).await.unwrap();
    env.orchestrator.handle_control(events[0].clone()).await.unwrap();

    assert_eq!(env.jobs("exchange").len(), 1);
}

#[tokio::test]
async fn duplicate_success_result_is_a_noop() {
    let env = TestEnv::new();
    env.register("tenant-move", 1, IMMEDIATE_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.pump().await;
    let jobs = env.jobs("exchange");

    env.deliver_success(&jobs[0], Some(serde_json::json!({ "n": 1 })))
        .await;
    env.deliver_success(&jobs[0], Some(serde_json::json!({ "n": 2 })))
        .await;

    let batch = env.only_batch("tenant-move");
    assert_eq!(batch.status, BatchStatus::Completed);
    let steps = env.store.read(|state| {
        state
            .phases_of_batch(&batch.id)
            .iter()
            .flat_map(|p| state.steps_of_phase(&p.id))
            .cloned()
            .collect::<Vec<_>>()
    });
    // First result wins; the duplicate changed nothing
    assert_eq!(steps[0].core.result, Some(serde_json::json!({ "n": 1 })));
}
