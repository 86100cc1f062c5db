// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{scheduled_row, TestEnv, SCHEDULED_YAML};
use chrono::{TimeZone, Utc};
use convoy_core::{BatchStatus, StepStatus};

async fn detected_batch(env: &TestEnv) -> convoy_core::Batch {
    env.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox, migrate_at FROM waves",
        &[scheduled_row("u1", "2030-01-10T00:00:00Z")],
    );
    env.tick().await;
    env.only_batch("tenant-move")
}

#[tokio::test]
async fn batch_init_dispatches_inits_and_marks_batch() {
    let env = TestEnv::new();
    let batch = detected_batch(&env).await;
    assert_eq!(batch.status, BatchStatus::Detected);

    env.pump().await;

    let batch = env.batch(&batch.id);
    assert_eq!(batch.status, BatchStatus::InitDispatched);
    assert!(batch.init_dispatched_at.is_some());

    let jobs = env.jobs("capacity");
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].job_id.starts_with("init-"));
    assert!(jobs[0].job_id.ends_with("-0"));
    assert!(jobs[0].correlation_data.is_init_step);
    // Init params resolved with batch context
    assert_eq!(jobs[0].parameters["batch"], batch.id.as_str());

    let inits = env.inits(&batch.id);
    assert_eq!(inits[0].core.status, StepStatus::Dispatched);
}

#[tokio::test]
async fn last_init_success_activates_the_batch() {
    let env = TestEnv::new();
    let batch = detected_batch(&env).await;
    env.pump().await;
    let jobs = env.jobs("capacity");

    env.deliver_success(&jobs[0], Some(serde_json::json!({ "reserved": 25 })))
        .await;

    let batch = env.batch(&batch.id);
    assert_eq!(batch.status, BatchStatus::Active);
    let inits = env.inits(&batch.id);
    assert_eq!(inits[0].core.status, StepStatus::Succeeded);
    assert_eq!(
        inits[0].core.result,
        Some(serde_json::json!({ "reserved": 25 }))
    );
}

#[tokio::test]
async fn duplicate_batch_init_event_is_idempotent() {
    let env = TestEnv::new();
    let batch = detected_batch(&env).await;

    // Handle the same event twice (at-least-once delivery)
    let events = env.bus.drain_control(env.now());
    assert_eq!(events.len(), 1);
    env.orchestrator.handle_control(events[0].clone()).await.unwrap();
    env.orchestrator.handle_control(events[0].clone()).await.unwrap();

    // Only one dispatch: the second pass fails the pending→dispatched CAS
    let jobs = env.jobs("capacity");
    assert_eq!(jobs.len(), 1);
    assert_eq!(env.batch(&batch.id).status, BatchStatus::InitDispatched);
}

#[tokio::test]
async fn duplicate_init_result_is_a_noop() {
    let env = TestEnv::new();
    let batch = detected_batch(&env).await;
    env.pump().await;
    let jobs = env.jobs("capacity");

    env.deliver_success(&jobs[0], None).await;
    env.deliver_success(&jobs[0], None).await;

    assert_eq!(env.batch(&batch.id).status, BatchStatus::Active);
}
