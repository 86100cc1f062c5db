// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{json_row, TestEnv};
use chrono::Duration;
use convoy_core::{test_support, BatchStatus, ControlEvent, MemberStatus, StepStatus};

const POLLING_YAML: &str = r#"
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
        on_failure: skip
        poll: { interval: 30s, timeout: 5m }
"#;

async fn polling_step(env: &TestEnv) -> convoy_core::StepExecutionId {
    env.register("tenant-move", 1, POLLING_YAML);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.pump().await;
    let jobs = env.jobs("exchange");

    // First response: not complete yet → step starts polling
    env.orchestrator
        .handle_result(test_support::poll_in_progress(
            &jobs[0].job_id,
            jobs[0].correlation_data.clone(),
            env.now(),
        ))
        .await
        .unwrap();

    convoy_core::StepExecutionId::new(
        jobs[0]
            .correlation_data
            .step_execution_id
            .clone()
            .unwrap(),
    )
}

#[tokio::test]
async fn poll_rounds_until_complete_record_data() {
    let env = TestEnv::new();
    let step_id = polling_step(&env).await;
    assert_eq!(env.step(&step_id).core.status, StepStatus::Polling);
    assert_eq!(env.step(&step_id).core.poll_count, 0);

    // Round 1: interval elapses, sweep publishes a poll-check
    env.advance(Duration::seconds(31));
    env.tick().await;
    let events = env.bus.drain_control(env.now());
    let poll_check = events
        .iter()
        .find(|e| matches!(e, ControlEvent::PollCheck { .. }))
        .unwrap();
    match poll_check {
        ControlEvent::PollCheck {
            poll_count,
            is_init_step,
            ..
        } => {
            assert_eq!(*poll_count, 1);
            assert!(!is_init_step);
        }
        _ => unreachable!(),
    }
    env.orchestrator.handle_control(poll_check.clone()).await.unwrap();

    let round1 = env.jobs("exchange");
    assert_eq!(round1.len(), 1);
    assert!(round1[0].job_id.ends_with("-poll-1"));
    env.orchestrator
        .handle_result(test_support::poll_in_progress(
            &round1[0].job_id,
            round1[0].correlation_data.clone(),
            env.now(),
        ))
        .await
        .unwrap();

    // Round 2: still in progress
    env.advance(Duration::seconds(31));
    env.tick().await;
    env.pump().await;
    let round2 = env.jobs("exchange");
    assert_eq!(round2.len(), 1);
    assert!(round2[0].job_id.ends_with("-poll-2"));

    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::Polling);
    assert_eq!(step.core.poll_count, 2);

    // Round 2 completes with data
    env.orchestrator
        .handle_result(test_support::poll_complete(
            &round2[0].job_id,
            round2[0].correlation_data.clone(),
            serde_json::json!({ "items_moved": 1204 }),
            env.now(),
        ))
        .await
        .unwrap();

    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::Succeeded);
    assert_eq!(
        step.core.result,
        Some(serde_json::json!({ "items_moved": 1204 }))
    );
    assert_eq!(
        env.only_batch("tenant-move").status,
        BatchStatus::Completed
    );
}

#[tokio::test]
async fn poll_timeout_applies_on_failure() {
    let env = TestEnv::new();
    let step_id = polling_step(&env).await;

    // Blow past the 5-minute timeout
    env.advance(Duration::minutes(6));
    env.tick().await;

    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::PollTimeout);
    assert!(step
        .core
        .error_message
        .as_deref()
        .unwrap()
        .contains("timed out"));

    // on_failure = skip: the member fails, the phase proceeds to its end
    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    assert_eq!(members[0].status, MemberStatus::Failed);
    assert_eq!(env.batch(&batch.id).status, BatchStatus::Failed);
}

#[tokio::test]
async fn stale_poll_round_results_are_ignored() {
    let env = TestEnv::new();
    let step_id = polling_step(&env).await;

    env.advance(Duration::seconds(31));
    env.tick().await;
    env.pump().await;
    let round1 = env.jobs("exchange");

    // Another round begins before round 1's answer lands
    env.advance(Duration::seconds(31));
    env.tick().await;
    env.pump().await;
    let round2 = env.jobs("exchange");
    assert!(round2[0].job_id.ends_with("-poll-2"));

    // Round 1's late completion no longer matches the current job id
    env.orchestrator
        .handle_result(test_support::poll_complete(
            &round1[0].job_id,
            round1[0].correlation_data.clone(),
            serde_json::json!({ "stale": true }),
            env.now(),
        ))
        .await
        .unwrap();
    assert_eq!(env.step(&step_id).core.status, StepStatus::Polling);

    // The current round's completion still wins
    env.orchestrator
        .handle_result(test_support::poll_complete(
            &round2[0].job_id,
            round2[0].correlation_data.clone(),
            serde_json::json!({ "fresh": true }),
            env.now(),
        ))
        .await
        .unwrap();
    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::Succeeded);
    assert_eq!(step.core.result, Some(serde_json::json!({ "fresh": true })));
}
