// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{json_row, TestEnv};
use chrono::Duration;
use convoy_core::{BatchStatus, ControlEvent, StepStatus};

const RETRY_YAML: &str = r#"
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
        retry: { max: 2, interval: 1m }
"#;

const SKIP_YAML: &str = r#"
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
"#;

async fn dispatched_job(env: &TestEnv, yaml: &str) -> convoy_core::JobEnvelope {
    env.register("tenant-move", 1, yaml);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1")],
    );
    env.tick().await;
    env.pump().await;
    let mut jobs = env.jobs("exchange");
    assert_eq!(jobs.len(), 1);
    jobs.remove(0)
}

#[tokio::test]
async fn throttled_failure_schedules_backoff_retry() {
    let env = TestEnv::new();
    let job = dispatched_job(&env, RETRY_YAML).await;
    let step_id = convoy_core::StepExecutionId::new(
        job.correlation_data.step_execution_id.clone().unwrap(),
    );

    env.deliver_failure(&job, "mailbox locked", true).await;

    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::Pending);
    assert_eq!(step.core.retry_count, 1);
    // FixedJitter(0.5) → exactly the exponential value: 60s base
    let expected = env.now() + Duration::seconds(60);
    assert_eq!(step.core.retry_after, Some(expected));

    // retry-check is deferred until the backoff deadline
    let scheduled = env.bus.scheduled_control();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0, expected);
    assert!(matches!(
        scheduled[0].1,
        ControlEvent::RetryCheck { is_init_step: false, .. }
    ));
    assert!(env.bus.drain_control(env.now()).is_empty());

    // Deadline passes; the retry dispatches with a retry job id
    env.advance(Duration::seconds(61));
    env.pump().await;
    let retried = env.jobs("exchange");
    assert_eq!(retried.len(), 1);
    assert!(retried[0].job_id.ends_with("-retry-1"));

    env.deliver_success(&retried[0], None).await;
    assert_eq!(env.step(&step_id).core.status, StepStatus::Succeeded);
    assert_eq!(
        env.only_batch("tenant-move").status,
        BatchStatus::Completed
    );
}

#[tokio::test]
async fn backoff_doubles_on_subsequent_retries() {
    let env = TestEnv::new();
    let job = dispatched_job(&env, RETRY_YAML).await;
    let step_id = convoy_core::StepExecutionId::new(
        job.correlation_data.step_execution_id.clone().unwrap(),
    );

    env.deliver_failure(&job, "transient", false).await;
    assert_eq!(
        env.step(&step_id).core.retry_after,
        Some(env.now() + Duration::seconds(60))
    );

    env.advance(Duration::seconds(61));
    env.pump().await;
    let retry1 = env.jobs("exchange").remove(0);
    env.deliver_failure(&retry1, "transient again", false).await;

    // Second retry waits 2× the base interval
    let step = env.step(&step_id);
    assert_eq!(step.core.retry_count, 2);
    assert_eq!(step.core.retry_after, Some(env.now() + Duration::seconds(120)));
}

#[tokio::test]
async fn exhausted_budget_fails_terminally() {
    let env = TestEnv::new();
    let job = dispatched_job(&env, RETRY_YAML).await;
    let step_id = convoy_core::StepExecutionId::new(
        job.correlation_data.step_execution_id.clone().unwrap(),
    );

    // max = 2: two retries then terminal failure
    env.deliver_failure(&job, "fail 1", false).await;
    env.advance(Duration::seconds(61));
    env.pump().await;
    let retry1 = env.jobs("exchange").remove(0);
    env.deliver_failure(&retry1, "fail 2", false).await;
    env.advance(Duration::seconds(121));
    env.pump().await;
    let retry2 = env.jobs("exchange").remove(0);
    env.deliver_failure(&retry2, "fail 3", false).await;

    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::Failed);
    assert_eq!(step.core.error_message.as_deref(), Some("fail 3"));
    assert_eq!(step.core.retry_count, 2);

    // Sole member failed → batch failed
    assert_eq!(env.only_batch("tenant-move").status, BatchStatus::Failed);
}

#[tokio::test]
async fn throttle_wins_over_skip_directive() {
    let env = TestEnv::new();
    let job = dispatched_job(&env, SKIP_YAML).await;
    let step_id = convoy_core::StepExecutionId::new(
        job.correlation_data.step_execution_id.clone().unwrap(),
    );

    // skip would normally fail terminally, but throttled retries win
    env.deliver_failure(&job, "throttled by tenant", true).await;
    let step = env.step(&step_id);
    assert_eq!(step.core.status, StepStatus::Pending);
    assert_eq!(step.core.retry_count, 1);

    // A non-throttled failure under skip is terminal
    env.advance(Duration::seconds(61));
    env.pump().await;
    let retried = env.jobs("exchange").remove(0);
    env.deliver_failure(&retried, "hard failure", false).await;
    assert_eq!(env.step(&step_id).core.status, StepStatus::Failed);
}

#[tokio::test]
async fn duplicate_failure_result_schedules_only_one_retry() {
    let env = TestEnv::new();
    let job = dispatched_job(&env, RETRY_YAML).await;
    let step_id = convoy_core::StepExecutionId::new(
        job.correlation_data.step_execution_id.clone().unwrap(),
    );

    env.deliver_failure(&job, "flaky", false).await;
    env.deliver_failure(&job, "flaky", false).await;

    let step = env.step(&step_id);
    assert_eq!(step.core.retry_count, 1);
    assert_eq!(env.bus.scheduled_control().len(), 1);
}
