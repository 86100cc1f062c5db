// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario E: throttled failure retried with backoff.

use crate::prelude::Harness;
use chrono::Duration;
use convoy_core::{BatchStatus, ControlEvent, StepStatus};

const YAML: &str = r#"
name: wave
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id FROM wave"
  primary_key: user_id
  batch_time: immediate
phases:
  - name: cutover
    offset: T-0
    steps:
      - name: move
        worker_id: exchange
        function: move_mailbox
        params: { user: "{{user_id}}" }
        retry: { max: 3, interval: 1m }
"#;

#[tokio::test]
async fn throttled_failure_retries_after_backoff_then_succeeds() {
    let h = Harness::new();
    h.register("wave", 1, YAML);
    h.datasource.set_rows(
        "SELECT user_id FROM wave",
        &[serde_json::json!({ "user_id": "u1" })],
    );
    h.tick_and_pump().await;
    let jobs = h.jobs("exchange");

    h.fail(&jobs[0], "429 too many requests", true).await;

    let batch = h.only_batch("wave");
    let step = h.steps_of_batch(&batch.id).remove(0);
    assert_eq!(step.core.status, StepStatus::Pending);
    assert_eq!(step.core.retry_count, 1);
    // FixedJitter(0.5) pins the backoff to the exponential value
    let expected_at = h.now() + Duration::seconds(60);
    assert_eq!(step.core.retry_after, Some(expected_at));

    // The retry-check is scheduled, not immediate
    let scheduled = h.bus.scheduled_control();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].0, expected_at);
    assert!(matches!(scheduled[0].1, ControlEvent::RetryCheck { .. }));
    assert!(h.bus.drain_control(h.now()).is_empty());

    // Deadline arrives: re-dispatch under a retry job id, then succeed
    h.advance_time(Duration::seconds(61));
    h.pump().await;
    let retried = h.jobs("exchange");
    assert_eq!(retried.len(), 1);
    assert!(retried[0].job_id.ends_with("-retry-1"));

    h.succeed(&retried[0], None).await;
    let step = h.steps_of_batch(&batch.id).remove(0);
    assert_eq!(step.core.status, StepStatus::Succeeded);
    assert_eq!(h.batch(&batch.id).status, BatchStatus::Completed);
}
