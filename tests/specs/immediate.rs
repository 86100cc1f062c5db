// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario A: immediate batch, single phase, single step, success.

use crate::prelude::Harness;
use chrono::Duration;
use convoy_core::{BatchStatus, PhaseStatus, StepStatus};

const YAML: &str = r#"
name: echo-wave
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id FROM wave"
  primary_key: user_id
  batch_time: immediate
phases:
  - name: echo
    offset: T-0
    steps:
      - name: echo-user
        worker_id: echo
        function: echo
        params: { value: "{{user_id}}" }
"#;

#[tokio::test]
async fn immediate_batch_single_step_success() {
    let h = Harness::new();
    h.register("echo-wave", 1, YAML);
    h.datasource.set_rows(
        "SELECT user_id FROM wave",
        &[serde_json::json!({ "user_id": "u1" })],
    );

    h.tick_and_pump().await;

    // Batch row created, anchored in the current 5-minute window
    let batch = h.only_batch("echo-wave");
    let start = batch.batch_start_time.unwrap();
    assert!(start <= h.now() && h.now() < start + Duration::minutes(5));

    // Phase execution due within the window and already dispatched
    let phases = h.store.read(|state| {
        state
            .phases_of_batch(&batch.id)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    });
    assert_eq!(phases.len(), 1);
    assert!(phases[0].due_at.unwrap() <= h.now() + Duration::minutes(5));
    assert_eq!(phases[0].status, PhaseStatus::Dispatched);

    // The job carries the member's resolved value
    let jobs = h.jobs("echo");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters["value"], "u1");

    h.succeed(&jobs[0], Some(serde_json::json!({ "echoed": "u1" })))
        .await;

    let steps = h.steps_of_batch(&batch.id);
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].core.status, StepStatus::Succeeded);

    let batch = h.batch(&batch.id);
    assert_eq!(batch.status, BatchStatus::Completed);
    let phases = h.store.read(|state| {
        state
            .phases_of_batch(&batch.id)
            .into_iter()
            .cloned()
            .collect::<Vec<_>>()
    });
    assert_eq!(phases[0].status, PhaseStatus::Completed);
}
