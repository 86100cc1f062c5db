// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario D: polling step completing on the third response.

use crate::prelude::Harness;
use chrono::Duration;
use convoy_core::{BatchStatus, StepStatus};

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
        poll: { interval: 30s, timeout: 5m }
"#;

#[tokio::test]
async fn polls_twice_then_succeeds_with_data() {
    let h = Harness::new();
    h.register("wave", 1, YAML);
    h.datasource.set_rows(
        "SELECT user_id FROM wave",
        &[serde_json::json!({ "user_id": "u1" })],
    );
    h.tick_and_pump().await;
    let initial = h.jobs("exchange");
    assert_eq!(initial.len(), 1);

    // First worker response: not complete → polling begins
    h.poll_in_progress(&initial[0]).await;

    let batch = h.only_batch("wave");
    let step_id = h.steps_of_batch(&batch.id)[0].id.clone();
    let step = |h: &Harness| {
        h.store
            .read(|state| state.get_step(&step_id).cloned())
            .unwrap()
    };
    assert_eq!(step(&h).core.status, StepStatus::Polling);

    // Two poll rounds, each still in progress
    for expected_count in 1..=2u32 {
        h.advance_time(Duration::seconds(31));
        h.tick_and_pump().await;
        let round = h.jobs("exchange");
        assert_eq!(round.len(), 1);
        assert_eq!(step(&h).core.poll_count, expected_count);
        if expected_count < 2 {
            h.poll_in_progress(&round[0]).await;
        } else {
            // Third response completes with data
            h.poll_complete(&round[0], serde_json::json!({ "items": 812 }))
                .await;
        }
    }

    let done = step(&h);
    assert_eq!(done.core.status, StepStatus::Succeeded);
    assert_eq!(done.core.poll_count, 2);
    assert_eq!(done.core.result, Some(serde_json::json!({ "items": 812 })));
    assert_eq!(h.batch(&batch.id).status, BatchStatus::Completed);
}
