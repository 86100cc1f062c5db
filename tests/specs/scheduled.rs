// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario B: scheduled batch with a T-5d preamble phase.

use crate::prelude::Harness;
use chrono::{TimeZone, Utc};
use convoy_core::PhaseStatus;

const YAML: &str = r#"
name: mailbox-wave
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, migrate_at FROM wave"
  primary_key: user_id
  batch_time: column
  batch_time_column: migrate_at
phases:
  - name: preflight
    offset: T-5d
    steps:
      - name: provision
        worker_id: identity
        function: provision_user
        params: { user: "{{user_id}}" }
  - name: cutover
    offset: T-0
    steps:
      - name: move
        worker_id: exchange
        function: move_mailbox
        params: { user: "{{user_id}}" }
"#;

#[tokio::test]
async fn preamble_fires_five_days_early_and_cutover_waits() {
    // batch_start_time = 2030-01-10T00:00:00Z, tick at 2030-01-04
    let h = Harness::at(Utc.with_ymd_and_hms(2030, 1, 4, 0, 0, 0).single().unwrap());
    h.register("mailbox-wave", 1, YAML);
    h.datasource.set_rows(
        "SELECT user_id, migrate_at FROM wave",
        &[serde_json::json!({ "user_id": "u1", "migrate_at": "2030-01-10T00:00:00Z" })],
    );

    // Detection tick: preflight due 2030-01-05 is still in the future
    h.tick_and_pump().await;
    let batch = h.only_batch("mailbox-wave");
    assert_eq!(
        batch.batch_start_time,
        Some(Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap())
    );

    let phase_status = |name: &str| {
        h.store.read(|state| {
            state
                .phases_of_batch(&batch.id)
                .iter()
                .find(|p| p.phase_name == name)
                .map(|p| p.status)
                .unwrap()
        })
    };
    assert_eq!(phase_status("preflight"), PhaseStatus::Pending);
    assert_eq!(phase_status("cutover"), PhaseStatus::Pending);

    // Tick once the preamble is due: it dispatches, cutover stays put
    h.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 5, 0, 0, 0).single().unwrap());
    h.tick_and_pump().await;

    assert_eq!(phase_status("preflight"), PhaseStatus::Dispatched);
    assert_eq!(phase_status("cutover"), PhaseStatus::Pending);

    let jobs = h.jobs("identity");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].function_name, "provision_user");
    assert!(h.jobs("exchange").is_empty());
}
