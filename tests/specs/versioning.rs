// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario F: version transition with overdue_behavior = ignore.

use crate::prelude::Harness;
use chrono::{TimeZone, Utc};
use convoy_core::PhaseStatus;

const V1: &str = r#"
name: wave
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

const V2: &str = r#"
name: wave
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, migrate_at FROM wave"
  primary_key: user_id
  batch_time: column
  batch_time_column: migrate_at
phases:
  - name: dns-prep
    offset: T-6d
    steps:
      - name: prep
        worker_id: identity
        function: prep_dns
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
async fn v2_supersedes_open_phases_and_skips_overdue_ones() {
    let h = Harness::at(Utc.with_ymd_and_hms(2030, 1, 5, 0, 0, 0).single().unwrap());
    h.register("wave", 1, V1);
    h.datasource.set_rows(
        "SELECT user_id, migrate_at FROM wave",
        &[serde_json::json!({ "user_id": "u1", "migrate_at": "2030-01-10T00:00:00Z" })],
    );

    // Detection tick at exactly T-5d: preflight dispatches
    h.tick_and_pump().await;
    let batch = h.only_batch("wave");
    let phases = |h: &Harness| {
        h.store.read(|state| {
            state
                .phases_of_batch(&batch.id)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        })
    };
    assert!(phases(&h)
        .iter()
        .any(|p| p.phase_name == "preflight" && p.status == PhaseStatus::Dispatched));

    // v2 published with ignore semantics while v1's preflight is in flight
    let v2_with_ignore = format!("{}\noverdue_behavior: ignore\n", V2);
    h.register("wave", 2, &v2_with_ignore);
    h.tick_and_pump().await;

    let all = phases(&h);
    // Old phases: dispatched preflight and pending cutover both superseded
    assert!(all
        .iter()
        .filter(|p| p.runbook_version == 1)
        .all(|p| p.status == PhaseStatus::Superseded));

    // New phases: dns-prep was due 2030-01-04 (already past) → skipped;
    // cutover due 2030-01-10 → pending
    let dns = all
        .iter()
        .find(|p| p.runbook_version == 2 && p.phase_name == "dns-prep")
        .unwrap();
    let cutover = all
        .iter()
        .find(|p| p.runbook_version == 2 && p.phase_name == "cutover")
        .unwrap();
    assert_eq!(dns.status, PhaseStatus::Skipped);
    assert_eq!(cutover.status, PhaseStatus::Pending);
    assert_eq!(h.batch(&batch.id).runbook_version, 2);

    // At the start time, v2's cutover fires normally
    h.clock
        .set(Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap());
    h.tick_and_pump().await;
    let jobs = h.jobs("exchange");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].correlation_data.runbook_version, 2);
}
