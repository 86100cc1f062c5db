// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario C: member diff across ticks.

use crate::prelude::Harness;
use chrono::Duration;
use convoy_core::{ControlEvent, MemberStatus};

const YAML: &str = r#"
name: wave
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, mailbox FROM wave"
  primary_key: user_id
  batch_time: immediate
phases:
  - name: cutover
    offset: T-0
    steps:
      - name: move
        worker_id: exchange
        function: move_mailbox
        params: { mailbox: "{{mailbox}}" }
        poll: { interval: 1h, timeout: 2h }
"#;

fn row(key: &str, mailbox: &str) -> serde_json::Value {
    serde_json::json!({ "user_id": key, "mailbox": mailbox })
}

#[tokio::test]
async fn second_tick_diffs_the_population() {
    let h = Harness::new();
    h.register("wave", 1, YAML);
    h.datasource.set_rows(
        "SELECT user_id, mailbox FROM wave",
        &[row("u1", "u1@contoso.com"), row("u2", "u2@contoso.com")],
    );
    h.tick_and_pump().await;
    h.jobs("exchange");

    // Tick 2, same window: u1 gone, u2 retained with new data, u3 new
    h.advance_time(Duration::minutes(1));
    h.datasource.set_rows(
        "SELECT user_id, mailbox FROM wave",
        &[row("u2", "u2@fabrikam.com"), row("u3", "u3@contoso.com")],
    );
    h.scheduler.run_tick().await.unwrap();

    let events = h.bus.drain_control(h.now());
    assert!(events.iter().any(
        |e| matches!(e, ControlEvent::MemberAdded { member_key, .. } if member_key == "u3")
    ));
    assert!(events.iter().any(
        |e| matches!(e, ControlEvent::MemberRemoved { member_key, .. } if member_key == "u1")
    ));

    let batch = h.only_batch("wave");
    let members: Vec<_> = h
        .store
        .read(|state| state.members_of_batch(&batch.id).into_iter().cloned().collect::<Vec<_>>());
    let by_key = |key: &str| members.iter().find(|m| m.member_key == key).unwrap();

    assert_eq!(by_key("u1").status, MemberStatus::Removed);
    assert_eq!(by_key("u2").status, MemberStatus::Active);
    assert_eq!(
        by_key("u2").data["mailbox"],
        serde_json::json!("u2@fabrikam.com")
    );
    assert_eq!(by_key("u3").status, MemberStatus::Active);

    // Handling the events cancels u1's work and catches u3 up
    for event in events {
        h.orchestrator.handle_control(event).await.unwrap();
    }
    let u3_jobs = h.jobs("exchange");
    assert_eq!(u3_jobs.len(), 1);
    assert_eq!(u3_jobs[0].parameters["mailbox"], "u3@contoso.com");

    let u1_steps = h
        .store
        .read(|state| state.steps_of_member(&by_key("u1").id).into_iter().cloned().collect::<Vec<_>>());
    assert!(u1_steps
        .iter()
        .all(|s| s.core.status == convoy_core::StepStatus::Cancelled));
}
