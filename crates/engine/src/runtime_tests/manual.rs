// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{TestEnv, SCHEDULED_YAML};
use crate::error::EngineError;
use crate::runtime::AdvanceOutcome;
use convoy_core::{BatchStatus, MemberStatus, PhaseStatus, StepStatus};
use std::collections::HashMap;

fn member_rows() -> Vec<(String, HashMap<String, serde_json::Value>)> {
    ["u1", "u2"]
        .iter()
        .map(|key| {
            let mut data = HashMap::new();
            data.insert("user_id".to_string(), serde_json::json!(key));
            data.insert(
                "mailbox".to_string(),
                serde_json::json!(format!("{key}@contoso.com")),
            );
            (key.to_string(), data)
        })
        .collect()
}

fn manual_batch(env: &TestEnv) -> convoy_core::BatchId {
    env.register("tenant-move", 1, SCHEDULED_YAML);
    env.orchestrator
        .create_manual_batch("tenant-move", "admin@contoso", &member_rows())
        .unwrap()
}

#[tokio::test]
async fn manual_batch_has_no_start_time_and_null_due_phases() {
    let env = TestEnv::new();
    let batch_id = manual_batch(&env);

    let batch = env.batch(&batch_id);
    assert!(batch.is_manual);
    assert!(batch.batch_start_time.is_none());
    assert_eq!(batch.status, BatchStatus::Detected);
    assert_eq!(batch.created_by.as_deref(), Some("admin@contoso"));

    let phases = env
        .store
        .read(|state| state.phases_of_batch(&batch_id).into_iter().cloned().collect::<Vec<_>>());
    assert_eq!(phases.len(), 2);
    assert!(phases.iter().all(|p| p.due_at.is_none()));

    // Time never advances a manual batch
    env.tick().await;
    assert!(env.bus.drain_control(env.now()).is_empty());
    assert_eq!(env.batch(&batch_id).status, BatchStatus::Detected);
}

#[tokio::test]
async fn advance_walks_inits_then_phases_in_order() {
    let env = TestEnv::new();
    let batch_id = manual_batch(&env);

    // 1. First advance publishes batch-init
    let outcome = env.orchestrator.advance(&batch_id).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::InitsDispatched);
    env.pump().await;
    let init_jobs = env.jobs("capacity");
    assert_eq!(init_jobs.len(), 1);

    // 2. While the init runs, advance is rejected with a wait error
    let err = env.orchestrator.advance(&batch_id).await.unwrap_err();
    assert!(matches!(err, EngineError::InitsInFlight(_)));

    env.deliver_success(&init_jobs[0], None).await;
    assert_eq!(env.batch(&batch_id).status, BatchStatus::Active);

    // 3. Next advance dispatches the earliest phase (largest offset)
    let outcome = env.orchestrator.advance(&batch_id).await.unwrap();
    assert_eq!(
        outcome,
        AdvanceOutcome::PhaseDispatched("preflight".to_string())
    );
    assert_eq!(
        env.batch(&batch_id).current_phase.as_deref(),
        Some("preflight")
    );
    env.pump().await;
    let preflight_jobs = env.jobs("identity");
    assert_eq!(preflight_jobs.len(), 2);

    // A dispatched phase blocks further advancement
    let err = env.orchestrator.advance(&batch_id).await.unwrap_err();
    assert!(matches!(err, EngineError::PhaseBlocked { .. }));

    for job in &preflight_jobs {
        env.deliver_success(job, None).await;
    }

    // 4. Cutover next; run its two-step chain for both members
    let outcome = env.orchestrator.advance(&batch_id).await.unwrap();
    assert_eq!(
        outcome,
        AdvanceOutcome::PhaseDispatched("cutover".to_string())
    );
    env.pump().await;
    let move_jobs = env.jobs("exchange");
    assert_eq!(move_jobs.len(), 2);
    for job in &move_jobs {
        env.deliver_success(job, None).await;
    }
    let verify_jobs = env.jobs("exchange");
    assert_eq!(verify_jobs.len(), 2);
    for job in &verify_jobs {
        env.deliver_success(job, None).await;
    }

    assert_eq!(env.batch(&batch_id).status, BatchStatus::Completed);

    // 5. Everything terminal: advance is a no-op success
    let outcome = env.orchestrator.advance(&batch_id).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::AllPhasesDone);
}

#[tokio::test]
async fn advance_with_everything_terminal_is_a_noop_success() {
    let env = TestEnv::new();
    let yaml = r#"
name: one-shot
data_source:
  type: sql
  connection: DB
  query: "SELECT user_id FROM t"
  primary_key: user_id
  batch_time: immediate
phases:
  - name: only
    offset: T-0
    steps:
      - { name: s, worker_id: w, function: f, params: { u: "{{user_id}}" } }
"#;
    env.register("one-shot", 1, yaml);
    let batch_id = env
        .orchestrator
        .create_manual_batch("one-shot", "admin", &member_rows()[..1].to_vec())
        .unwrap();

    let outcome = env.orchestrator.advance(&batch_id).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::PhaseDispatched("only".to_string()));
    env.pump().await;
    let jobs = env.jobs("w");
    env.deliver_success(&jobs[0], None).await;
    assert_eq!(env.batch(&batch_id).status, BatchStatus::Completed);

    // Advance on a finished batch reports no-op success
    let outcome = env.orchestrator.advance(&batch_id).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::AllPhasesDone);
}

#[tokio::test]
async fn cancel_cancels_everything_and_fails_the_batch() {
    let env = TestEnv::new();
    let batch_id = manual_batch(&env);

    env.orchestrator.advance(&batch_id).await.unwrap();
    env.pump().await;
    env.jobs("capacity");

    env.orchestrator.cancel(&batch_id).await.unwrap();

    let batch = env.batch(&batch_id);
    assert_eq!(batch.status, BatchStatus::Failed);
    let inits = env.inits(&batch_id);
    assert!(inits.iter().all(|i| i.core.status == StepStatus::Cancelled));
    let phases = env
        .store
        .read(|state| state.phases_of_batch(&batch_id).into_iter().cloned().collect::<Vec<_>>());
    assert!(phases.iter().all(|p| p.status == PhaseStatus::Failed));

    // Members are left as they were; only work is cancelled
    assert!(env
        .members(&batch_id)
        .iter()
        .all(|m| m.status == MemberStatus::Active));

    // Cancel is idempotent
    env.orchestrator.cancel(&batch_id).await.unwrap();
    assert_eq!(env.batch(&batch_id).status, BatchStatus::Failed);
}
