// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{json_row, TestEnv};
use convoy_core::{BatchStatus, MemberStatus, PhaseStatus, StepStatus};

fn yaml_with_on_failure(directive: &str) -> String {
    format!(
        r#"
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
        params: {{ mailbox: "{{{{mailbox}}}}" }}
        on_failure: "{directive}"
        retry: {{ max: 0, interval: 1m }}
      - name: verify
        worker_id: exchange
        function: verify_mailbox
        params: {{ mailbox: "{{{{mailbox}}}}" }}
rollbacks:
  undo-move:
    - name: restore
      worker_id: exchange
      function: restore_mailbox
      params: {{ mailbox: "{{{{mailbox}}}}" }}
"#
    )
}

async fn two_member_batch(env: &TestEnv, yaml: &str) -> Vec<convoy_core::JobEnvelope> {
    env.register("tenant-move", 1, yaml);
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[json_row("u1"), json_row("u2")],
    );
    env.tick().await;
    env.pump().await;
    let jobs = env.jobs("exchange");
    assert_eq!(jobs.len(), 2);
    jobs
}

fn job_for<'a>(
    jobs: &'a [convoy_core::JobEnvelope],
    mailbox: &str,
) -> &'a convoy_core::JobEnvelope {
    jobs.iter()
        .find(|j| j.parameters["mailbox"] == mailbox)
        .unwrap()
}

#[tokio::test]
async fn skip_fails_the_member_and_the_phase_proceeds() {
    let env = TestEnv::new();
    let jobs = two_member_batch(&env, &yaml_with_on_failure("skip")).await;

    env.deliver_failure(job_for(&jobs, "u1@contoso.com"), "mailbox corrupt", false)
        .await;

    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    let u1 = members.iter().find(|m| m.member_key == "u1").unwrap();
    assert_eq!(u1.status, MemberStatus::Failed);
    assert!(u1.failed_at.is_some());

    // u1's verify step was skipped, not left dangling
    let u1_steps = env
        .store
        .read(|state| state.steps_of_member(&u1.id).into_iter().cloned().collect::<Vec<_>>());
    let verify = u1_steps.iter().find(|s| s.core.step_name == "verify").unwrap();
    assert_eq!(verify.core.status, StepStatus::Skipped);

    // u2 runs to completion and the batch completes with one survivor
    env.deliver_success(job_for(&jobs, "u2@contoso.com"), None).await;
    let u2_verify = env.jobs("exchange");
    assert_eq!(u2_verify.len(), 1);
    env.deliver_success(&u2_verify[0], None).await;

    assert_eq!(env.batch(&batch.id).status, BatchStatus::Completed);
}

#[tokio::test]
async fn rollback_directive_dispatches_the_named_sequence() {
    let env = TestEnv::new();
    let jobs = two_member_batch(&env, &yaml_with_on_failure("rollback:undo-move")).await;

    env.deliver_failure(job_for(&jobs, "u1@contoso.com"), "half-moved", false)
        .await;

    let rollback_jobs = env.jobs("exchange");
    assert_eq!(rollback_jobs.len(), 1);
    assert_eq!(rollback_jobs[0].function_name, "restore_mailbox");
    assert_eq!(rollback_jobs[0].parameters["mailbox"], "u1@contoso.com");
    assert!(rollback_jobs[0].job_id.starts_with("rollback-"));

    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    let u1 = members.iter().find(|m| m.member_key == "u1").unwrap();
    assert_eq!(u1.status, MemberStatus::Failed);
}

#[tokio::test]
async fn fail_phase_fails_the_phase_and_cancels_its_open_steps() {
    let env = TestEnv::new();
    let jobs = two_member_batch(&env, &yaml_with_on_failure("fail_phase")).await;

    env.deliver_failure(job_for(&jobs, "u1@contoso.com"), "fatal", false)
        .await;

    let batch = env.only_batch("tenant-move");
    let phases = env
        .store
        .read(|state| state.phases_of_batch(&batch.id).into_iter().cloned().collect::<Vec<_>>());
    assert_eq!(phases[0].status, PhaseStatus::Failed);

    // u2's in-flight step was cancelled so nothing dangles
    let members = env.members(&batch.id);
    let u2 = members.iter().find(|m| m.member_key == "u2").unwrap();
    let u2_steps = env
        .store
        .read(|state| state.steps_of_member(&u2.id).into_iter().cloned().collect::<Vec<_>>());
    assert!(u2_steps
        .iter()
        .all(|s| s.core.status.is_terminal()));

    // All phases terminal with a surviving member → batch completed
    assert_eq!(env.batch(&batch.id).status, BatchStatus::Completed);
}

#[tokio::test]
async fn fail_batch_fails_everything() {
    let env = TestEnv::new();
    let jobs = two_member_batch(&env, &yaml_with_on_failure("fail_batch")).await;

    env.deliver_failure(job_for(&jobs, "u1@contoso.com"), "catastrophic", false)
        .await;

    let batch = env.only_batch("tenant-move");
    assert_eq!(batch.status, BatchStatus::Failed);

    // Every remaining non-terminal step was cancelled
    let members = env.members(&batch.id);
    for member in &members {
        let steps = env.store.read(|state| {
            state
                .steps_of_member(&member.id)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        });
        assert!(steps.iter().all(|s| s.core.status.is_terminal()));
    }

    // Terminal batches never transition again
    env.deliver_success(job_for(&jobs, "u2@contoso.com"), None).await;
    assert_eq!(env.batch(&batch.id).status, BatchStatus::Failed);
}

#[tokio::test]
async fn template_failure_fails_the_member_at_expansion() {
    let env = TestEnv::new();
    let yaml = r#"
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
        params: { target: "{{forwarding_address}}" }
"#;
    env.register("tenant-move", 1, yaml);
    // u1 lacks the referenced column, u2 has it
    env.datasource.set_rows(
        "SELECT user_id, mailbox FROM waves",
        &[
            json_row("u1"),
            serde_json::json!({
                "user_id": "u2",
                "mailbox": "u2@contoso.com",
                "forwarding_address": "u2@fabrikam.com",
            }),
        ],
    );
    env.tick().await;
    env.pump().await;

    // Only u2 got a job
    let jobs = env.jobs("exchange");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].parameters["target"], "u2@fabrikam.com");

    let batch = env.only_batch("tenant-move");
    let members = env.members(&batch.id);
    let u1 = members.iter().find(|m| m.member_key == "u1").unwrap();
    assert_eq!(u1.status, MemberStatus::Failed);

    let u1_steps = env
        .store
        .read(|state| state.steps_of_member(&u1.id).into_iter().cloned().collect::<Vec<_>>());
    assert_eq!(u1_steps[0].core.status, StepStatus::Failed);
    assert!(u1_steps[0]
        .core
        .error_message
        .as_deref()
        .unwrap()
        .contains("forwarding_address"));

    // u2 finishes; batch completes despite u1's failure
    env.deliver_success(&jobs[0], None).await;
    assert_eq!(env.batch(&batch.id).status, BatchStatus::Completed);
}
