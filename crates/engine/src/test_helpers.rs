// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for scheduler and runtime tests.

use crate::jitter::FixedJitter;
use crate::registry::register_runbook;
use crate::runtime::Orchestrator;
use crate::scheduler::{Scheduler, SchedulerConfig};
use chrono::{DateTime, Duration, TimeZone, Utc};
use convoy_adapters::{FakeDataSource, FakeLease, InMemoryBus};
use convoy_core::{
    test_support, Batch, BatchId, BatchMember, Clock, FakeClock, InitExecution, JobEnvelope,
    StepExecution, StepExecutionId, WorkerId,
};
use convoy_storage::Store;

/// Immediate-mode runbook: one phase, one step, no inits.
pub(crate) const IMMEDIATE_YAML: &str = r#"
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
        params: { user: "{{user_id}}", batch: "{{_batch_id}}" }
"#;

/// Column-mode runbook with a preamble phase five days out and a
/// two-step cutover chain.
pub(crate) const SCHEDULED_YAML: &str = r#"
name: tenant-move
data_source:
  type: sql
  connection: MIGRATION_DB
  query: "SELECT user_id, mailbox, migrate_at FROM waves"
  primary_key: user_id
  batch_time: column
  batch_time_column: migrate_at
init:
  - name: reserve-capacity
    worker_id: capacity
    function: reserve
    params: { batch: "{{_batch_id}}" }
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
      - name: move-mailbox
        worker_id: exchange
        function: move_mailbox
        params: { mailbox: "{{mailbox}}" }
      - name: verify
        worker_id: exchange
        function: verify_mailbox
        params: { mailbox: "{{mailbox}}" }
"#;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap()
}

pub(crate) fn json_row(key: &str) -> serde_json::Value {
    serde_json::json!({ "user_id": key, "mailbox": format!("{key}@contoso.com") })
}

pub(crate) fn scheduled_row(key: &str, migrate_at: &str) -> serde_json::Value {
    serde_json::json!({
        "user_id": key,
        "mailbox": format!("{key}@contoso.com"),
        "migrate_at": migrate_at,
    })
}

pub(crate) struct TestEnv {
    pub store: Store,
    pub bus: InMemoryBus,
    pub clock: FakeClock,
    pub datasource: FakeDataSource,
    pub lease: FakeLease,
    pub scheduler: Scheduler<InMemoryBus, FakeDataSource, FakeLease, FakeClock, FixedJitter>,
    pub orchestrator: Orchestrator<InMemoryBus, FakeClock, FixedJitter>,
}

impl TestEnv {
    pub fn new() -> Self {
        let store = Store::new();
        let bus = InMemoryBus::new();
        let clock = FakeClock::at(t0());
        let datasource = FakeDataSource::new();
        let lease = FakeLease::new();
        let scheduler = Scheduler::with_jitter(
            store.clone(),
            bus.clone(),
            datasource.clone(),
            lease.clone(),
            clock.clone(),
            SchedulerConfig::default(),
            FixedJitter(0.5),
        );
        let orchestrator =
            Orchestrator::with_jitter(store.clone(), bus.clone(), clock.clone(), FixedJitter(0.5));
        Self {
            store,
            bus,
            clock,
            datasource,
            lease,
            scheduler,
            orchestrator,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }

    pub fn register(&self, name: &str, version: u32, yaml: &str) {
        register_runbook(&self.store, name, version, yaml, self.now()).unwrap();
    }

    pub async fn tick(&self) {
        self.scheduler.run_tick().await.unwrap();
    }

    /// Drain and handle control events until the channel is quiet.
    pub async fn pump(&self) -> usize {
        let mut handled = 0;
        loop {
            let events = self.bus.drain_control(self.now());
            if events.is_empty() {
                return handled;
            }
            for event in events {
                self.orchestrator.handle_control(event).await.unwrap();
                handled += 1;
            }
        }
    }

    pub fn jobs(&self, worker: &str) -> Vec<JobEnvelope> {
        self.bus.drain_jobs(&WorkerId::new(worker), self.now())
    }

    pub async fn deliver_success(&self, job: &JobEnvelope, data: Option<serde_json::Value>) {
        self.orchestrator
            .handle_result(test_support::success_result(
                &job.job_id,
                job.correlation_data.clone(),
                data,
                self.now(),
            ))
            .await
            .unwrap();
    }

    pub async fn deliver_failure(&self, job: &JobEnvelope, message: &str, throttled: bool) {
        self.orchestrator
            .handle_result(test_support::failure_result(
                &job.job_id,
                job.correlation_data.clone(),
                message,
                throttled,
                self.now(),
            ))
            .await
            .unwrap();
    }

    pub fn only_batch(&self, runbook: &str) -> Batch {
        let batches: Vec<Batch> = self
            .store
            .read(|state| state.batches_of_runbook(runbook).into_iter().cloned().collect());
        assert_eq!(batches.len(), 1, "expected exactly one batch");
        batches.into_iter().next().unwrap()
    }

    pub fn batch(&self, id: &BatchId) -> Batch {
        self.store.read(|state| state.get_batch(id).cloned()).unwrap()
    }

    pub fn step(&self, id: &StepExecutionId) -> StepExecution {
        self.store.read(|state| state.get_step(id).cloned()).unwrap()
    }

    pub fn members(&self, batch_id: &BatchId) -> Vec<BatchMember> {
        self.store
            .read(|state| state.members_of_batch(batch_id).into_iter().cloned().collect())
    }

    pub fn inits(&self, batch_id: &BatchId) -> Vec<InitExecution> {
        self.store
            .read(|state| state.inits_of_batch(batch_id).into_iter().cloned().collect())
    }
}
