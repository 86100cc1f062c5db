// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the scenario specs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use convoy_adapters::{FakeDataSource, FakeLease, InMemoryBus};
use convoy_core::{Batch, BatchId, Clock, FakeClock, JobEnvelope, StepExecution, WorkerId};
use convoy_core::test_support;
use convoy_engine::{
    register_runbook, FixedJitter, Orchestrator, Scheduler, SchedulerConfig,
};
use convoy_storage::Store;

pub struct Harness {
    pub store: Store,
    pub bus: InMemoryBus,
    pub clock: FakeClock,
    pub datasource: FakeDataSource,
    pub scheduler: Scheduler<InMemoryBus, FakeDataSource, FakeLease, FakeClock, FixedJitter>,
    pub orchestrator: Orchestrator<InMemoryBus, FakeClock, FixedJitter>,
}

impl Harness {
    pub fn at(start: DateTime<Utc>) -> Self {
        let store = Store::new();
        let bus = InMemoryBus::new();
        let clock = FakeClock::at(start);
        let datasource = FakeDataSource::new();
        let scheduler = Scheduler::with_jitter(
            store.clone(),
            bus.clone(),
            datasource.clone(),
            FakeLease::new(),
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
            scheduler,
            orchestrator,
        }
    }

    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap())
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    pub fn register(&self, name: &str, version: u32, yaml: &str) {
        register_runbook(&self.store, name, version, yaml, self.now()).unwrap();
    }

    /// One scheduler tick plus a full control-event pump.
    pub async fn tick_and_pump(&self) {
        self.scheduler.run_tick().await.unwrap();
        self.pump().await;
    }

    pub async fn pump(&self) {
        loop {
            let events = self.bus.drain_control(self.now());
            if events.is_empty() {
                return;
            }
            for event in events {
                self.orchestrator.handle_control(event).await.unwrap();
            }
        }
    }

    pub fn jobs(&self, worker: &str) -> Vec<JobEnvelope> {
        self.bus.drain_jobs(&WorkerId::new(worker), self.now())
    }

    pub async fn succeed(&self, job: &JobEnvelope, data: Option<serde_json::Value>) {
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

    pub async fn fail(&self, job: &JobEnvelope, message: &str, throttled: bool) {
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

    pub async fn poll_in_progress(&self, job: &JobEnvelope) {
        self.orchestrator
            .handle_result(test_support::poll_in_progress(
                &job.job_id,
                job.correlation_data.clone(),
                self.now(),
            ))
            .await
            .unwrap();
    }

    pub async fn poll_complete(&self, job: &JobEnvelope, data: serde_json::Value) {
        self.orchestrator
            .handle_result(test_support::poll_complete(
                &job.job_id,
                job.correlation_data.clone(),
                data,
                self.now(),
            ))
            .await
            .unwrap();
    }

    pub fn only_batch(&self, runbook: &str) -> Batch {
        let batches: Vec<Batch> = self.store.read(|state| {
            state
                .batches_of_runbook(runbook)
                .into_iter()
                .cloned()
                .collect()
        });
        assert_eq!(batches.len(), 1, "expected exactly one batch");
        batches.into_iter().next().unwrap()
    }

    pub fn batch(&self, id: &BatchId) -> Batch {
        self.store
            .read(|state| state.get_batch(id).cloned())
            .unwrap()
    }

    pub fn steps_of_batch(&self, batch_id: &BatchId) -> Vec<StepExecution> {
        self.store.read(|state| {
            state
                .phases_of_batch(batch_id)
                .iter()
                .flat_map(|p| state.steps_of_phase(&p.id))
                .cloned()
                .collect()
        })
    }

    pub fn advance_time(&self, duration: Duration) {
        self.clock.advance(duration);
    }
}
