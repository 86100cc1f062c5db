// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service wiring: store, bus, lease, data source, and the three loops
//! (tick, control consumer, result consumer).
//!
//! The bus client, store handle, and lease client are process-lifetime
//! singletons injected here; handlers are message scoped.

use convoy_adapters::{DataSource, FileLease, InMemoryBus, JsonFileDataSource, LeaseClient};
use convoy_core::{Clock, SystemClock};
use convoy_engine::{EngineError, Orchestrator, Scheduler, SchedulerConfig};
use convoy_storage::Store;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Service configuration, resolved from the environment in `main`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub state_dir: PathBuf,
    pub tick_interval: Duration,
    pub lease_ttl: Duration,
    /// Messages a consumer handles per drain round
    pub prefetch: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            state_dir: crate::env::state_dir(),
            tick_interval: crate::env::tick_interval(),
            lease_ttl: crate::env::lease_ttl(),
            prefetch: crate::env::prefetch(),
        }
    }
}

/// The assembled daemon: scheduler + orchestrator over shared store and
/// bus.
pub struct Service<D = JsonFileDataSource, L = FileLease>
where
    D: DataSource,
    L: LeaseClient,
{
    pub store: Store,
    pub bus: InMemoryBus,
    scheduler: Scheduler<InMemoryBus, D, L, SystemClock>,
    orchestrator: Arc<Orchestrator<InMemoryBus, SystemClock>>,
    config: ServiceConfig,
    shutdown: Arc<AtomicBool>,
}

impl Service<JsonFileDataSource, FileLease> {
    /// Default wiring: file lease under the state dir, JSON-file data
    /// source.
    pub fn new(config: ServiceConfig) -> Self {
        let lease = FileLease::new(config.state_dir.join("leases"));
        Self::with_adapters(config, JsonFileDataSource::new(), lease)
    }
}

impl<D, L> Service<D, L>
where
    D: DataSource,
    L: LeaseClient,
{
    pub fn with_adapters(config: ServiceConfig, datasource: D, lease: L) -> Self {
        let store = Store::new();
        let bus = InMemoryBus::new();
        let clock = SystemClock;
        let scheduler = Scheduler::new(
            store.clone(),
            bus.clone(),
            datasource,
            lease,
            clock.clone(),
            SchedulerConfig {
                lease_name: "scheduler".to_string(),
                lease_ttl: config.lease_ttl,
                tick_interval: config.tick_interval,
            },
        );
        let orchestrator = Arc::new(Orchestrator::new(store.clone(), bus.clone(), clock));
        let shutdown = scheduler.shutdown_flag();
        Self {
            store,
            bus,
            scheduler,
            orchestrator,
            config,
            shutdown,
        }
    }

    /// Request shutdown; the tick stops between runbooks and the loops
    /// drain out.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator<InMemoryBus, SystemClock>> {
        Arc::clone(&self.orchestrator)
    }

    /// Run one consumer round: a bounded slice of control events and
    /// results. Returns how many messages were handled.
    pub async fn consume_round(&self) -> usize {
        let now = SystemClock.now_utc();
        let mut handled = 0;

        let control = self.bus.drain_control(now);
        for event in control.into_iter().take(self.config.prefetch) {
            let summary = event.log_summary();
            if let Err(error) = self.orchestrator.handle_control(event).await {
                // Unprocessable messages must not block the loop
                tracing::error!(event = %summary, %error, "control handler failed, dropping");
            }
            handled += 1;
        }

        let results = self.bus.drain_results(now);
        for result in results.into_iter().take(self.config.prefetch) {
            let job_id = result.job_id.clone();
            if let Err(error) = self.orchestrator.handle_result(result).await {
                tracing::error!(job = %job_id, %error, "result handler failed, dropping");
            }
            handled += 1;
        }
        handled
    }

    /// Run the daemon until shutdown: the periodic tick plus the
    /// consumer loops, multiplexed on one select.
    pub async fn run(&self) -> Result<(), EngineError> {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        // Deferred retry-checks need sub-tick wakeups
        let mut deferred_check = tokio::time::interval(Duration::from_secs(1));

        loop {
            if self.is_shutting_down() {
                tracing::info!("shutdown flag set, daemon loop exiting");
                return Ok(());
            }

            tokio::select! {
                _ = tick.tick() => {
                    if let Err(error) = self.scheduler.run_tick().await {
                        tracing::error!(%error, "tick failed");
                    }
                }
                _ = self.bus.notified() => {
                    while self.consume_round().await > 0 {}
                }
                _ = deferred_check.tick() => {
                    // Promote deferred messages whose enqueue time arrived
                    while self.consume_round().await > 0 {}
                }
            }
        }
    }
}
