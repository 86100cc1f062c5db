// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The periodic scheduler tick.
//!
//! Single-writer per tick, enforced by a distributed lease. A tick
//! discovers members, synchronizes batches, fires due phases, applies
//! runbook version transitions, and sweeps polling executions. One
//! runbook's failure never blocks the others.

mod phases;
mod polls;
mod sync;
mod versions;

use crate::cache::RunbookCache;
use crate::error::EngineError;
use crate::jitter::{Jitter, RandomJitter};
use convoy_adapters::{Bus, DataSource, LeaseClient};
use convoy_core::{Clock, ControlEvent};
use convoy_adapters::PublishOpts;
use convoy_storage::{RunbookRecord, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scheduler timing configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Stable lease key; one holder ticks at a time
    pub lease_name: String,
    /// Must exceed the longest expected tick
    pub lease_ttl: Duration,
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let tick_interval = Duration::from_secs(300);
        Self {
            lease_name: "scheduler".to_string(),
            // 5× the tick period, so a wedged tick expires before the
            // backlog grows unbounded
            lease_ttl: tick_interval * 5,
            tick_interval,
        }
    }
}

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed { runbooks: usize },
    LeaseHeldElsewhere,
}

/// The time-driven half of the core.
pub struct Scheduler<B, D, L, C, J = RandomJitter> {
    pub(crate) store: Store,
    pub(crate) bus: B,
    pub(crate) datasource: D,
    pub(crate) lease: L,
    pub(crate) clock: C,
    pub(crate) jitter: J,
    pub(crate) cache: RunbookCache,
    pub(crate) config: SchedulerConfig,
    shutdown: Arc<AtomicBool>,
}

impl<B, D, L, C> Scheduler<B, D, L, C, RandomJitter>
where
    B: Bus,
    D: DataSource,
    L: LeaseClient,
    C: Clock,
{
    pub fn new(
        store: Store,
        bus: B,
        datasource: D,
        lease: L,
        clock: C,
        config: SchedulerConfig,
    ) -> Self {
        Self::with_jitter(store, bus, datasource, lease, clock, config, RandomJitter)
    }
}

impl<B, D, L, C, J> Scheduler<B, D, L, C, J>
where
    B: Bus,
    D: DataSource,
    L: LeaseClient,
    C: Clock,
    J: Jitter,
{
    pub fn with_jitter(
        store: Store,
        bus: B,
        datasource: D,
        lease: L,
        clock: C,
        config: SchedulerConfig,
        jitter: J,
    ) -> Self {
        Self {
            store,
            bus,
            datasource,
            lease,
            clock,
            jitter,
            cache: RunbookCache::new(),
            config,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle the daemon flips on SIGTERM; the tick stops between
    /// runbooks, never mid-runbook.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    /// Run one tick under the lease. Held elsewhere → no-op.
    pub async fn run_tick(&self) -> Result<TickOutcome, EngineError> {
        let Some(lease) = self
            .lease
            .try_acquire(&self.config.lease_name, self.config.lease_ttl)
            .await?
        else {
            tracing::info!(lease = %self.config.lease_name, "lease held elsewhere, skipping tick");
            return Ok(TickOutcome::LeaseHeldElsewhere);
        };

        let now = self.clock.now_utc();
        let runbooks = self.store.read(|state| state.active_runbooks());
        tracing::debug!(runbooks = runbooks.len(), "tick started");

        let mut processed = 0;
        for record in &runbooks {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown requested, stopping tick between runbooks");
                break;
            }
            // Failure boundary: one runbook's fault must not block the
            // rest; the error is surfaced on the runbook row.
            match self.tick_runbook(record, now).await {
                Ok(()) => {
                    self.store.write(|state| {
                        state.set_runbook_last_error(&record.name, record.version, None)
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        runbook = %record.name,
                        version = record.version,
                        %error,
                        "runbook tick failed"
                    );
                    self.store.write(|state| {
                        state.set_runbook_last_error(
                            &record.name,
                            record.version,
                            Some(error.to_string()),
                        )
                    });
                }
            }
            processed += 1;
        }

        // Poll sweep runs independently of runbook health
        self.sweep_polls(now).await?;

        lease.release();
        Ok(TickOutcome::Completed {
            runbooks: processed,
        })
    }

    async fn tick_runbook(
        &self,
        record: &RunbookRecord,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), EngineError> {
        let def = self.cache.get(&self.store, &record.name, record.version)?;
        let mut events: Vec<(ControlEvent, PublishOpts)> = Vec::new();

        // Data-source sync only when automation is on. A query failure
        // is surfaced as last_error, but existing batches still proceed
        // through phase evaluation below.
        let mut sync_error: Option<EngineError> = None;
        if self.store.read(|state| state.automation_enabled(&record.name)) {
            match self.datasource.query(&def.data_source).await {
                Ok(table) => events.extend(self.sync_members(record, &def, table, now)?),
                Err(error) => {
                    tracing::warn!(runbook = %record.name, %error, "data source query failed");
                    sync_error = Some(error.into());
                }
            }
        }

        let batches: Vec<convoy_core::Batch> = self.store.read(|state| {
            state
                .batches_of_runbook(&record.name)
                .into_iter()
                .filter(|b| !b.is_terminal())
                .cloned()
                .collect()
        });
        for batch in &batches {
            events.extend(self.evaluate_phases(batch, now)?);
            events.extend(self.transition_versions(batch, record, &def, now)?);
        }

        // Publish after the store transactions commit
        for (event, opts) in events {
            self.bus.publish_control(event, opts).await?;
        }

        match sync_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "../scheduler_tests.rs"]
mod tests;
