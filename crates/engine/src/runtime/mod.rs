// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event-driven orchestrator.
//!
//! One idempotent handler per control-event kind plus the worker-result
//! correlator. Every write is a compare-and-set against the store;
//! zero rows affected means a concurrent or duplicate transition was
//! observed and the handler exits without side effects.

mod handlers;
pub(crate) mod failure;
mod manual;
pub(crate) mod progress;
pub(crate) mod rollback;

use crate::cache::RunbookCache;
use crate::error::EngineError;
use crate::jitter::{Jitter, RandomJitter};
use convoy_adapters::Bus;
use convoy_core::{BatchId, Clock, ControlEvent, ResultEnvelope};
use convoy_storage::Store;

pub use manual::AdvanceOutcome;

/// The orchestrator: consumes control events and worker results,
/// advances the per-step state machine, and drives phases and batches
/// to their terminal states.
pub struct Orchestrator<B, C, J = RandomJitter> {
    pub(crate) store: Store,
    pub(crate) bus: B,
    pub(crate) clock: C,
    pub(crate) jitter: J,
    pub(crate) cache: RunbookCache,
}

impl<B, C> Orchestrator<B, C, RandomJitter>
where
    B: Bus,
    C: Clock,
{
    pub fn new(store: Store, bus: B, clock: C) -> Self {
        Self::with_jitter(store, bus, clock, RandomJitter)
    }
}

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    pub fn with_jitter(store: Store, bus: B, clock: C, jitter: J) -> Self {
        Self {
            store,
            bus,
            clock,
            jitter,
            cache: RunbookCache::new(),
        }
    }

    /// Dispatch a control event to its handler.
    pub async fn handle_control(&self, event: ControlEvent) -> Result<(), EngineError> {
        tracing::debug!(event = %event.log_summary(), "control event");
        match event {
            ControlEvent::BatchInit { batch_id, .. } => self.handle_batch_init(&batch_id).await,
            ControlEvent::PhaseDue {
                batch_id,
                phase_execution_id,
                member_ids,
                ..
            } => {
                self.handle_phase_due(&batch_id, &phase_execution_id, &member_ids)
                    .await
            }
            ControlEvent::MemberAdded {
                batch_id,
                batch_member_id,
                ..
            } => self.handle_member_added(&batch_id, &batch_member_id).await,
            ControlEvent::MemberRemoved {
                batch_id,
                batch_member_id,
                ..
            } => self.handle_member_removed(&batch_id, &batch_member_id).await,
            ControlEvent::PollCheck {
                step_execution_id,
                is_init_step,
                ..
            } => self.handle_poll_check(&step_execution_id, is_init_step).await,
            ControlEvent::RetryCheck {
                step_execution_id,
                is_init_step,
                ..
            } => self.handle_retry_check(&step_execution_id, is_init_step).await,
        }
    }

    pub(crate) fn require_batch(
        &self,
        batch_id: &BatchId,
    ) -> Result<convoy_core::Batch, EngineError> {
        self.store
            .read(|state| state.get_batch(batch_id).cloned())
            .ok_or_else(|| EngineError::BatchNotFound(batch_id.to_string()))
    }

    /// Entry point for worker results (see handlers/result.rs).
    pub async fn handle_result(&self, result: ResultEnvelope) -> Result<(), EngineError> {
        self.apply_worker_result(result).await
    }
}

#[cfg(test)]
#[path = "../runtime_tests/mod.rs"]
mod tests;
