// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! retry-check: re-dispatch a pending execution whose backoff elapsed.
//!
//! Arrives via scheduled delivery at the retry deadline. Cancelled (or
//! otherwise no-longer-pending) executions fail the dispatch CAS and
//! the message is dropped.

use crate::error::EngineError;
use crate::jitter::Jitter;
use crate::runtime::{progress, Orchestrator};
use convoy_adapters::Bus;
use convoy_core::{Clock, InitExecutionId, StepExecutionId};

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    pub(crate) async fn handle_retry_check(
        &self,
        exec_id: &str,
        is_init_step: bool,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let dispatched = if is_init_step {
            let id = InitExecutionId::new(exec_id);
            progress::dispatch_init(&self.store, &self.bus, &id, true, now).await?
        } else {
            let id = StepExecutionId::new(exec_id);
            progress::dispatch_step(&self.store, &self.bus, &id, true, now).await?
        };
        if !dispatched {
            tracing::debug!(exec = exec_id, "retry-check found nothing to dispatch");
        }
        Ok(())
    }
}
