// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! batch-init: dispatch a batch's pending init executions.

use crate::error::EngineError;
use crate::jitter::Jitter;
use crate::runtime::{progress, Orchestrator};
use convoy_adapters::Bus;
use convoy_core::{BatchId, BatchStatus, Clock, InitExecutionId, StepStatus};

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    pub(crate) async fn handle_batch_init(&self, batch_id: &BatchId) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let batch = self.require_batch(batch_id)?;
        if batch.is_terminal() {
            return Ok(());
        }

        let pending: Vec<InitExecutionId> = self.store.read(|state| {
            state
                .inits_of_batch(batch_id)
                .iter()
                .filter(|i| i.core.status == StepStatus::Pending)
                .map(|i| i.id.clone())
                .collect()
        });

        for init_id in &pending {
            progress::dispatch_init(&self.store, &self.bus, init_id, false, now).await?;
        }

        // First init dispatch moves the batch out of detected; the
        // rerun_init path arrives here with the batch already active
        // and the CAS is a no-op.
        self.store.write(|state| {
            state.transition_batch(
                batch_id,
                &[BatchStatus::Detected],
                BatchStatus::InitDispatched,
                now,
            )
        });
        Ok(())
    }
}
