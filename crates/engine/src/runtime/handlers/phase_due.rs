// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! phase-due: dispatch each member's first step.
//!
//! The scheduler (or manual advance) already materialized the step
//! rows; this handler only moves index-0 steps into flight. Higher
//! indices dispatch on their predecessor's success.

use crate::error::EngineError;
use crate::jitter::Jitter;
use crate::runtime::{progress, Orchestrator};
use convoy_adapters::Bus;
use convoy_core::{BatchId, BatchMemberId, Clock, PhaseExecutionId, StepStatus};

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    pub(crate) async fn handle_phase_due(
        &self,
        batch_id: &BatchId,
        phase_id: &PhaseExecutionId,
        member_ids: &[BatchMemberId],
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let batch = self.require_batch(batch_id)?;
        if batch.is_terminal() {
            return Ok(());
        }

        for member_id in member_ids {
            let first = self.store.read(|state| {
                state
                    .member_steps_in_phase(phase_id, member_id)
                    .iter()
                    .find(|s| s.core.step_index == 0 && s.core.status == StepStatus::Pending)
                    .map(|s| s.id.clone())
            });
            if let Some(step_id) = first {
                progress::dispatch_step(&self.store, &self.bus, &step_id, false, now).await?;
            }
        }

        // A phase with no steps (no members survived expansion)
        // completes immediately; with steps in flight this is a no-op.
        self.store
            .write(|state| progress::complete_phase_if_done(state, phase_id, now));
        Ok(())
    }
}
