// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! member-added / member-removed handlers.

use crate::error::EngineError;
use crate::expand;
use crate::jitter::Jitter;
use crate::runtime::{progress, rollback, Orchestrator};
use convoy_adapters::Bus;
use convoy_core::{
    BatchId, BatchMemberId, Clock, PhaseExecution, PhaseExecutionId, PhaseStatus, StepStatus,
};

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    /// A new member appeared mid-flight: catch it up on every phase
    /// that has already fired and is still running.
    pub(crate) async fn handle_member_added(
        &self,
        batch_id: &BatchId,
        member_id: &BatchMemberId,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let batch = self.require_batch(batch_id)?;
        if batch.is_terminal() {
            return Ok(());
        }
        let Some(member) = self.store.read(|state| state.get_member(member_id).cloned()) else {
            tracing::warn!(member = %member_id, "member-added for unknown member");
            return Ok(());
        };
        if !member.is_active() {
            return Ok(());
        }

        let dispatched_phases: Vec<PhaseExecution> = self.store.read(|state| {
            state
                .phases_of_batch(batch_id)
                .into_iter()
                .filter(|p| p.status == PhaseStatus::Dispatched)
                .cloned()
                .collect()
        });

        for phase in dispatched_phases {
            let def = self
                .cache
                .get(&self.store, &batch.runbook_name, phase.runbook_version)?;
            let Some(phase_def) = def.get_phase(&phase.phase_name) else {
                continue;
            };
            let materialized = self.store.write(|state| {
                expand::materialize_member_chain(state, &batch, &phase, phase_def, &member, now)
            });
            if !materialized {
                continue;
            }

            let first = self.store.read(|state| {
                state
                    .member_steps_in_phase(&phase.id, member_id)
                    .iter()
                    .find(|s| s.core.step_index == 0 && s.core.status == StepStatus::Pending)
                    .map(|s| s.id.clone())
            });
            if let Some(step_id) = first {
                progress::dispatch_step(&self.store, &self.bus, &step_id, false, now).await?;
            }
        }
        Ok(())
    }

    /// A member dropped out of the data source: cancel its in-flight
    /// work and run the removal rollback when the runbook defines one.
    /// Worker jobs already in flight are not aborted; their results
    /// land against cancelled rows and no-op.
    pub(crate) async fn handle_member_removed(
        &self,
        batch_id: &BatchId,
        member_id: &BatchMemberId,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let batch = self.require_batch(batch_id)?;

        let touched_phases: Vec<PhaseExecutionId> = self.store.write(|state| {
            let cancellable: Vec<_> = state
                .steps_of_member(member_id)
                .iter()
                .filter(|s| s.core.status.is_cancellable())
                .map(|s| (s.id.clone(), s.phase_execution_id.clone()))
                .collect();
            let mut phases = Vec::new();
            for (step_id, phase_id) in cancellable {
                if state.update_step(&step_id, |s| s.core.try_cancel(now)) && !phases.contains(&phase_id) {
                    phases.push(phase_id);
                }
            }
            phases
        });

        if !batch.is_terminal() {
            let def = self
                .cache
                .get(&self.store, &batch.runbook_name, batch.runbook_version)?;
            if let Some(name) = def.rollback_on_removal.as_deref() {
                let member = self.store.read(|state| state.get_member(member_id).cloned());
                if let Some(member) = member {
                    rollback::dispatch_rollback(
                        &self.store,
                        &self.bus,
                        &self.cache,
                        &batch,
                        Some(&member),
                        name,
                        now,
                    )
                    .await?;
                }
            }
        }

        // Cancelling the last open steps may leave phases finished
        self.store.write(|state| {
            for phase_id in &touched_phases {
                progress::complete_phase_if_done(state, phase_id, now);
            }
        });
        Ok(())
    }
}
