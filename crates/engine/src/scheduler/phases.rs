// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Phase-timing evaluation: fire pending phases whose due time arrived.

use super::Scheduler;
use crate::error::EngineError;
use crate::expand;
use crate::jitter::Jitter;
use chrono::{DateTime, Utc};
use convoy_adapters::{Bus, DataSource, LeaseClient, PublishOpts};
use convoy_core::{Batch, BatchStatus, Clock, ControlEvent, PhaseStatus};

impl<B, D, L, C, J> Scheduler<B, D, L, C, J>
where
    B: Bus,
    D: DataSource,
    L: LeaseClient,
    C: Clock,
    J: Jitter,
{
    /// Expand and dispatch every pending phase of the batch whose
    /// `due_at` has passed. Expansion pre-inserts the step rows so the
    /// orchestrator only moves them into flight.
    pub(super) fn evaluate_phases(
        &self,
        batch: &Batch,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ControlEvent, PublishOpts)>, EngineError> {
        // Phases only fire once the batch is through its inits
        if batch.status != BatchStatus::Active {
            return Ok(Vec::new());
        }

        let due = self.store.read(|state| state.due_pending_phases(&batch.id, now));
        let mut events = Vec::new();

        for phase_id in due {
            let Some(phase) = self.store.read(|state| state.get_phase(&phase_id).cloned())
            else {
                continue;
            };
            let def = self
                .cache
                .get(&self.store, &batch.runbook_name, phase.runbook_version)?;
            let Some(phase_def) = def.get_phase(&phase.phase_name) else {
                tracing::warn!(
                    phase = %phase.phase_name,
                    version = phase.runbook_version,
                    "phase execution has no definition, leaving pending"
                );
                continue;
            };

            let member_ids = self.store.write(|state| {
                let members =
                    expand::materialize_phase_steps(state, batch, &phase, phase_def, now);
                if !state.transition_phase(
                    &phase.id,
                    &[PhaseStatus::Pending],
                    PhaseStatus::Dispatched,
                    now,
                ) {
                    return None;
                }
                state.set_current_phase(&batch.id, &phase.phase_name);
                Some(members)
            });

            if let Some(member_ids) = member_ids {
                tracing::info!(
                    batch = %batch.id,
                    phase = %phase.phase_name,
                    members = member_ids.len(),
                    "phase due, dispatched"
                );
                events.push((
                    ControlEvent::PhaseDue {
                        runbook_name: batch.runbook_name.clone(),
                        runbook_version: phase.runbook_version,
                        batch_id: batch.id.clone(),
                        phase_execution_id: phase.id.clone(),
                        phase_name: phase.phase_name.clone(),
                        offset_minutes: phase.offset_minutes,
                        due_at: phase.due_at,
                        member_ids,
                    },
                    PublishOpts::immediate(format!("phase-due-{}", phase.id)),
                ));
            }
        }
        Ok(events)
    }
}
