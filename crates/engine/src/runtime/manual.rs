// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manual batch creation and the explicit advancement protocol.
//!
//! Manual batches have no `batch_start_time`; their phase executions
//! carry a null due time and only move when an operator calls
//! `advance`.

use crate::error::EngineError;
use crate::expand;
use crate::jitter::Jitter;
use crate::runtime::{progress, Orchestrator};
use convoy_adapters::{Bus, PublishOpts};
use convoy_core::{
    Batch, BatchId, BatchMember, BatchStatus, Clock, ControlEvent, PhaseExecution, PhaseStatus,
};
use std::collections::HashMap;

/// What an `advance` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Init executions were published for dispatch
    InitsDispatched,
    /// The named phase was materialized and dispatched
    PhaseDispatched(String),
    /// Every phase is already terminal; nothing to do
    AllPhasesDone,
}

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    /// Create a manual batch on the latest active version of a runbook,
    /// with an operator-supplied member population.
    pub fn create_manual_batch(
        &self,
        runbook_name: &str,
        created_by: &str,
        members: &[(String, HashMap<String, serde_json::Value>)],
    ) -> Result<BatchId, EngineError> {
        let now = self.clock.now_utc();
        let record = self
            .store
            .read(|state| state.latest_active(runbook_name).cloned())
            .ok_or_else(|| EngineError::RunbookNotFound {
                name: runbook_name.to_string(),
                version: 0,
            })?;
        let def = self.cache.get(&self.store, &record.name, record.version)?;

        let nonce = convoy_core::nonce();
        let batch = Batch::manual(&record.name, record.version, &nonce, created_by, now);
        let batch_id = batch.id.clone();

        self.store.write(|state| {
            state.insert_batch(batch.clone())?;
            for (key, data) in members {
                state.insert_member(BatchMember::new(&batch_id, key, data.clone(), now))?;
            }
            // Phases with null due_at; advanced explicitly
            for phase_def in &def.phases {
                let offset = convoy_runbook::parse_offset(&phase_def.offset).unwrap_or(0);
                state.insert_phase_if_absent(PhaseExecution::pending(
                    &batch_id,
                    &phase_def.name,
                    offset,
                    None,
                    record.version,
                ));
            }
            expand::materialize_inits(state, &batch, &def.init, record.version, now);
            Ok::<(), EngineError>(())
        })?;

        tracing::info!(batch = %batch_id, runbook = runbook_name, "manual batch created");
        Ok(batch_id)
    }

    /// Advance a batch one stage: dispatch inits, or the next pending
    /// phase once prior phases are out of the way.
    pub async fn advance(&self, batch_id: &BatchId) -> Result<AdvanceOutcome, EngineError> {
        let now = self.clock.now_utc();
        let batch = self.require_batch(batch_id)?;
        // A completed batch has nothing left to advance; that is the
        // no-op success case. Failed batches reject.
        if batch.status == BatchStatus::Completed {
            return Ok(AdvanceOutcome::AllPhasesDone);
        }
        if batch.is_terminal() {
            return Err(EngineError::BatchTerminal(batch_id.to_string()));
        }

        let inits = self.store.read(|state| {
            state
                .inits_of_batch(batch_id)
                .iter()
                .map(|i| i.core.status)
                .collect::<Vec<_>>()
        });

        // 1. Fresh batch with inits: kick them off
        if batch.status == BatchStatus::Detected && !inits.is_empty() {
            let event = ControlEvent::BatchInit {
                runbook_name: batch.runbook_name.clone(),
                runbook_version: batch.runbook_version,
                batch_id: batch_id.clone(),
                batch_start_time: batch.batch_start_time,
                member_count: self
                    .store
                    .read(|state| state.active_members_of_batch(batch_id).len()),
            };
            let message_id = format!("batch-init-{}-v{}", batch_id, batch.runbook_version);
            self.bus
                .publish_control(event, PublishOpts::immediate(message_id))
                .await?;
            return Ok(AdvanceOutcome::InitsDispatched);
        }

        // 2. Inits in flight: the operator has to wait
        if batch.status == BatchStatus::InitDispatched {
            if inits.iter().any(|s| !s.is_terminal()) {
                return Err(EngineError::InitsInFlight(batch_id.to_string()));
            }
            self.store
                .write(|state| progress::activate_batch_if_inits_done(state, batch_id, now));
        }

        // Fresh batch with no inits goes straight to active
        if batch.status == BatchStatus::Detected && inits.is_empty() {
            self.store.write(|state| {
                state.transition_batch(
                    batch_id,
                    &[BatchStatus::Detected],
                    BatchStatus::Active,
                    now,
                )
            });
        }

        // 3. Lowest-ordered pending phase, with prior phases settled
        let batch = self.require_batch(batch_id)?;
        let def = self
            .cache
            .get(&self.store, &batch.runbook_name, batch.runbook_version)?;
        let ordered: Vec<PhaseExecution> = self.store.read(|state| {
            def.phases_by_offset()
                .iter()
                .filter_map(|phase_def| {
                    state
                        .get_phase(&convoy_core::PhaseExecutionId::derive(
                            batch_id,
                            &phase_def.name,
                            batch.runbook_version,
                        ))
                        .cloned()
                })
                .collect()
        });

        for phase in &ordered {
            match phase.status {
                PhaseStatus::Completed | PhaseStatus::Skipped | PhaseStatus::Superseded => {
                    continue
                }
                PhaseStatus::Pending => {
                    return self.dispatch_manual_phase(&batch, phase, &def, now).await;
                }
                // Dispatched or failed phases block advancement
                _ => {
                    return Err(EngineError::PhaseBlocked {
                        batch_id: batch_id.to_string(),
                        phase: phase.phase_name.clone(),
                    });
                }
            }
        }

        // 4. Nothing pending
        self.store
            .write(|state| progress::complete_batch_if_done(state, batch_id, now));
        Ok(AdvanceOutcome::AllPhasesDone)
    }

    async fn dispatch_manual_phase(
        &self,
        batch: &Batch,
        phase: &PhaseExecution,
        def: &convoy_runbook::RunbookDefinition,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<AdvanceOutcome, EngineError> {
        let Some(phase_def) = def.get_phase(&phase.phase_name) else {
            return Err(EngineError::PhaseBlocked {
                batch_id: batch.id.to_string(),
                phase: phase.phase_name.clone(),
            });
        };

        let member_ids = self.store.write(|state| {
            let members = expand::materialize_phase_steps(state, batch, phase, phase_def, now);
            state.transition_phase(
                &phase.id,
                &[PhaseStatus::Pending],
                PhaseStatus::Dispatched,
                now,
            );
            state.set_current_phase(&batch.id, &phase.phase_name);
            members
        });

        let event = ControlEvent::PhaseDue {
            runbook_name: batch.runbook_name.clone(),
            runbook_version: phase.runbook_version,
            batch_id: batch.id.clone(),
            phase_execution_id: phase.id.clone(),
            phase_name: phase.phase_name.clone(),
            offset_minutes: phase.offset_minutes,
            due_at: phase.due_at,
            member_ids,
        };
        self.bus
            .publish_control(
                event,
                PublishOpts::immediate(format!("phase-due-{}", phase.id)),
            )
            .await?;
        Ok(AdvanceOutcome::PhaseDispatched(phase.phase_name.clone()))
    }

    /// Cancel a batch: every non-terminal execution is cancelled and
    /// the batch (and its open phases) fail. Idempotent.
    pub async fn cancel(&self, batch_id: &BatchId) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let batch = self.require_batch(batch_id)?;
        if batch.is_terminal() {
            return Ok(());
        }

        self.store.write(|state| {
            progress::cancel_batch_work(state, batch_id, now);
            let open_phases: Vec<_> = state
                .phases_of_batch(batch_id)
                .iter()
                .filter(|p| !p.status.is_terminal())
                .map(|p| p.id.clone())
                .collect();
            for phase_id in open_phases {
                state.transition_phase(
                    &phase_id,
                    &[PhaseStatus::Pending, PhaseStatus::Dispatched],
                    PhaseStatus::Failed,
                    now,
                );
            }
            state.transition_batch(
                batch_id,
                &[
                    BatchStatus::Detected,
                    BatchStatus::InitDispatched,
                    BatchStatus::Active,
                ],
                BatchStatus::Failed,
                now,
            );
        });
        tracing::info!(batch = %batch_id, "batch cancelled");
        Ok(())
    }

    /// The orchestrator's store handle, for admin surfaces layered on
    /// top.
    pub fn store(&self) -> &convoy_storage::Store {
        &self.store
    }
}
