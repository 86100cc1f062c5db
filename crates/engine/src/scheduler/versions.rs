// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook version transitions for long-lived batches.

use super::Scheduler;
use crate::error::EngineError;
use crate::expand;
use crate::jitter::Jitter;
use chrono::{DateTime, Utc};
use convoy_adapters::{Bus, DataSource, LeaseClient, PublishOpts};
use convoy_core::{
    Batch, Clock, ControlEvent, InitExecutionId, OverdueBehavior, PhaseExecutionId, PhaseStatus,
};
use convoy_runbook::RunbookDefinition;
use convoy_storage::RunbookRecord;

impl<B, D, L, C, J> Scheduler<B, D, L, C, J>
where
    B: Bus,
    D: DataSource,
    L: LeaseClient,
    C: Clock,
    J: Jitter,
{
    /// Move a live batch onto a newly published runbook version: old
    /// open phases become superseded, the new version's phases
    /// materialize (overdue ones pending or skipped per
    /// `overdue_behavior`), and inits re-run when the version asks
    /// for it.
    pub(super) fn transition_versions(
        &self,
        batch: &Batch,
        record: &RunbookRecord,
        def: &RunbookDefinition,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ControlEvent, PublishOpts)>, EngineError> {
        if batch.runbook_version >= record.version {
            return Ok(Vec::new());
        }
        let already_transitioned = self
            .store
            .read(|state| state.has_phases_for_version(&batch.id, record.version));
        if already_transitioned {
            return Ok(Vec::new());
        }

        tracing::info!(
            batch = %batch.id,
            from = batch.runbook_version,
            to = record.version,
            "runbook version transition"
        );

        let rerun_inits = self.store.write(|state| {
            // Supersede open phases of the older versions
            let open: Vec<PhaseExecutionId> = state
                .phases_of_batch(&batch.id)
                .iter()
                .filter(|p| {
                    p.runbook_version < record.version
                        && matches!(p.status, PhaseStatus::Pending | PhaseStatus::Dispatched)
                })
                .map(|p| p.id.clone())
                .collect();
            for phase_id in open {
                state.transition_phase(
                    &phase_id,
                    &[PhaseStatus::Pending, PhaseStatus::Dispatched],
                    PhaseStatus::Superseded,
                    now,
                );
            }

            let skip_overdue = record.overdue_behavior == OverdueBehavior::Ignore;
            expand::materialize_batch_phases(state, batch, def, record.version, now, skip_overdue);
            state.set_batch_runbook_version(&batch.id, record.version);

            // rerun_init only applies when inits already ran once
            if !record.rerun_init || state.inits_of_batch(&batch.id).is_empty() {
                return false;
            }
            let open_inits: Vec<InitExecutionId> = state
                .inits_of_batch(&batch.id)
                .iter()
                .filter(|i| !i.core.status.is_terminal())
                .map(|i| i.id.clone())
                .collect();
            for init_id in open_inits {
                state.update_init(&init_id, |i| i.core.try_cancel(now));
            }
            expand::materialize_inits(state, batch, &def.init, record.version, now) > 0
        });

        let mut events = Vec::new();
        if rerun_inits {
            events.push((
                ControlEvent::BatchInit {
                    runbook_name: record.name.clone(),
                    runbook_version: record.version,
                    batch_id: batch.id.clone(),
                    batch_start_time: batch.batch_start_time,
                    member_count: self
                        .store
                        .read(|state| state.active_members_of_batch(&batch.id).len()),
                },
                PublishOpts::immediate(format!("batch-init-{}-v{}", batch.id, record.version)),
            ));
        }
        Ok(events)
    }
}
