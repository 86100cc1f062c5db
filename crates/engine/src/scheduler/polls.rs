// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Poll sweep: interval bookkeeping and timeout enforcement for
//! polling executions.

use super::Scheduler;
use crate::error::EngineError;
use crate::jitter::Jitter;
use crate::runtime::failure::{handle_execution_failure, ExecRef};
use chrono::{DateTime, Utc};
use convoy_adapters::{Bus, DataSource, LeaseClient, PublishOpts};
use convoy_core::{Clock, ControlEvent};

impl<B, D, L, C, J> Scheduler<B, D, L, C, J>
where
    B: Bus,
    D: DataSource,
    L: LeaseClient,
    C: Clock,
    J: Jitter,
{
    /// Sweep every polling execution: time out the expired ones
    /// (applying their failure directive), publish poll-checks for the
    /// rest whose interval elapsed.
    pub(super) async fn sweep_polls(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        for step_id in self.store.read(|state| state.polling_steps()) {
            let snapshot = self.store.read(|state| {
                let step = state.get_step(&step_id)?;
                let phase = state.get_phase(&step.phase_execution_id)?;
                let batch = state.get_batch(&phase.batch_id)?;
                Some((step.core.clone(), batch.clone(), phase.runbook_version))
            });
            let Some((core, batch, runbook_version)) = snapshot else {
                continue;
            };

            if core.poll_timed_out(now) {
                let message = format!(
                    "polling timed out after {}s",
                    core.poll_timeout_secs.unwrap_or(0)
                );
                handle_execution_failure(
                    &self.store,
                    &self.bus,
                    &self.cache,
                    &ExecRef::Step(step_id),
                    &message,
                    false,
                    true,
                    self.jitter.sample(),
                    now,
                )
                .await?;
            } else if core.poll_due(now) {
                let mut round = None;
                self.store.write(|state| {
                    state.update_step(&step_id, |s| {
                        round = s.core.bump_poll(now);
                        round.is_some()
                    })
                });
                if let Some(poll_count) = round {
                    let event = ControlEvent::PollCheck {
                        runbook_name: batch.runbook_name.clone(),
                        runbook_version,
                        batch_id: batch.id.clone(),
                        step_execution_id: step_id.to_string(),
                        step_name: core.step_name.clone(),
                        poll_count,
                        is_init_step: false,
                    };
                    let message_id = format!("poll-check-{}-{}", step_id, poll_count);
                    self.bus
                        .publish_control(event, PublishOpts::immediate(message_id))
                        .await?;
                }
            }
        }

        for init_id in self.store.read(|state| state.polling_inits()) {
            let snapshot = self.store.read(|state| {
                let init = state.get_init(&init_id)?;
                let batch = state.get_batch(&init.batch_id)?;
                Some((init.core.clone(), batch.clone()))
            });
            let Some((core, batch)) = snapshot else {
                continue;
            };

            if core.poll_timed_out(now) {
                let message = format!(
                    "polling timed out after {}s",
                    core.poll_timeout_secs.unwrap_or(0)
                );
                handle_execution_failure(
                    &self.store,
                    &self.bus,
                    &self.cache,
                    &ExecRef::Init(init_id),
                    &message,
                    false,
                    true,
                    self.jitter.sample(),
                    now,
                )
                .await?;
            } else if core.poll_due(now) {
                let mut round = None;
                self.store.write(|state| {
                    state.update_init(&init_id, |i| {
                        round = i.core.bump_poll(now);
                        round.is_some()
                    })
                });
                if let Some(poll_count) = round {
                    let event = ControlEvent::PollCheck {
                        runbook_name: batch.runbook_name.clone(),
                        runbook_version: batch.runbook_version,
                        batch_id: batch.id.clone(),
                        step_execution_id: init_id.to_string(),
                        step_name: core.step_name.clone(),
                        poll_count,
                        is_init_step: true,
                    };
                    let message_id = format!("poll-check-{}-{}", init_id, poll_count);
                    self.bus
                        .publish_control(event, PublishOpts::immediate(message_id))
                        .await?;
                }
            }
        }
        Ok(())
    }
}
