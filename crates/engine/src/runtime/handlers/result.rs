// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! worker-result: correlate a result envelope and advance the step
//! state machine.

use crate::error::EngineError;
use crate::jitter::Jitter;
use crate::runtime::failure::{handle_execution_failure, ExecRef};
use crate::runtime::{progress, Orchestrator};
use convoy_adapters::Bus;
use convoy_core::{
    Clock, InitExecutionId, PollOutcome, ResultEnvelope, StepExecutionId, StepStatus,
};

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    pub(crate) async fn apply_worker_result(
        &self,
        result: ResultEnvelope,
    ) -> Result<(), EngineError> {
        if let Some(step_id) = result.correlation_data.step_execution_id.clone() {
            self.apply_step_result(StepExecutionId::new(step_id), result)
                .await
        } else if let Some(init_id) = result.correlation_data.init_execution_id.clone() {
            self.apply_init_result(InitExecutionId::new(init_id), result)
                .await
        } else {
            // Detached dispatches (rollback sequences) are best-effort
            tracing::info!(
                job = %result.job_id,
                success = result.is_success(),
                "uncorrelated worker result"
            );
            Ok(())
        }
    }

    async fn apply_step_result(
        &self,
        step_id: StepExecutionId,
        result: ResultEnvelope,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let Some(step) = self.store.read(|state| state.get_step(&step_id).cloned()) else {
            tracing::warn!(step = %step_id, job = %result.job_id, "result for unknown step");
            return Ok(());
        };
        if !step.core.matches_job(&result.job_id) {
            tracing::debug!(
                step = %step_id,
                job = %result.job_id,
                "stale result for superseded attempt, dropping"
            );
            return Ok(());
        }

        if !result.is_success() {
            return handle_execution_failure(
                &self.store,
                &self.bus,
                &self.cache,
                &ExecRef::Step(step_id),
                &result.error_message(),
                result.is_throttled(),
                false,
                self.jitter.sample(),
                now,
            )
            .await;
        }

        match step.core.status {
            StepStatus::Dispatched => {
                if step.core.is_poll_step && result.poll_outcome() == PollOutcome::InProgress {
                    self.store
                        .write(|state| state.update_step(&step_id, |s| s.core.try_start_polling(now)));
                    return Ok(());
                }
                let data = match result.poll_outcome() {
                    PollOutcome::Complete(data) => data,
                    PollOutcome::InProgress => result.result.clone(),
                };
                if self
                    .store
                    .write(|state| state.update_step(&step_id, |s| s.core.try_succeed(data, now)))
                {
                    progress::advance_after_step_success(&self.store, &self.bus, &step_id, now)
                        .await?;
                }
            }
            StepStatus::Polling => match result.poll_outcome() {
                PollOutcome::InProgress => {
                    self.store.write(|state| {
                        state.update_step(&step_id, |s| s.core.record_poll_progress(now))
                    });
                }
                PollOutcome::Complete(data) => {
                    if self.store.write(|state| {
                        state.update_step(&step_id, |s| s.core.try_succeed(data, now))
                    }) {
                        progress::advance_after_step_success(&self.store, &self.bus, &step_id, now)
                            .await?;
                    }
                }
            },
            other => {
                tracing::debug!(step = %step_id, status = %other, "duplicate result, dropping");
            }
        }
        Ok(())
    }

    async fn apply_init_result(
        &self,
        init_id: InitExecutionId,
        result: ResultEnvelope,
    ) -> Result<(), EngineError> {
        let now = self.clock.now_utc();
        let Some(init) = self.store.read(|state| state.get_init(&init_id).cloned()) else {
            tracing::warn!(init = %init_id, job = %result.job_id, "result for unknown init");
            return Ok(());
        };
        if !init.core.matches_job(&result.job_id) {
            tracing::debug!(init = %init_id, job = %result.job_id, "stale init result, dropping");
            return Ok(());
        }

        if !result.is_success() {
            return handle_execution_failure(
                &self.store,
                &self.bus,
                &self.cache,
                &ExecRef::Init(init_id),
                &result.error_message(),
                result.is_throttled(),
                false,
                self.jitter.sample(),
                now,
            )
            .await;
        }

        let batch_id = init.batch_id.clone();
        match init.core.status {
            StepStatus::Dispatched => {
                if init.core.is_poll_step && result.poll_outcome() == PollOutcome::InProgress {
                    self.store
                        .write(|state| state.update_init(&init_id, |i| i.core.try_start_polling(now)));
                    return Ok(());
                }
                let data = match result.poll_outcome() {
                    PollOutcome::Complete(data) => data,
                    PollOutcome::InProgress => result.result.clone(),
                };
                if self
                    .store
                    .write(|state| state.update_init(&init_id, |i| i.core.try_succeed(data, now)))
                {
                    // Last init success activates the batch
                    self.store
                        .write(|state| progress::activate_batch_if_inits_done(state, &batch_id, now));
                }
            }
            StepStatus::Polling => match result.poll_outcome() {
                PollOutcome::InProgress => {
                    self.store.write(|state| {
                        state.update_init(&init_id, |i| i.core.record_poll_progress(now))
                    });
                }
                PollOutcome::Complete(data) => {
                    if self.store.write(|state| {
                        state.update_init(&init_id, |i| i.core.try_succeed(data, now))
                    }) {
                        self.store.write(|state| {
                            progress::activate_batch_if_inits_done(state, &batch_id, now)
                        });
                    }
                }
            },
            other => {
                tracing::debug!(init = %init_id, status = %other, "duplicate init result, dropping");
            }
        }
        Ok(())
    }
}
