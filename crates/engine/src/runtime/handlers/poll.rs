// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! poll-check: re-dispatch a polling execution's job.
//!
//! The scheduler owns the interval bookkeeping; this handler just sends
//! the round's job. Each round gets a distinct job id so bus dedup does
//! not swallow the re-send, and the execution's job id moves with it so
//! the round's result correlates.

use crate::error::EngineError;
use crate::jitter::Jitter;
use crate::runtime::Orchestrator;
use convoy_adapters::Bus;
use convoy_core::{
    Clock, CorrelationData, InitExecutionId, JobEnvelope, StepExecutionId,
};

impl<B, C, J> Orchestrator<B, C, J>
where
    B: Bus,
    C: Clock,
    J: Jitter,
{
    pub(crate) async fn handle_poll_check(
        &self,
        exec_id: &str,
        is_init_step: bool,
    ) -> Result<(), EngineError> {
        let envelope = if is_init_step {
            let id = InitExecutionId::new(exec_id);
            self.store.write(|state| {
                let init = state.get_init(&id)?.clone();
                let batch = state.get_batch(&init.batch_id)?.clone();
                let job_id = id.poll_job_id(init.core.poll_count);
                if !state.update_init(&id, |i| i.core.try_assign_poll_job(job_id.clone())) {
                    return None;
                }
                Some(JobEnvelope {
                    job_id,
                    batch_id: batch.id.clone(),
                    worker_id: init.core.worker_id.clone(),
                    function_name: init.core.function_name.clone(),
                    parameters: init.core.params.clone(),
                    correlation_data: CorrelationData::for_init(
                        id.as_str(),
                        &batch.runbook_name,
                        batch.runbook_version,
                    ),
                })
            })
        } else {
            let id = StepExecutionId::new(exec_id);
            self.store.write(|state| {
                let step = state.get_step(&id)?.clone();
                let phase = state.get_phase(&step.phase_execution_id)?.clone();
                let batch = state.get_batch(&phase.batch_id)?.clone();
                let job_id = id.poll_job_id(step.core.poll_count);
                if !state.update_step(&id, |s| s.core.try_assign_poll_job(job_id.clone())) {
                    return None;
                }
                Some(JobEnvelope {
                    job_id,
                    batch_id: batch.id.clone(),
                    worker_id: step.core.worker_id.clone(),
                    function_name: step.core.function_name.clone(),
                    parameters: step.core.params.clone(),
                    correlation_data: CorrelationData::for_step(
                        id.as_str(),
                        &batch.runbook_name,
                        phase.runbook_version,
                    ),
                })
            })
        };

        if let Some(envelope) = envelope {
            tracing::debug!(exec = exec_id, job = %envelope.job_id, "poll round dispatched");
            self.bus.publish_job(envelope).await?;
        }
        Ok(())
    }
}
