// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch and forward-progress helpers shared by the orchestrator
//! handlers and the scheduler's poll sweep.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use convoy_adapters::Bus;
use convoy_core::{
    BatchId, BatchMemberId, BatchStatus, CorrelationData, InitExecutionId, JobEnvelope,
    PhaseExecutionId, PhaseStatus, StepExecutionId, StepStatus,
};
use convoy_storage::{Store, StoreState};

/// CAS a pending step to dispatched and publish its worker job.
/// Returns false when the step was not in a dispatchable state.
pub(crate) async fn dispatch_step<B: Bus>(
    store: &Store,
    bus: &B,
    step_id: &StepExecutionId,
    retry: bool,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let envelope = store.write(|state| {
        let step = state.get_step(step_id)?.clone();
        let phase = state.get_phase(&step.phase_execution_id)?.clone();
        let batch = state.get_batch(&phase.batch_id)?.clone();
        let job_id = if retry {
            step.id.retry_job_id(step.core.retry_count)
        } else {
            step.id.job_id(step.core.retry_count)
        };
        if !state.update_step(step_id, |s| s.core.try_dispatch(job_id.clone(), now)) {
            return None;
        }
        Some(JobEnvelope {
            job_id,
            batch_id: batch.id.clone(),
            worker_id: step.core.worker_id.clone(),
            function_name: step.core.function_name.clone(),
            parameters: step.core.params.clone(),
            correlation_data: CorrelationData::for_step(
                step.id.as_str(),
                &batch.runbook_name,
                phase.runbook_version,
            ),
        })
    });

    match envelope {
        Some(envelope) => {
            tracing::info!(step = %step_id, job = %envelope.job_id, "step dispatched");
            bus.publish_job(envelope).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// CAS a pending init to dispatched and publish its worker job.
pub(crate) async fn dispatch_init<B: Bus>(
    store: &Store,
    bus: &B,
    init_id: &InitExecutionId,
    retry: bool,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let envelope = store.write(|state| {
        let init = state.get_init(init_id)?.clone();
        let batch = state.get_batch(&init.batch_id)?.clone();
        let job_id = if retry {
            init.id.retry_job_id(init.core.retry_count)
        } else {
            init.id.job_id(init.core.retry_count)
        };
        if !state.update_init(init_id, |i| i.core.try_dispatch(job_id.clone(), now)) {
            return None;
        }
        Some(JobEnvelope {
            job_id,
            batch_id: batch.id.clone(),
            worker_id: init.core.worker_id.clone(),
            function_name: init.core.function_name.clone(),
            parameters: init.core.params.clone(),
            correlation_data: CorrelationData::for_init(
                init.id.as_str(),
                &batch.runbook_name,
                batch.runbook_version,
            ),
        })
    });

    match envelope {
        Some(envelope) => {
            tracing::info!(init = %init_id, job = %envelope.job_id, "init dispatched");
            bus.publish_job(envelope).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// After a step succeeds: dispatch the member's next step, or run the
/// phase/batch completion checks when the chain is done.
pub(crate) async fn advance_after_step_success<B: Bus>(
    store: &Store,
    bus: &B,
    step_id: &StepExecutionId,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let next = store.read(|state| {
        let step = state.get_step(step_id)?;
        let chain =
            state.member_steps_in_phase(&step.phase_execution_id, &step.batch_member_id);
        chain
            .iter()
            .find(|s| {
                s.core.step_index == step.core.step_index + 1
                    && s.core.status == StepStatus::Pending
            })
            .map(|s| s.id.clone())
    });

    if let Some(next_id) = next {
        dispatch_step(store, bus, &next_id, false, now).await?;
        return Ok(());
    }

    let phase_id = store.read(|state| {
        state
            .get_step(step_id)
            .map(|s| s.phase_execution_id.clone())
    });
    if let Some(phase_id) = phase_id {
        store.write(|state| complete_phase_if_done(state, &phase_id, now));
    }
    Ok(())
}

/// Complete a dispatched phase once every one of its steps is terminal,
/// then run the batch completion check. Runs inside the caller's
/// transaction.
pub(crate) fn complete_phase_if_done(
    state: &mut StoreState,
    phase_id: &PhaseExecutionId,
    now: DateTime<Utc>,
) -> bool {
    let Some(phase) = state.get_phase(phase_id) else {
        return false;
    };
    if phase.status != PhaseStatus::Dispatched {
        return false;
    }
    let batch_id = phase.batch_id.clone();
    if state
        .steps_of_phase(phase_id)
        .iter()
        .any(|s| !s.core.status.is_terminal())
    {
        return false;
    }
    if !state.transition_phase(phase_id, &[PhaseStatus::Dispatched], PhaseStatus::Completed, now)
    {
        return false;
    }
    tracing::info!(phase = %phase_id, "phase completed");
    complete_batch_if_done(state, &batch_id, now);
    true
}

/// Drive a batch to its terminal state once all work is done: every
/// non-superseded phase terminal and every init terminal. Completed
/// when at least one member survived, failed when none did.
pub(crate) fn complete_batch_if_done(
    state: &mut StoreState,
    batch_id: &BatchId,
    now: DateTime<Utc>,
) -> Option<BatchStatus> {
    let batch = state.get_batch(batch_id)?;
    if batch.status != BatchStatus::Active {
        return None;
    }
    let phases = state.phases_of_batch(batch_id);
    if phases.is_empty() {
        return None;
    }
    let all_phases_terminal = phases
        .iter()
        .filter(|p| p.status != PhaseStatus::Superseded)
        .all(|p| p.status.is_terminal());
    if !all_phases_terminal {
        return None;
    }
    if state
        .inits_of_batch(batch_id)
        .iter()
        .any(|i| !i.core.status.is_terminal())
    {
        return None;
    }

    let any_active = !state.active_members_of_batch(batch_id).is_empty();
    let to = if any_active {
        BatchStatus::Completed
    } else {
        BatchStatus::Failed
    };
    if state.transition_batch(batch_id, &[BatchStatus::Active], to, now) {
        tracing::info!(batch = %batch_id, status = %to, "batch reached terminal state");
        Some(to)
    } else {
        None
    }
}

/// Activate a batch once every init execution is terminal. Failed inits
/// that reached this point carried `on_failure = skip`; any other init
/// failure fails the batch before activation is ever checked.
pub(crate) fn activate_batch_if_inits_done(
    state: &mut StoreState,
    batch_id: &BatchId,
    now: DateTime<Utc>,
) -> bool {
    if state
        .inits_of_batch(batch_id)
        .iter()
        .any(|i| !i.core.status.is_terminal())
    {
        return false;
    }
    let activated = state.transition_batch(
        batch_id,
        &[BatchStatus::InitDispatched, BatchStatus::Detected],
        BatchStatus::Active,
        now,
    );
    if activated {
        tracing::info!(batch = %batch_id, "inits complete, batch active");
    }
    activated
}

/// Mark a member failed and skip its not-yet-dispatched steps in the
/// given phase (the chain cannot proceed past a terminal failure).
pub(crate) fn fail_member_in_phase(
    state: &mut StoreState,
    phase_id: &PhaseExecutionId,
    member_id: &BatchMemberId,
    now: DateTime<Utc>,
) {
    state.transition_member(
        member_id,
        &[convoy_core::MemberStatus::Active],
        convoy_core::MemberStatus::Failed,
        now,
    );
    let pending: Vec<StepExecutionId> = state
        .member_steps_in_phase(phase_id, member_id)
        .iter()
        .filter(|s| s.core.status == StepStatus::Pending)
        .map(|s| s.id.clone())
        .collect();
    for id in pending {
        state.update_step(&id, |s| s.core.try_skip(now));
    }
}

/// Cancel a phase's remaining open steps (fail_phase path), so a
/// failed phase leaves no live work behind.
pub(crate) fn cancel_phase_work(
    state: &mut StoreState,
    phase_id: &PhaseExecutionId,
    now: DateTime<Utc>,
) {
    let open: Vec<StepExecutionId> = state
        .steps_of_phase(phase_id)
        .iter()
        .filter(|s| s.core.status.is_cancellable())
        .map(|s| s.id.clone())
        .collect();
    for step_id in open {
        state.update_step(&step_id, |s| s.core.try_cancel(now));
    }
}

/// Cancel every non-terminal step and init of a batch (fail_batch and
/// admin cancel paths).
pub(crate) fn cancel_batch_work(state: &mut StoreState, batch_id: &BatchId, now: DateTime<Utc>) {
    for step_id in state.non_terminal_steps_of_batch(batch_id) {
        state.update_step(&step_id, |s| s.core.try_cancel(now));
    }
    let init_ids: Vec<InitExecutionId> = state
        .inits_of_batch(batch_id)
        .iter()
        .filter(|i| !i.core.status.is_terminal())
        .map(|i| i.id.clone())
        .collect();
    for init_id in init_ids {
        state.update_init(&init_id, |i| i.core.try_cancel(now));
    }
}
