// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure handling: retry scheduling and on_failure directives.
//!
//! Shared by the worker-result handler and the scheduler's poll-timeout
//! sweep. The terminal-failure CAS is what bounds every directive to at
//! most one application per attempt.

use super::{progress, rollback};
use crate::cache::RunbookCache;
use crate::error::EngineError;
use chrono::{DateTime, Duration, Utc};
use convoy_adapters::{Bus, PublishOpts};
use convoy_core::{
    backoff_delay_secs, Batch, BatchStatus, ControlEvent, ExecutionCore, InitExecutionId,
    OnFailure, PhaseStatus, StepExecutionId, StepStatus, THROTTLE_RETRY_CAP,
};
use convoy_storage::Store;

/// Reference to either flavor of execution record.
#[derive(Debug, Clone)]
pub(crate) enum ExecRef {
    Step(StepExecutionId),
    Init(InitExecutionId),
}

impl ExecRef {
    fn id_str(&self) -> &str {
        match self {
            ExecRef::Step(id) => id.as_str(),
            ExecRef::Init(id) => id.as_str(),
        }
    }

    fn is_init(&self) -> bool {
        matches!(self, ExecRef::Init(_))
    }
}

struct FailureSnapshot {
    core: ExecutionCore,
    batch: Batch,
}

fn snapshot(store: &Store, exec: &ExecRef) -> Option<FailureSnapshot> {
    store.read(|state| match exec {
        ExecRef::Step(id) => {
            let step = state.get_step(id)?;
            let phase = state.get_phase(&step.phase_execution_id)?;
            let batch = state.get_batch(&phase.batch_id)?;
            Some(FailureSnapshot {
                core: step.core.clone(),
                batch: batch.clone(),
            })
        }
        ExecRef::Init(id) => {
            let init = state.get_init(id)?;
            let batch = state.get_batch(&init.batch_id)?;
            Some(FailureSnapshot {
                core: init.core.clone(),
                batch: batch.clone(),
            })
        }
    })
}

/// Apply a worker failure or poll timeout to an execution.
///
/// Retryable failures go back to pending with a backoff deadline and a
/// scheduled retry-check. Terminal failures apply the step's on_failure
/// directive. A throttled failure is retryable regardless of the
/// directive, up to the hard cap.
pub(crate) async fn handle_execution_failure<B: Bus>(
    store: &Store,
    bus: &B,
    cache: &RunbookCache,
    exec: &ExecRef,
    error: &str,
    throttled: bool,
    timeout: bool,
    jitter: f64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let Some(snap) = snapshot(store, exec) else {
        tracing::warn!(exec = exec.id_str(), "failure for unknown execution, dropping");
        return Ok(());
    };

    let directive = snap.core.on_failure.clone().unwrap_or(OnFailure::Retry);
    let budget_left =
        directive == OnFailure::Retry && snap.core.retry_count < snap.core.max_retries;
    let throttle_left = throttled && snap.core.retry_count < THROTTLE_RETRY_CAP;
    let retryable = budget_left || throttle_left;

    if timeout {
        // Timeout is recorded terminally first, then possibly retried
        // from poll_timeout.
        let applied = update_exec(store, exec, |core| {
            core.try_fail(StepStatus::PollTimeout, error, now)
        });
        if !applied {
            return Ok(());
        }
        tracing::warn!(exec = exec.id_str(), "poll timed out");
        if retryable {
            return schedule_retry(store, bus, exec, &snap, jitter, now).await;
        }
        return apply_directive(store, bus, cache, exec, &snap, &directive, now).await;
    }

    if retryable {
        // dispatched|polling straight back to pending
        return schedule_retry(store, bus, exec, &snap, jitter, now).await;
    }

    let applied = update_exec(store, exec, |core| {
        core.try_fail(StepStatus::Failed, error, now)
    });
    if !applied {
        return Ok(());
    }
    tracing::warn!(exec = exec.id_str(), error, "execution failed terminally");
    apply_directive(store, bus, cache, exec, &snap, &directive, now).await
}

fn update_exec(store: &Store, exec: &ExecRef, f: impl FnOnce(&mut ExecutionCore) -> bool) -> bool {
    store.write(|state| match exec {
        ExecRef::Step(id) => state.update_step(id, |s| f(&mut s.core)),
        ExecRef::Init(id) => state.update_init(id, |i| f(&mut i.core)),
    })
}

async fn schedule_retry<B: Bus>(
    store: &Store,
    bus: &B,
    exec: &ExecRef,
    snap: &FailureSnapshot,
    jitter: f64,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let next_attempt = snap.core.retry_count + 1;
    let delay = backoff_delay_secs(next_attempt, snap.core.retry_interval_secs, jitter);
    let retry_after = now + Duration::seconds(delay as i64);

    let applied = update_exec(store, exec, |core| core.try_schedule_retry(retry_after));
    if !applied {
        return Ok(());
    }
    tracing::info!(
        exec = exec.id_str(),
        attempt = next_attempt,
        delay_secs = delay,
        "retry scheduled"
    );

    let event = ControlEvent::RetryCheck {
        step_execution_id: exec.id_str().to_string(),
        is_init_step: exec.is_init(),
        runbook_name: snap.batch.runbook_name.clone(),
        runbook_version: snap.batch.runbook_version,
        batch_id: snap.batch.id.clone(),
    };
    let message_id = format!("retry-check-{}-{}", exec.id_str(), next_attempt);
    bus.publish_control(event, PublishOpts::scheduled(message_id, retry_after))
        .await?;
    Ok(())
}

async fn apply_directive<B: Bus>(
    store: &Store,
    bus: &B,
    cache: &RunbookCache,
    exec: &ExecRef,
    snap: &FailureSnapshot,
    directive: &OnFailure,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    match exec {
        ExecRef::Step(step_id) => {
            apply_step_directive(store, bus, cache, step_id, snap, directive, now).await
        }
        ExecRef::Init(_) => apply_init_directive(store, bus, cache, snap, directive, now).await,
    }
}

async fn apply_step_directive<B: Bus>(
    store: &Store,
    bus: &B,
    cache: &RunbookCache,
    step_id: &StepExecutionId,
    snap: &FailureSnapshot,
    directive: &OnFailure,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let located = store.read(|state| {
        state
            .get_step(step_id)
            .map(|s| (s.phase_execution_id.clone(), s.batch_member_id.clone()))
    });
    let Some((phase_id, member_id)) = located else {
        return Ok(());
    };

    match directive {
        OnFailure::Retry | OnFailure::Skip => {
            store.write(|state| {
                progress::fail_member_in_phase(state, &phase_id, &member_id, now);
                progress::complete_phase_if_done(state, &phase_id, now);
            });
        }
        OnFailure::Rollback(name) => {
            let member = store.write(|state| {
                progress::fail_member_in_phase(state, &phase_id, &member_id, now);
                state.get_member(&member_id).cloned()
            });
            if let Some(member) = member {
                rollback::dispatch_rollback(store, bus, cache, &snap.batch, Some(&member), name, now)
                    .await?;
            }
            store.write(|state| {
                progress::complete_phase_if_done(state, &phase_id, now);
            });
        }
        OnFailure::FailPhase => {
            store.write(|state| {
                progress::fail_member_in_phase(state, &phase_id, &member_id, now);
                state.transition_phase(
                    &phase_id,
                    &[PhaseStatus::Pending, PhaseStatus::Dispatched],
                    PhaseStatus::Failed,
                    now,
                );
                progress::cancel_phase_work(state, &phase_id, now);
                progress::complete_batch_if_done(state, &snap.batch.id, now);
            });
        }
        OnFailure::FailBatch => {
            store.write(|state| {
                progress::fail_member_in_phase(state, &phase_id, &member_id, now);
                state.transition_batch(
                    &snap.batch.id,
                    &[
                        BatchStatus::Detected,
                        BatchStatus::InitDispatched,
                        BatchStatus::Active,
                    ],
                    BatchStatus::Failed,
                    now,
                );
                progress::cancel_batch_work(state, &snap.batch.id, now);
            });
        }
    }
    Ok(())
}

/// Init failures have no member to fail. `skip` lets the batch proceed;
/// everything else fails the batch, since phases cannot safely run on
/// top of an unfinished init.
async fn apply_init_directive<B: Bus>(
    store: &Store,
    bus: &B,
    cache: &RunbookCache,
    snap: &FailureSnapshot,
    directive: &OnFailure,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    match directive {
        OnFailure::Skip => {
            store.write(|state| {
                progress::activate_batch_if_inits_done(state, &snap.batch.id, now);
            });
            Ok(())
        }
        other => {
            if let OnFailure::Rollback(name) = other {
                rollback::dispatch_rollback(store, bus, cache, &snap.batch, None, name, now)
                    .await?;
            }
            store.write(|state| {
                state.transition_batch(
                    &snap.batch.id,
                    &[
                        BatchStatus::Detected,
                        BatchStatus::InitDispatched,
                        BatchStatus::Active,
                    ],
                    BatchStatus::Failed,
                    now,
                );
                progress::cancel_batch_work(state, &snap.batch.id, now);
            });
            Ok(())
        }
    }
}
