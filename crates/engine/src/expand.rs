// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step expansion: turning runbook step templates into execution rows.
//!
//! Expansion is deterministic. Ids are natural keys and inserts are
//! if-absent, so re-running it after a crash or on a duplicate event
//! changes nothing.

use chrono::{DateTime, Utc};
use convoy_core::{
    Batch, BatchMember, BatchMemberId, ExecutionCore, ExecutionSpec, InitExecution,
    InitExecutionId, MemberStatus, PhaseExecution, StepExecution, StepExecutionId, StepStatus,
    WorkerId,
};
use convoy_runbook::{
    due_at, parse_duration_secs, parse_offset, resolve_init, resolve_member, template,
    PhaseDef, RunbookDefinition, StepDef,
};
use convoy_storage::StoreState;
use std::collections::HashMap;

/// Build the execution core for a step whose params already resolved.
fn core_for(step: &StepDef, step_index: u32, params: HashMap<String, String>) -> ExecutionCore {
    let poll = step.poll.as_ref().map(|p| {
        (
            parse_duration_secs(&p.interval).unwrap_or(0),
            parse_duration_secs(&p.timeout).unwrap_or(0),
        )
    });
    ExecutionCore::pending(ExecutionSpec {
        step_name: step.name.clone(),
        step_index,
        worker_id: WorkerId::new(step.worker_id.clone()),
        function_name: step.function.clone(),
        params,
        on_failure: step.on_failure.clone(),
        poll,
        max_retries: step.max_retries(),
        retry_interval_secs: step.retry_interval_secs(),
    })
}

/// Materialize one member's step chain for a phase.
///
/// A template resolution failure is fatal for the member: the failing
/// step lands as `failed` with the error message, later steps are not
/// created, and the member is marked failed. Returns true when the full
/// chain materialized.
pub(crate) fn materialize_member_chain(
    state: &mut StoreState,
    batch: &Batch,
    phase: &PhaseExecution,
    phase_def: &PhaseDef,
    member: &BatchMember,
    now: DateTime<Utc>,
) -> bool {
    for (index, step_def) in phase_def.steps.iter().enumerate() {
        let id = StepExecutionId::derive(&phase.id, &member.member_key, &step_def.name);
        match resolve_params(step_def, member, batch, now) {
            Ok(params) => {
                state.insert_step_if_absent(StepExecution {
                    id,
                    phase_execution_id: phase.id.clone(),
                    batch_member_id: member.id.clone(),
                    core: core_for(step_def, index as u32, params),
                });
            }
            Err(error) => {
                tracing::warn!(
                    batch = %batch.id,
                    member = %member.member_key,
                    step = %step_def.name,
                    %error,
                    "template resolution failed, failing member's step"
                );
                let mut core = core_for(step_def, index as u32, HashMap::new());
                core.status = StepStatus::Failed;
                core.error_message = Some(error.to_string());
                core.completed_at = Some(now);
                state.insert_step_if_absent(StepExecution {
                    id,
                    phase_execution_id: phase.id.clone(),
                    batch_member_id: member.id.clone(),
                    core,
                });
                state.transition_member(
                    &member.id,
                    &[MemberStatus::Active],
                    MemberStatus::Failed,
                    now,
                );
                return false;
            }
        }
    }
    true
}

fn resolve_params(
    step: &StepDef,
    member: &BatchMember,
    batch: &Batch,
    now: DateTime<Utc>,
) -> Result<HashMap<String, String>, template::TemplateError> {
    let mut params = HashMap::new();
    for (key, tpl) in &step.params {
        let value = resolve_member(tpl, &member.data, &batch.id, batch.batch_start_time, now)?;
        params.insert(key.clone(), value);
    }
    Ok(params)
}

/// Materialize the step chains of every active member of a phase.
/// Returns the ids of members whose chain fully materialized.
pub(crate) fn materialize_phase_steps(
    state: &mut StoreState,
    batch: &Batch,
    phase: &PhaseExecution,
    phase_def: &PhaseDef,
    now: DateTime<Utc>,
) -> Vec<BatchMemberId> {
    let members: Vec<BatchMember> = state
        .active_members_of_batch(&batch.id)
        .into_iter()
        .cloned()
        .collect();
    let mut materialized = Vec::new();
    for member in &members {
        if materialize_member_chain(state, batch, phase, phase_def, member, now) {
            materialized.push(member.id.clone());
        }
    }
    materialized
}

/// Materialize pending phase executions for a batch on a runbook
/// version. With `skip_overdue` (version transitions under
/// `overdue_behavior = ignore`), phases already past due land as
/// `skipped` instead of pending.
pub(crate) fn materialize_batch_phases(
    state: &mut StoreState,
    batch: &Batch,
    def: &RunbookDefinition,
    version: u32,
    now: DateTime<Utc>,
    skip_overdue: bool,
) -> usize {
    let mut created = 0;
    for phase_def in &def.phases {
        let Ok(offset_minutes) = parse_offset(&phase_def.offset) else {
            continue;
        };
        let due = batch.batch_start_time.map(|start| due_at(start, offset_minutes));
        let mut phase =
            PhaseExecution::pending(&batch.id, &phase_def.name, offset_minutes, due, version);
        if skip_overdue && due.is_some_and(|at| at <= now) {
            phase.status = convoy_core::PhaseStatus::Skipped;
            phase.completed_at = Some(now);
        }
        if state.insert_phase_if_absent(phase) {
            created += 1;
        }
    }
    created
}

/// Materialize pending init executions for a batch. Params resolve
/// init-style (no member context). Returns how many rows were created.
pub(crate) fn materialize_inits(
    state: &mut StoreState,
    batch: &Batch,
    init_defs: &[StepDef],
    version: u32,
    now: DateTime<Utc>,
) -> usize {
    let mut created = 0;
    for (index, step_def) in init_defs.iter().enumerate() {
        let mut params = HashMap::new();
        for (key, tpl) in &step_def.params {
            params.insert(
                key.clone(),
                resolve_init(tpl, &batch.id, batch.batch_start_time, now),
            );
        }
        let init = InitExecution {
            id: InitExecutionId::derive(&batch.id, &step_def.name, version),
            batch_id: batch.id.clone(),
            core: core_for(step_def, index as u32, params),
        };
        if state.insert_init_if_absent(init) {
            created += 1;
        }
    }
    created
}
