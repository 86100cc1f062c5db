// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

mod batches;
mod members;
mod phases;
mod runbooks;
mod steps;

use crate::state::{RunbookRecord, StoreState};
use chrono::{DateTime, TimeZone, Utc};
use convoy_core::{
    Batch, BatchId, BatchMember, ExecutionCore, ExecutionSpec, InitExecution, InitExecutionId,
    OverdueBehavior, PhaseExecution, StepExecution, StepExecutionId, WorkerId,
};
use std::collections::HashMap;

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap()
}

pub(crate) fn runbook_record(name: &str, version: u32, is_active: bool) -> RunbookRecord {
    RunbookRecord {
        id: RunbookRecord::record_id(name, version),
        name: name.to_string(),
        version,
        yaml: "name: test".to_string(),
        data_table_name: format!("runbook_{}_v{}", name, version),
        is_active,
        overdue_behavior: OverdueBehavior::Rerun,
        rerun_init: false,
        created_at: t0(),
        last_error: None,
    }
}

pub(crate) fn seeded_batch(state: &mut StoreState, name: &str) -> Batch {
    let batch = Batch::detected(name, 1, t0(), t0());
    state.insert_batch(batch.clone()).unwrap();
    batch
}

pub(crate) fn seeded_member(state: &mut StoreState, batch: &Batch, key: &str) -> BatchMember {
    let member = BatchMember::new(&batch.id, key, HashMap::new(), t0());
    state.insert_member(member.clone()).unwrap();
    member
}

pub(crate) fn pending_phase(batch_id: &BatchId, name: &str, version: u32) -> PhaseExecution {
    PhaseExecution::pending(batch_id, name, 0, Some(t0()), version)
}

pub(crate) fn exec_core(step_name: &str, step_index: u32) -> ExecutionCore {
    ExecutionCore::pending(ExecutionSpec {
        step_name: step_name.to_string(),
        step_index,
        worker_id: WorkerId::new("w"),
        function_name: "f".to_string(),
        params: HashMap::new(),
        on_failure: None,
        poll: None,
        max_retries: 3,
        retry_interval_secs: 60,
    })
}

pub(crate) fn pending_step(
    phase: &PhaseExecution,
    member: &BatchMember,
    step_name: &str,
    step_index: u32,
) -> StepExecution {
    StepExecution {
        id: StepExecutionId::derive(&phase.id, &member.member_key, step_name),
        phase_execution_id: phase.id.clone(),
        batch_member_id: member.id.clone(),
        core: exec_core(step_name, step_index),
    }
}

pub(crate) fn pending_init(batch: &Batch, step_name: &str, step_index: u32) -> InitExecution {
    InitExecution {
        id: InitExecutionId::derive(&batch.id, step_name, batch.runbook_version),
        batch_id: batch.id.clone(),
        core: exec_core(step_name, step_index),
    }
}
