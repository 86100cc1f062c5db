// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized orchestrator state.
//!
//! All collections are keyed by the entities' natural ids, so repeated
//! materialization of the same batch, phase, or step lands on the same
//! row and insert-if-absent doubles as the idempotency guard.

use crate::dynamic::DynamicTable;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use convoy_core::{
    Batch, BatchId, BatchMember, BatchMemberId, BatchStatus, InitExecution, InitExecutionId,
    MemberStatus, OverdueBehavior, PhaseExecution, PhaseExecutionId, PhaseStatus, StepExecution,
    StepExecutionId, StepStatus,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A stored runbook version.
///
/// Immutable once inserted except for `is_active` and `last_error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookRecord {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub yaml: String,
    pub data_table_name: String,
    pub is_active: bool,
    pub overdue_behavior: OverdueBehavior,
    pub rerun_init: bool,
    pub created_at: DateTime<Utc>,
    /// Most recent runbook-scoped failure, cleared on a clean tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RunbookRecord {
    pub fn record_id(name: &str, version: u32) -> String {
        format!("runbook:{}:v{}", name, version)
    }
}

/// All durable orchestrator state.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    runbooks: BTreeMap<String, RunbookRecord>,
    automation: BTreeMap<String, bool>,
    batches: BTreeMap<BatchId, Batch>,
    members: BTreeMap<BatchMemberId, BatchMember>,
    phases: BTreeMap<PhaseExecutionId, PhaseExecution>,
    steps: BTreeMap<StepExecutionId, StepExecution>,
    inits: BTreeMap<InitExecutionId, InitExecution>,
    tables: BTreeMap<String, DynamicTable>,
}

impl StoreState {
    // ------------------------------------------------------------------
    // Runbooks
    // ------------------------------------------------------------------

    /// Insert a runbook version. Versions are monotonic per name; an
    /// active insert deactivates the previous active version.
    pub fn insert_runbook(&mut self, record: RunbookRecord) -> Result<(), StoreError> {
        if self.runbooks.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                entity: "runbook",
                id: record.id,
            });
        }
        if let Some(existing) = self
            .runbooks
            .values()
            .filter(|r| r.name == record.name)
            .map(|r| r.version)
            .max()
        {
            if record.version <= existing {
                return Err(StoreError::VersionRegression {
                    name: record.name,
                    version: record.version,
                    existing,
                });
            }
        }
        if record.is_active {
            for other in self.runbooks.values_mut() {
                if other.name == record.name {
                    other.is_active = false;
                }
            }
        }
        self.runbooks.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn get_runbook(&self, name: &str, version: u32) -> Option<&RunbookRecord> {
        self.runbooks.get(&RunbookRecord::record_id(name, version))
    }

    /// All active runbook versions, in name order.
    pub fn active_runbooks(&self) -> Vec<RunbookRecord> {
        self.runbooks
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect()
    }

    /// Highest active version for a runbook name.
    pub fn latest_active(&self, name: &str) -> Option<&RunbookRecord> {
        self.runbooks
            .values()
            .filter(|r| r.is_active && r.name == name)
            .max_by_key(|r| r.version)
    }

    pub fn set_runbook_last_error(
        &mut self,
        name: &str,
        version: u32,
        error: Option<String>,
    ) -> bool {
        match self
            .runbooks
            .get_mut(&RunbookRecord::record_id(name, version))
        {
            Some(record) => {
                record.last_error = error;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Automation settings
    // ------------------------------------------------------------------

    /// Whether the scheduler queries data sources for this runbook.
    /// Defaults to enabled. Existing batches continue regardless.
    pub fn automation_enabled(&self, runbook_name: &str) -> bool {
        self.automation.get(runbook_name).copied().unwrap_or(true)
    }

    pub fn set_automation(&mut self, runbook_name: &str, enabled: bool) {
        self.automation.insert(runbook_name.to_string(), enabled);
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    pub fn insert_batch(&mut self, batch: Batch) -> Result<(), StoreError> {
        if self.batches.contains_key(&batch.id) {
            return Err(StoreError::Duplicate {
                entity: "batch",
                id: batch.id.to_string(),
            });
        }
        self.batches.insert(batch.id.clone(), batch);
        Ok(())
    }

    pub fn get_batch(&self, id: &BatchId) -> Option<&Batch> {
        self.batches.get(id)
    }

    pub fn batches_of_runbook(&self, runbook_name: &str) -> Vec<&Batch> {
        self.batches
            .values()
            .filter(|b| b.runbook_name == runbook_name)
            .collect()
    }

    /// CAS status transition. Terminal batches never transition out.
    pub fn transition_batch(
        &mut self,
        id: &BatchId,
        from: &[BatchStatus],
        to: BatchStatus,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(batch) = self.batches.get_mut(id) else {
            return false;
        };
        if batch.status.is_terminal() || !from.contains(&batch.status) {
            return false;
        }
        batch.status = to;
        if to == BatchStatus::InitDispatched {
            batch.init_dispatched_at = Some(now);
        }
        true
    }

    pub fn set_current_phase(&mut self, id: &BatchId, phase_name: &str) -> bool {
        match self.batches.get_mut(id) {
            Some(batch) => {
                batch.current_phase = Some(phase_name.to_string());
                true
            }
            None => false,
        }
    }

    /// Move a live batch onto a newer runbook version.
    pub fn set_batch_runbook_version(&mut self, id: &BatchId, version: u32) -> bool {
        match self.batches.get_mut(id) {
            Some(batch) if !batch.status.is_terminal() => {
                batch.runbook_version = version;
                true
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    pub fn insert_member(&mut self, member: BatchMember) -> Result<(), StoreError> {
        if self.members.contains_key(&member.id) {
            return Err(StoreError::Duplicate {
                entity: "batch member",
                id: member.id.to_string(),
            });
        }
        self.members.insert(member.id.clone(), member);
        Ok(())
    }

    pub fn get_member(&self, id: &BatchMemberId) -> Option<&BatchMember> {
        self.members.get(id)
    }

    pub fn members_of_batch(&self, batch_id: &BatchId) -> Vec<&BatchMember> {
        self.members
            .values()
            .filter(|m| &m.batch_id == batch_id)
            .collect()
    }

    pub fn active_members_of_batch(&self, batch_id: &BatchId) -> Vec<&BatchMember> {
        self.members
            .values()
            .filter(|m| &m.batch_id == batch_id && m.is_active())
            .collect()
    }

    /// Refresh the data snapshot for an active member so later phases
    /// see current attributes. Removed/failed members are never
    /// refreshed.
    pub fn refresh_member_data(
        &mut self,
        id: &BatchMemberId,
        data: HashMap<String, serde_json::Value>,
    ) -> bool {
        match self.members.get_mut(id) {
            Some(member) if member.is_active() => {
                member.data = data;
                true
            }
            _ => false,
        }
    }

    pub fn transition_member(
        &mut self,
        id: &BatchMemberId,
        from: &[MemberStatus],
        to: MemberStatus,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(member) = self.members.get_mut(id) else {
            return false;
        };
        if !from.contains(&member.status) {
            return false;
        }
        member.status = to;
        match to {
            MemberStatus::Removed => member.removed_at = Some(now),
            MemberStatus::Failed => member.failed_at = Some(now),
            MemberStatus::Active => {}
        }
        true
    }

    // ------------------------------------------------------------------
    // Phase executions
    // ------------------------------------------------------------------

    /// Insert a phase execution unless its natural key already exists.
    pub fn insert_phase_if_absent(&mut self, phase: PhaseExecution) -> bool {
        if self.phases.contains_key(&phase.id) {
            return false;
        }
        self.phases.insert(phase.id.clone(), phase);
        true
    }

    pub fn get_phase(&self, id: &PhaseExecutionId) -> Option<&PhaseExecution> {
        self.phases.get(id)
    }

    pub fn phases_of_batch(&self, batch_id: &BatchId) -> Vec<&PhaseExecution> {
        self.phases
            .values()
            .filter(|p| &p.batch_id == batch_id)
            .collect()
    }

    pub fn phases_of_batch_version(
        &self,
        batch_id: &BatchId,
        runbook_version: u32,
    ) -> Vec<&PhaseExecution> {
        self.phases
            .values()
            .filter(|p| &p.batch_id == batch_id && p.runbook_version == runbook_version)
            .collect()
    }

    pub fn has_phases_for_version(&self, batch_id: &BatchId, runbook_version: u32) -> bool {
        self.phases
            .values()
            .any(|p| &p.batch_id == batch_id && p.runbook_version == runbook_version)
    }

    /// Pending phases of a batch whose due time has arrived, earliest
    /// due first.
    pub fn due_pending_phases(
        &self,
        batch_id: &BatchId,
        now: DateTime<Utc>,
    ) -> Vec<PhaseExecutionId> {
        let mut due: Vec<&PhaseExecution> = self
            .phases
            .values()
            .filter(|p| {
                &p.batch_id == batch_id
                    && p.status == PhaseStatus::Pending
                    && p.due_at.is_some_and(|at| at <= now)
            })
            .collect();
        due.sort_by_key(|p| p.due_at);
        due.into_iter().map(|p| p.id.clone()).collect()
    }

    pub fn transition_phase(
        &mut self,
        id: &PhaseExecutionId,
        from: &[PhaseStatus],
        to: PhaseStatus,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(phase) = self.phases.get_mut(id) else {
            return false;
        };
        if !from.contains(&phase.status) {
            return false;
        }
        phase.status = to;
        match to {
            PhaseStatus::Dispatched => phase.dispatched_at = Some(now),
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped => {
                phase.completed_at = Some(now)
            }
            _ => {}
        }
        true
    }

    // ------------------------------------------------------------------
    // Step executions
    // ------------------------------------------------------------------

    /// Insert a step execution unless its natural key already exists.
    /// The absent check is what makes re-expansion idempotent.
    pub fn insert_step_if_absent(&mut self, step: StepExecution) -> bool {
        if self.steps.contains_key(&step.id) {
            return false;
        }
        self.steps.insert(step.id.clone(), step);
        true
    }

    pub fn get_step(&self, id: &StepExecutionId) -> Option<&StepExecution> {
        self.steps.get(id)
    }

    pub fn steps_of_phase(&self, phase_id: &PhaseExecutionId) -> Vec<&StepExecution> {
        self.steps
            .values()
            .filter(|s| &s.phase_execution_id == phase_id)
            .collect()
    }

    /// A member's chain within one phase, ordered by step index.
    pub fn member_steps_in_phase(
        &self,
        phase_id: &PhaseExecutionId,
        member_id: &BatchMemberId,
    ) -> Vec<&StepExecution> {
        let mut steps: Vec<&StepExecution> = self
            .steps
            .values()
            .filter(|s| &s.phase_execution_id == phase_id && &s.batch_member_id == member_id)
            .collect();
        steps.sort_by_key(|s| s.core.step_index);
        steps
    }

    /// Every step belonging to a member, across phases.
    pub fn steps_of_member(&self, member_id: &BatchMemberId) -> Vec<&StepExecution> {
        self.steps
            .values()
            .filter(|s| &s.batch_member_id == member_id)
            .collect()
    }

    /// Apply a CAS mutation to a step. The closure reports whether it
    /// transitioned anything; false is the zero-rows-affected case.
    pub fn update_step(
        &mut self,
        id: &StepExecutionId,
        f: impl FnOnce(&mut StepExecution) -> bool,
    ) -> bool {
        self.steps.get_mut(id).map(f).unwrap_or(false)
    }

    /// Ids of every step currently polling.
    pub fn polling_steps(&self) -> Vec<StepExecutionId> {
        self.steps
            .values()
            .filter(|s| s.core.status == StepStatus::Polling)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Non-terminal steps across a whole batch (for fail_batch / cancel).
    pub fn non_terminal_steps_of_batch(&self, batch_id: &BatchId) -> Vec<StepExecutionId> {
        let phase_ids: Vec<&PhaseExecutionId> = self
            .phases
            .values()
            .filter(|p| &p.batch_id == batch_id)
            .map(|p| &p.id)
            .collect();
        self.steps
            .values()
            .filter(|s| {
                !s.core.status.is_terminal() && phase_ids.contains(&&s.phase_execution_id)
            })
            .map(|s| s.id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Init executions
    // ------------------------------------------------------------------

    pub fn insert_init_if_absent(&mut self, init: InitExecution) -> bool {
        if self.inits.contains_key(&init.id) {
            return false;
        }
        self.inits.insert(init.id.clone(), init);
        true
    }

    pub fn get_init(&self, id: &InitExecutionId) -> Option<&InitExecution> {
        self.inits.get(id)
    }

    /// A batch's init executions ordered by step index.
    pub fn inits_of_batch(&self, batch_id: &BatchId) -> Vec<&InitExecution> {
        let mut inits: Vec<&InitExecution> = self
            .inits
            .values()
            .filter(|i| &i.batch_id == batch_id)
            .collect();
        inits.sort_by_key(|i| i.core.step_index);
        inits
    }

    pub fn update_init(
        &mut self,
        id: &InitExecutionId,
        f: impl FnOnce(&mut InitExecution) -> bool,
    ) -> bool {
        self.inits.get_mut(id).map(f).unwrap_or(false)
    }

    pub fn polling_inits(&self) -> Vec<InitExecutionId> {
        self.inits
            .values()
            .filter(|i| i.core.status == StepStatus::Polling)
            .map(|i| i.id.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Dynamic tables
    // ------------------------------------------------------------------

    /// Get or create the mirror table with the given name.
    pub fn table_mut(&mut self, name: &str) -> &mut DynamicTable {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| DynamicTable::new(name))
    }

    pub fn get_table(&self, name: &str) -> Option<&DynamicTable> {
        self.tables.get(name)
    }
}

#[cfg(test)]
#[path = "state_tests/mod.rs"]
mod tests;
