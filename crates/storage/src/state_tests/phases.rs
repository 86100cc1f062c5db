// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{pending_phase, seeded_batch, t0};
use crate::state::StoreState;
use chrono::Duration;
use convoy_core::{PhaseExecution, PhaseStatus};

#[test]
fn insert_if_absent_is_idempotent() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let phase = pending_phase(&batch.id, "cutover", 1);

    assert!(state.insert_phase_if_absent(phase.clone()));
    assert!(!state.insert_phase_if_absent(phase.clone()));
    assert_eq!(state.phases_of_batch(&batch.id).len(), 1);
    assert!(state.has_phases_for_version(&batch.id, 1));
    assert!(!state.has_phases_for_version(&batch.id, 2));
}

#[test]
fn due_pending_phases_orders_by_due_time() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");

    // preflight fires five days before cutover
    let preflight = PhaseExecution::pending(
        &batch.id,
        "preflight",
        5 * 24 * 60,
        Some(t0() - Duration::days(5)),
        1,
    );
    let cutover = PhaseExecution::pending(&batch.id, "cutover", 0, Some(t0()), 1);
    state.insert_phase_if_absent(preflight.clone());
    state.insert_phase_if_absent(cutover.clone());

    // Before cutover is due, only preflight shows up
    let due = state.due_pending_phases(&batch.id, t0() - Duration::days(4));
    assert_eq!(due, vec![preflight.id.clone()]);

    // At t0 both are due, earliest first
    let due = state.due_pending_phases(&batch.id, t0());
    assert_eq!(due, vec![preflight.id.clone(), cutover.id.clone()]);

    // Dispatched phases drop out
    state.transition_phase(
        &preflight.id,
        &[PhaseStatus::Pending],
        PhaseStatus::Dispatched,
        t0(),
    );
    let due = state.due_pending_phases(&batch.id, t0());
    assert_eq!(due, vec![cutover.id]);
}

#[test]
fn manual_phases_with_null_due_never_show_as_due() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let phase = PhaseExecution::pending(&batch.id, "cutover", 0, None, 1);
    state.insert_phase_if_absent(phase);

    assert!(state
        .due_pending_phases(&batch.id, t0() + Duration::days(365))
        .is_empty());
}

#[test]
fn phase_transition_stamps_timestamps() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let phase = pending_phase(&batch.id, "cutover", 1);
    state.insert_phase_if_absent(phase.clone());

    assert!(state.transition_phase(
        &phase.id,
        &[PhaseStatus::Pending],
        PhaseStatus::Dispatched,
        t0(),
    ));
    assert_eq!(state.get_phase(&phase.id).unwrap().dispatched_at, Some(t0()));

    let later = t0() + Duration::minutes(10);
    assert!(state.transition_phase(
        &phase.id,
        &[PhaseStatus::Dispatched],
        PhaseStatus::Completed,
        later,
    ));
    assert_eq!(state.get_phase(&phase.id).unwrap().completed_at, Some(later));

    // Duplicate completion is a no-op
    assert!(!state.transition_phase(
        &phase.id,
        &[PhaseStatus::Dispatched],
        PhaseStatus::Completed,
        later,
    ));
}
