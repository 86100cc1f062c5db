// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{seeded_batch, t0};
use crate::error::StoreError;
use crate::state::StoreState;
use convoy_core::BatchStatus;

#[test]
fn duplicate_batch_insert_is_rejected() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let err = state.insert_batch(batch).unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { entity: "batch", .. }));
}

#[test]
fn transition_is_compare_and_set() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");

    assert!(state.transition_batch(
        &batch.id,
        &[BatchStatus::Detected],
        BatchStatus::InitDispatched,
        t0(),
    ));
    assert_eq!(
        state.get_batch(&batch.id).unwrap().status,
        BatchStatus::InitDispatched
    );
    assert_eq!(
        state.get_batch(&batch.id).unwrap().init_dispatched_at,
        Some(t0())
    );

    // Wrong precondition → zero rows affected
    assert!(!state.transition_batch(
        &batch.id,
        &[BatchStatus::Detected],
        BatchStatus::Active,
        t0(),
    ));
}

#[test]
fn terminal_batches_never_transition_out() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    state.transition_batch(
        &batch.id,
        &[BatchStatus::Detected],
        BatchStatus::Failed,
        t0(),
    );

    assert!(!state.transition_batch(
        &batch.id,
        &[BatchStatus::Failed],
        BatchStatus::Active,
        t0(),
    ));
    assert_eq!(state.get_batch(&batch.id).unwrap().status, BatchStatus::Failed);
}

#[test]
fn current_phase_and_version_updates() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");

    assert!(state.set_current_phase(&batch.id, "cutover"));
    assert_eq!(
        state.get_batch(&batch.id).unwrap().current_phase.as_deref(),
        Some("cutover")
    );

    assert!(state.set_batch_runbook_version(&batch.id, 2));
    assert_eq!(state.get_batch(&batch.id).unwrap().runbook_version, 2);

    // Version pinning stops once the batch is terminal
    state.transition_batch(
        &batch.id,
        &[BatchStatus::Detected],
        BatchStatus::Completed,
        t0(),
    );
    assert!(!state.set_batch_runbook_version(&batch.id, 3));
}

#[test]
fn batches_of_runbook_filters_by_name() {
    let mut state = StoreState::default();
    seeded_batch(&mut state, "mv");
    seeded_batch(&mut state, "other");
    assert_eq!(state.batches_of_runbook("mv").len(), 1);
    assert_eq!(state.batches_of_runbook("other").len(), 1);
    assert!(state.batches_of_runbook("absent").is_empty());
}
