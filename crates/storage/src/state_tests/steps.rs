// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{pending_init, pending_phase, pending_step, seeded_batch, seeded_member, t0};
use crate::state::StoreState;
use convoy_core::StepStatus;

#[test]
fn member_steps_in_phase_are_ordered_by_index() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");
    let phase = pending_phase(&batch.id, "cutover", 1);
    state.insert_phase_if_absent(phase.clone());

    // Insert out of order
    state.insert_step_if_absent(pending_step(&phase, &member, "verify", 1));
    state.insert_step_if_absent(pending_step(&phase, &member, "move", 0));

    let chain = state.member_steps_in_phase(&phase.id, &member.id);
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[0].core.step_name, "move");
    assert_eq!(chain[1].core.step_name, "verify");
}

#[test]
fn insert_step_if_absent_guards_duplicates() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");
    let phase = pending_phase(&batch.id, "cutover", 1);
    state.insert_phase_if_absent(phase.clone());

    let step = pending_step(&phase, &member, "move", 0);
    assert!(state.insert_step_if_absent(step.clone()));
    assert!(!state.insert_step_if_absent(step));
    assert_eq!(state.steps_of_phase(&phase.id).len(), 1);
}

#[test]
fn update_step_reports_affected_rows() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");
    let phase = pending_phase(&batch.id, "cutover", 1);
    state.insert_phase_if_absent(phase.clone());
    let step = pending_step(&phase, &member, "move", 0);
    state.insert_step_if_absent(step.clone());

    assert!(state.update_step(&step.id, |s| s.core.try_dispatch("j0".to_string(), t0())));
    // CAS miss inside the closure surfaces as zero rows affected
    assert!(!state.update_step(&step.id, |s| s.core.try_dispatch("j0".to_string(), t0())));
    // Missing row is also zero rows affected
    assert!(!state.update_step(&"nope".into(), |s| s.core.try_cancel(t0())));

    assert_eq!(
        state.get_step(&step.id).unwrap().core.status,
        StepStatus::Dispatched
    );
}

#[test]
fn non_terminal_steps_of_batch_spans_phases() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");
    let preflight = pending_phase(&batch.id, "preflight", 1);
    let cutover = pending_phase(&batch.id, "cutover", 1);
    state.insert_phase_if_absent(preflight.clone());
    state.insert_phase_if_absent(cutover.clone());

    let done = pending_step(&preflight, &member, "provision", 0);
    let open = pending_step(&cutover, &member, "move", 0);
    state.insert_step_if_absent(done.clone());
    state.insert_step_if_absent(open.clone());

    state.update_step(&done.id, |s| {
        s.core.try_dispatch("j".to_string(), t0()) && s.core.try_succeed(None, t0())
    });

    let open_ids = state.non_terminal_steps_of_batch(&batch.id);
    assert_eq!(open_ids, vec![open.id]);
}

#[test]
fn polling_queries_cover_steps_and_inits() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");
    let phase = pending_phase(&batch.id, "cutover", 1);
    state.insert_phase_if_absent(phase.clone());

    let step = pending_step(&phase, &member, "move", 0);
    state.insert_step_if_absent(step.clone());
    let init = pending_init(&batch, "reserve", 0);
    state.insert_init_if_absent(init.clone());

    state.update_step(&step.id, |s| {
        s.core.try_dispatch("j".to_string(), t0()) && s.core.try_start_polling(t0())
    });
    state.update_init(&init.id, |i| {
        i.core.try_dispatch("j2".to_string(), t0()) && i.core.try_start_polling(t0())
    });

    assert_eq!(state.polling_steps(), vec![step.id]);
    assert_eq!(state.polling_inits(), vec![init.id]);
}

#[test]
fn inits_of_batch_are_ordered_by_index() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    state.insert_init_if_absent(pending_init(&batch, "second", 1));
    state.insert_init_if_absent(pending_init(&batch, "first", 0));

    let inits = state.inits_of_batch(&batch.id);
    assert_eq!(inits[0].core.step_name, "first");
    assert_eq!(inits[1].core.step_name, "second");
}
