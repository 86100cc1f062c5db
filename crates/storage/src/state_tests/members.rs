// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{seeded_batch, seeded_member, t0};
use crate::state::StoreState;
use convoy_core::MemberStatus;
use std::collections::HashMap;

#[test]
fn active_members_excludes_removed_and_failed() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let keep = seeded_member(&mut state, &batch, "u1");
    let gone = seeded_member(&mut state, &batch, "u2");
    let broken = seeded_member(&mut state, &batch, "u3");

    state.transition_member(&gone.id, &[MemberStatus::Active], MemberStatus::Removed, t0());
    state.transition_member(&broken.id, &[MemberStatus::Active], MemberStatus::Failed, t0());

    let active = state.active_members_of_batch(&batch.id);
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, keep.id);
    assert_eq!(state.members_of_batch(&batch.id).len(), 3);

    let gone = state.get_member(&gone.id).unwrap();
    assert_eq!(gone.removed_at, Some(t0()));
    let broken = state.get_member(&broken.id).unwrap();
    assert_eq!(broken.failed_at, Some(t0()));
}

#[test]
fn removed_members_are_not_refreshed() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");

    let mut data = HashMap::new();
    data.insert("mailbox".to_string(), serde_json::json!("new@contoso.com"));
    assert!(state.refresh_member_data(&member.id, data.clone()));

    state.transition_member(&member.id, &[MemberStatus::Active], MemberStatus::Removed, t0());
    assert!(!state.refresh_member_data(&member.id, HashMap::new()));
    assert_eq!(
        state.get_member(&member.id).unwrap().data["mailbox"],
        serde_json::json!("new@contoso.com")
    );
}

#[test]
fn member_transition_requires_expected_status() {
    let mut state = StoreState::default();
    let batch = seeded_batch(&mut state, "mv");
    let member = seeded_member(&mut state, &batch, "u1");

    // active → removed requires absence from the query; a second
    // removal attempt observes the transition already happened
    assert!(state.transition_member(
        &member.id,
        &[MemberStatus::Active],
        MemberStatus::Removed,
        t0(),
    ));
    assert!(!state.transition_member(
        &member.id,
        &[MemberStatus::Active],
        MemberStatus::Removed,
        t0(),
    ));
}
