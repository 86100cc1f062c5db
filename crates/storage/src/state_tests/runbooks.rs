// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::runbook_record;
use crate::error::StoreError;
use crate::state::StoreState;

#[test]
fn active_insert_deactivates_previous_version() {
    let mut state = StoreState::default();
    state.insert_runbook(runbook_record("mv", 1, true)).unwrap();
    state.insert_runbook(runbook_record("mv", 2, true)).unwrap();

    let active = state.active_runbooks();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version, 2);
    assert_eq!(state.latest_active("mv").unwrap().version, 2);
    assert!(!state.get_runbook("mv", 1).unwrap().is_active);
}

#[test]
fn versions_are_monotonic_per_name() {
    let mut state = StoreState::default();
    state.insert_runbook(runbook_record("mv", 2, true)).unwrap();

    let err = state.insert_runbook(runbook_record("mv", 2, true)).unwrap_err();
    assert!(matches!(err, StoreError::Duplicate { .. }));

    let err = state.insert_runbook(runbook_record("mv", 1, false)).unwrap_err();
    assert_eq!(
        err,
        StoreError::VersionRegression {
            name: "mv".to_string(),
            version: 1,
            existing: 2,
        }
    );

    // Other names are unaffected
    state.insert_runbook(runbook_record("other", 1, true)).unwrap();
    assert_eq!(state.active_runbooks().len(), 2);
}

#[test]
fn last_error_records_and_clears() {
    let mut state = StoreState::default();
    state.insert_runbook(runbook_record("mv", 1, true)).unwrap();

    assert!(state.set_runbook_last_error("mv", 1, Some("query failed".to_string())));
    assert_eq!(
        state.get_runbook("mv", 1).unwrap().last_error.as_deref(),
        Some("query failed")
    );

    assert!(state.set_runbook_last_error("mv", 1, None));
    assert!(state.get_runbook("mv", 1).unwrap().last_error.is_none());

    assert!(!state.set_runbook_last_error("missing", 1, None));
}

#[test]
fn automation_defaults_to_enabled() {
    let mut state = StoreState::default();
    assert!(state.automation_enabled("mv"));
    state.set_automation("mv", false);
    assert!(!state.automation_enabled("mv"));
    state.set_automation("mv", true);
    assert!(state.automation_enabled("mv"));
}
