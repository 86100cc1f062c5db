// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::id::{lineage, nonce, versioned};

crate::define_id! {
    /// Test-only id type.
    pub struct TestId;
}

#[test]
fn lineage_joins_segments_with_colons() {
    assert_eq!(lineage(&["batch", "mv", "2030-01-10T00:00:00Z"]), "batch:mv:2030-01-10T00:00:00Z");
    assert_eq!(lineage(&["solo"]), "solo");
    assert_eq!(lineage(&[]), "");
}

#[test]
fn versioned_appends_the_version_marker() {
    assert_eq!(versioned("batch:mv:phase:cutover", 2), "batch:mv:phase:cutover:v2");
}

#[test]
fn nested_lineage_preserves_the_parent_key() {
    // A child id embeds its parent verbatim, so parent identity is
    // recoverable by prefix match
    let batch = lineage(&["batch", "mv", "manual", "abc"]);
    let member = lineage(&[&batch, "member", "u1"]);
    assert!(member.starts_with(&batch));
    assert_eq!(member, "batch:mv:manual:abc:member:u1");
}

#[test]
fn nonces_are_fresh_uuids() {
    let a = nonce();
    let b = nonce();
    assert_ne!(a, b);
    assert_eq!(a.len(), 36);
}

#[test]
fn define_id_round_trips_through_string() {
    let id = TestId::new("abc-123");
    assert_eq!(id.as_str(), "abc-123");
    assert_eq!(id.to_string(), "abc-123");
    assert_eq!(TestId::from("abc-123".to_string()), id);
    assert!(id == "abc-123");
}

#[test]
fn ids_order_lexically_for_store_collections() {
    let mut ids = vec![TestId::new("b"), TestId::new("a:z"), TestId::new("a")];
    ids.sort();
    assert_eq!(ids, vec![TestId::new("a"), TestId::new("a:z"), TestId::new("b")]);
}
