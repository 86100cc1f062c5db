// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::template::{resolve_init, resolve_member, TemplateError};
use chrono::{TimeZone, Utc};
use convoy_core::BatchId;
use std::collections::HashMap;

fn member_data() -> HashMap<String, serde_json::Value> {
    let mut data = HashMap::new();
    data.insert("user_id".to_string(), serde_json::json!("u1"));
    data.insert("mailbox".to_string(), serde_json::json!("u1@contoso.com"));
    data.insert("display_name".to_string(), serde_json::Value::Null);
    data.insert("quota_mb".to_string(), serde_json::json!(2048));
    data.insert("_batch_time".to_string(), serde_json::json!("2030-01-10"));
    data
}

fn batch_id() -> BatchId {
    BatchId::new("b1")
}

#[test]
fn resolves_member_columns() {
    let out = resolve_member(
        "move {{user_id}} to {{mailbox}}",
        &member_data(),
        &batch_id(),
        None,
        Utc::now(),
    )
    .unwrap();
    assert_eq!(out, "move u1 to u1@contoso.com");
}

#[test]
fn resolves_system_variables() {
    let start = Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap();
    let out = resolve_member(
        "{{_batch_id}} at {{_batch_start_time}}",
        &member_data(),
        &batch_id(),
        Some(start),
        Utc::now(),
    )
    .unwrap();
    assert_eq!(out, "b1 at 2030-01-10T00:00:00Z");
}

#[test]
fn null_start_time_resolves_to_now() {
    let now = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).single().unwrap();
    let out = resolve_member("{{_batch_start_time}}", &member_data(), &batch_id(), None, now)
        .unwrap();
    assert_eq!(out, "2031-06-01T12:00:00Z");
}

#[test]
fn null_column_becomes_empty_string() {
    let out = resolve_member(
        "name=[{{display_name}}]",
        &member_data(),
        &batch_id(),
        None,
        Utc::now(),
    )
    .unwrap();
    assert_eq!(out, "name=[]");
}

#[test]
fn non_string_values_render_as_json() {
    let out =
        resolve_member("quota={{quota_mb}}", &member_data(), &batch_id(), None, Utc::now())
            .unwrap();
    assert_eq!(out, "quota=2048");
}

#[test]
fn underscore_fallback_matches_system_columns() {
    let out =
        resolve_member("t={{batch_time}}", &member_data(), &batch_id(), None, Utc::now()).unwrap();
    assert_eq!(out, "t=2030-01-10");
}

#[test]
fn unresolved_member_identifiers_are_a_hard_failure() {
    let err = resolve_member(
        "{{user_id}} {{nope}} {{also_nope}}",
        &member_data(),
        &batch_id(),
        None,
        Utc::now(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        TemplateError::Unresolved {
            template: "{{user_id}} {{nope}} {{also_nope}}".to_string(),
            unresolved: vec!["nope".to_string(), "also_nope".to_string()],
        }
    );
}

#[test]
fn init_resolution_leaves_unresolved_literal() {
    let out = resolve_init("batch {{_batch_id}} user {{user_id}}", &batch_id(), None, Utc::now());
    assert_eq!(out, "batch b1 user {{user_id}}");
}

#[test]
fn whitespace_inside_braces_is_tolerated() {
    let out = resolve_member("{{ user_id }}", &member_data(), &batch_id(), None, Utc::now())
        .unwrap();
    assert_eq!(out, "u1");
}

#[test]
fn text_without_templates_passes_through() {
    let out = resolve_member("plain text", &member_data(), &batch_id(), None, Utc::now()).unwrap();
    assert_eq!(out, "plain text");
}
