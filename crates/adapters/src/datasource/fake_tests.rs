// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{DataSource, DataSourceError, FakeDataSource};
use convoy_runbook::DataSourceDef;

fn source(query: &str) -> DataSourceDef {
    DataSourceDef {
        source_type: "sql".to_string(),
        query: query.to_string(),
        primary_key: "user_id".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn queued_results_are_consumed_in_order_then_stick() {
    let ds = FakeDataSource::new();
    ds.push_rows("q", &[serde_json::json!({"user_id": "u1"})]);
    ds.push_rows(
        "q",
        &[
            serde_json::json!({"user_id": "u2"}),
            serde_json::json!({"user_id": "u3"}),
        ],
    );

    let first = ds.query(&source("q")).await.unwrap();
    assert_eq!(first.rows.len(), 1);

    let second = ds.query(&source("q")).await.unwrap();
    assert_eq!(second.rows.len(), 2);

    // Queue drained → last result sticks
    let third = ds.query(&source("q")).await.unwrap();
    assert_eq!(third, second);
}

#[tokio::test]
async fn scripted_errors_surface_as_query_failures() {
    let ds = FakeDataSource::new();
    ds.push_error("q", "timeout talking to tenant");

    let err = ds.query(&source("q")).await.unwrap_err();
    assert!(matches!(err, DataSourceError::Query(_)));
    assert!(err.to_string().contains("timeout talking to tenant"));

    // Error consumed; next query returns the (empty) sticky table
    assert!(ds.query(&source("q")).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_queries_return_empty_tables() {
    let ds = FakeDataSource::new();
    assert!(ds.query(&source("never-scripted")).await.unwrap().is_empty());
}

#[tokio::test]
async fn columns_are_the_union_across_rows() {
    let ds = FakeDataSource::new();
    ds.set_rows(
        "q",
        &[
            serde_json::json!({"a": 1}),
            serde_json::json!({"b": 2, "a": 3}),
        ],
    );
    let table = ds.query(&source("q")).await.unwrap();
    assert_eq!(table.columns(), vec!["a".to_string(), "b".to_string()]);
}
