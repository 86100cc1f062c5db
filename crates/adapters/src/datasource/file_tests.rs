// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{DataSource, DataSourceError, JsonFileDataSource};
use convoy_runbook::DataSourceDef;
use std::io::Write;

fn source(connection: &str) -> DataSourceDef {
    DataSourceDef {
        source_type: "csv".to_string(),
        connection: connection.to_string(),
        query: "members".to_string(),
        primary_key: "user_id".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn reads_rows_from_the_file_named_by_the_env_var() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"[{{"user_id": "u1", "mailbox": "u1@contoso.com"}}, {{"user_id": "u2"}}]"#
    )
    .unwrap();
    std::env::set_var("CONVOY_TEST_MEMBERS", file.path());

    let table = JsonFileDataSource::new()
        .query(&source("CONVOY_TEST_MEMBERS"))
        .await
        .unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0]["user_id"], serde_json::json!("u1"));
}

#[tokio::test]
async fn missing_env_var_is_a_connection_error() {
    let err = JsonFileDataSource::new()
        .query(&source("CONVOY_UNSET_VAR"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::MissingConnection(_)));
}

#[tokio::test]
async fn malformed_file_is_a_query_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not json").unwrap();
    std::env::set_var("CONVOY_TEST_BAD_MEMBERS", file.path());

    let err = JsonFileDataSource::new()
        .query(&source("CONVOY_TEST_BAD_MEMBERS"))
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::Query(_)));
}
