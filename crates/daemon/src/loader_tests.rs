// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{load_runbooks, version_of};
use convoy_storage::Store;
use yare::parameterized;

const YAML: &str = r#"
name: wave
data_source:
  type: sql
  connection: DB
  query: "SELECT user_id FROM t"
  primary_key: user_id
  batch_time: immediate
phases:
  - name: p
    offset: T-0
    steps:
      - { name: s, worker_id: w, function: f }
"#;

#[parameterized(
    plain = { "wave", 1 },
    suffixed = { "wave.v3", 3 },
    bad_suffix = { "wave.vx", 1 },
    dotted_name = { "wave.prod", 1 },
)]
fn version_from_stem(stem: &str, expected: u32) {
    assert_eq!(version_of(stem), expected);
}

#[test]
fn loads_versions_in_order_and_skips_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("wave.v2.yaml"), YAML).unwrap();
    std::fs::write(dir.path().join("wave.yaml"), YAML).unwrap();
    std::fs::write(dir.path().join("broken.yaml"), "name: [").unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let store = Store::new();
    let loaded = load_runbooks(&store, dir.path());

    assert_eq!(loaded, 2);
    let active = store.read(|state| state.active_runbooks());
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "wave");
    assert_eq!(active[0].version, 2);
}

#[test]
fn missing_directory_is_an_empty_start() {
    let store = Store::new();
    assert_eq!(load_runbooks(&store, std::path::Path::new("/nonexistent")), 0);
}
