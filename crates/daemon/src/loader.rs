// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup runbook loading.
//!
//! The admin surface normally feeds runbooks into the store; until it
//! is attached, `<state_dir>/runbooks/*.yaml` seeds the registry.
//! Version comes from a `.v<N>` filename suffix (`wave.v2.yaml`),
//! defaulting to 1; the runbook name comes from the YAML itself.

use chrono::Utc;
use convoy_engine::register_runbook;
use convoy_runbook::parse_runbook;
use convoy_storage::Store;
use std::path::Path;

/// Parse a `stem` like `wave.v2` into its version suffix.
fn version_of(stem: &str) -> u32 {
    stem.rsplit_once(".v")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1)
}

/// Load every runbook YAML under `dir` into the store. Per-file
/// failure boundary: a bad file is logged and skipped.
pub fn load_runbooks(store: &Store, dir: &Path) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            tracing::info!(dir = %dir.display(), "no runbook directory, starting empty");
            return 0;
        }
    };

    let mut candidates: Vec<(u32, String, std::path::PathBuf)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if !is_yaml {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        candidates.push((version_of(&stem), stem, path));
    }
    // Versions are monotonic per name; insert older versions first
    candidates.sort();

    let mut loaded = 0;
    for (version, stem, path) in candidates {
        let yaml = match std::fs::read_to_string(&path) {
            Ok(yaml) => yaml,
            Err(error) => {
                tracing::warn!(file = %path.display(), %error, "unreadable runbook file");
                continue;
            }
        };
        let name = match parse_runbook(&yaml) {
            Ok(def) => def.name,
            Err(error) => {
                tracing::warn!(file = %path.display(), %error, "invalid runbook file");
                continue;
            }
        };
        match register_runbook(store, &name, version, &yaml, Utc::now()) {
            Ok(_) => loaded += 1,
            Err(error) => {
                tracing::warn!(
                    file = %path.display(),
                    runbook = %name,
                    stem = %stem,
                    %error,
                    "runbook not registered"
                );
            }
        }
    }
    loaded
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
