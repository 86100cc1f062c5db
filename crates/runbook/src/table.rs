// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dynamic-table naming.

/// Name of the per-version mirror table for a runbook:
/// `runbook_<sanitized_name>_v<version>` where sanitized is lowercase
/// with every non-alphanumeric character mapped to `_`.
pub fn table_name(runbook_name: &str, version: u32) -> String {
    let sanitized: String = runbook_name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("runbook_{}_v{}", sanitized, version)
}

#[cfg(test)]
#[path = "table_tests.rs"]
mod tests;
