// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runbook registration.
//!
//! The admin surface that accepts runbook uploads lives elsewhere; this
//! is the shared path it (and tests) use to turn validated YAML into a
//! stored version row the scheduler will discover.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use convoy_runbook::{parse_runbook, table_name};
use convoy_storage::{RunbookRecord, Store};

/// Parse, validate, and store a new active runbook version.
///
/// The new version becomes the active one for its name; older versions
/// are deactivated in the same transaction.
pub fn register_runbook(
    store: &Store,
    name: &str,
    version: u32,
    yaml: &str,
    now: DateTime<Utc>,
) -> Result<RunbookRecord, EngineError> {
    let def = parse_runbook(yaml)?;

    let record = RunbookRecord {
        id: RunbookRecord::record_id(name, version),
        name: name.to_string(),
        version,
        yaml: yaml.to_string(),
        data_table_name: table_name(name, version),
        is_active: true,
        overdue_behavior: def.overdue_behavior,
        rerun_init: def.rerun_init,
        created_at: now,
        last_error: None,
    };

    store.write(|state| state.insert_runbook(record.clone()))?;
    tracing::info!(runbook = name, version, "runbook version registered");
    Ok(record)
}
