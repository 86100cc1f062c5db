// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process cache of parsed runbook definitions.
//!
//! Runbook rows are immutable per `(name, version)`, so a parsed
//! definition never goes stale. Both the scheduler and the orchestrator
//! hold a cache so result handling does not re-parse YAML per message.

use crate::error::EngineError;
use convoy_runbook::{parse_runbook, RunbookDefinition};
use convoy_storage::Store;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct RunbookCache {
    cache: Arc<Mutex<HashMap<(String, u32), RunbookDefinition>>>,
}

impl RunbookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieve a parsed definition, loading and parsing the stored
    /// YAML on a cache miss.
    pub fn get(
        &self,
        store: &Store,
        name: &str,
        version: u32,
    ) -> Result<RunbookDefinition, EngineError> {
        let key = (name.to_string(), version);
        {
            let cache = self.cache.lock();
            if let Some(def) = cache.get(&key) {
                return Ok(def.clone());
            }
        }

        let yaml = store
            .read(|state| state.get_runbook(name, version).map(|r| r.yaml.clone()))
            .ok_or_else(|| EngineError::RunbookNotFound {
                name: name.to_string(),
                version,
            })?;
        let def = parse_runbook(&yaml)?;

        let mut cache = self.cache.lock();
        cache.insert(key, def.clone());
        Ok(def)
    }
}
