// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handle over the materialized state.

use crate::state::StoreState;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to the orchestrator's durable state.
///
/// A `write` closure is the transaction boundary: everything inside runs
/// under one lock hold, so a partial tick never leaves orphaned rows
/// visible to other components.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<StoreState>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only access under the lock.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        let guard = self.inner.lock();
        f(&guard)
    }

    /// Transactional mutation under the lock.
    pub fn write<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}
