// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory lease for tests.

use super::{Lease, LeaseClient, LeaseError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct FakeLeaseState {
    held: HashSet<String>,
    /// Names that always refuse, simulating another scheduler instance
    blocked: HashSet<String>,
    acquisitions: u64,
}

/// Controllable lease client: tests can block a name to simulate the
/// lease being held by another process.
#[derive(Clone, Default)]
pub struct FakeLease {
    state: Arc<Mutex<FakeLeaseState>>,
}

impl FakeLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make future acquisitions of `name` fail as held-elsewhere.
    pub fn block(&self, name: &str) {
        self.state.lock().blocked.insert(name.to_string());
    }

    pub fn unblock(&self, name: &str) {
        self.state.lock().blocked.remove(name);
    }

    pub fn acquisition_count(&self) -> u64 {
        self.state.lock().acquisitions
    }

    pub fn is_held(&self, name: &str) -> bool {
        self.state.lock().held.contains(name)
    }
}

struct ReleaseOnDrop {
    state: Arc<Mutex<FakeLeaseState>>,
    name: String,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.state.lock().held.remove(&self.name);
    }
}

#[async_trait]
impl LeaseClient for FakeLease {
    async fn try_acquire(&self, name: &str, _ttl: Duration) -> Result<Option<Lease>, LeaseError> {
        let mut state = self.state.lock();
        if state.blocked.contains(name) || state.held.contains(name) {
            return Ok(None);
        }
        state.held.insert(name.to_string());
        state.acquisitions += 1;
        drop(state);

        let holder = ReleaseOnDrop {
            state: Arc::clone(&self.state),
            name: name.to_string(),
        };
        Ok(Some(Lease::new(name, Box::new(holder))))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
