// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler lease abstraction.
//!
//! One tick runs under one exclusive lease; a lease held elsewhere
//! turns the tick into a no-op. Crash recovery relies on the lease
//! expiring (or, for the file lease, the OS dropping the lock with the
//! process).

pub mod fake;
mod file;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use file::FileLease;

/// Errors from lease acquisition
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An exclusive hold proving single-writer authority.
///
/// Released on drop; `release` exists for the explicit exit paths.
pub struct Lease {
    name: String,
    holder: Option<Box<dyn std::any::Any + Send>>,
}

impl Lease {
    pub fn new(name: impl Into<String>, holder: Box<dyn std::any::Any + Send>) -> Self {
        Self {
            name: name.into(),
            holder: Some(holder),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lease now.
    pub fn release(mut self) {
        self.holder.take();
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.holder.take().is_some() {
            tracing::debug!(lease = %self.name, "lease released");
        }
    }
}

/// Acquires exclusive leases keyed by a stable name.
#[async_trait]
pub trait LeaseClient: Send + Sync + 'static {
    /// Try to acquire the lease. `None` means it is held elsewhere;
    /// callers treat that as "someone else's turn", not an error.
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Lease>, LeaseError>;
}
