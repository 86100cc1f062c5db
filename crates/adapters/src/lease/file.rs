// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed lease for single-host deployments.
//!
//! An exclusive flock on `<dir>/<name>.lease`. The OS releases the lock
//! when the holding process dies, which covers the crash-recovery path
//! the TTL exists for; the TTL and pid are written into the file for
//! operators inspecting a wedged scheduler.

use super::{Lease, LeaseClient, LeaseError};
use async_trait::async_trait;
use fs2::FileExt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

pub struct FileLease {
    dir: PathBuf,
}

impl FileLease {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LeaseClient for FileLease {
    async fn try_acquire(&self, name: &str, ttl: Duration) -> Result<Option<Lease>, LeaseError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.lease", name));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            tracing::debug!(lease = name, path = %path.display(), "lease held elsewhere");
            return Ok(None);
        }

        let _ = writeln!(
            file,
            "pid={} ttl_secs={}",
            std::process::id(),
            ttl.as_secs()
        );

        // The file handle is the hold; dropping it unlocks
        Ok(Some(Lease::new(name, Box::new(file))))
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
