// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable configuration with defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Root state directory (`CONVOY_STATE_DIR`, default `./convoy-state`).
/// Holds the lease files and the daemon log.
pub fn state_dir() -> PathBuf {
    std::env::var("CONVOY_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("convoy-state"))
}

/// Scheduler tick period (`CONVOY_TICK_SECS`, default 300).
pub fn tick_interval() -> Duration {
    Duration::from_secs(parse_var("CONVOY_TICK_SECS").unwrap_or(300))
}

/// Lease TTL (`CONVOY_LEASE_TTL_SECS`, default 5× the tick period).
pub fn lease_ttl() -> Duration {
    match parse_var("CONVOY_LEASE_TTL_SECS") {
        Some(secs) => Duration::from_secs(secs),
        None => tick_interval() * 5,
    }
}

/// Per-consumer prefetch bound (`CONVOY_PREFETCH`, default 16): how many
/// messages a consumer takes per drain round.
pub fn prefetch() -> usize {
    parse_var("CONVOY_PREFETCH").unwrap_or(16).max(1) as usize
}

fn parse_var(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
