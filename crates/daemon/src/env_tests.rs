// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{lease_ttl, prefetch, tick_interval};
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn defaults_apply_without_env() {
    std::env::remove_var("CONVOY_TICK_SECS");
    std::env::remove_var("CONVOY_LEASE_TTL_SECS");
    std::env::remove_var("CONVOY_PREFETCH");

    assert_eq!(tick_interval(), Duration::from_secs(300));
    assert_eq!(lease_ttl(), Duration::from_secs(1500));
    assert_eq!(prefetch(), 16);
}

#[test]
#[serial]
fn overrides_are_read_from_env() {
    std::env::set_var("CONVOY_TICK_SECS", "60");
    assert_eq!(tick_interval(), Duration::from_secs(60));
    // TTL tracks the tick unless pinned
    assert_eq!(lease_ttl(), Duration::from_secs(300));

    std::env::set_var("CONVOY_LEASE_TTL_SECS", "900");
    assert_eq!(lease_ttl(), Duration::from_secs(900));

    std::env::set_var("CONVOY_PREFETCH", "0");
    assert_eq!(prefetch(), 1);

    std::env::remove_var("CONVOY_TICK_SECS");
    std::env::remove_var("CONVOY_LEASE_TTL_SECS");
    std::env::remove_var("CONVOY_PREFETCH");
}
