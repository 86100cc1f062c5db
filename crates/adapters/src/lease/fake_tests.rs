// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{FakeLease, LeaseClient};
use std::time::Duration;

const TTL: Duration = Duration::from_secs(60);

#[tokio::test]
async fn held_lease_refuses_second_acquisition() {
    let client = FakeLease::new();
    let lease = client.try_acquire("scheduler", TTL).await.unwrap().unwrap();
    assert!(client.is_held("scheduler"));

    assert!(client.try_acquire("scheduler", TTL).await.unwrap().is_none());

    drop(lease);
    assert!(!client.is_held("scheduler"));
    assert!(client.try_acquire("scheduler", TTL).await.unwrap().is_some());
}

#[tokio::test]
async fn blocked_names_simulate_another_holder() {
    let client = FakeLease::new();
    client.block("scheduler");
    assert!(client.try_acquire("scheduler", TTL).await.unwrap().is_none());
    assert_eq!(client.acquisition_count(), 0);

    client.unblock("scheduler");
    assert!(client.try_acquire("scheduler", TTL).await.unwrap().is_some());
    assert_eq!(client.acquisition_count(), 1);
}
