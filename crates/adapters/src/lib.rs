// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! convoy-adapters: external collaborators behind traits
//!
//! The scheduler and orchestrator talk to the message bus, the member
//! data source, and the lease service exclusively through the traits in
//! this crate. In-process implementations ship alongside for
//! single-host deployments and deterministic tests.

pub mod bus;
pub mod datasource;
pub mod lease;

pub use bus::{Bus, BusError, InMemoryBus, PublishOpts};
pub use datasource::{DataSource, DataSourceError, DataTable, JsonFileDataSource};
pub use lease::{FileLease, Lease, LeaseClient, LeaseError};

#[cfg(any(test, feature = "test-support"))]
pub use datasource::fake::FakeDataSource;
#[cfg(any(test, feature = "test-support"))]
pub use lease::fake::FakeLease;
