// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! convoy-storage: transactional in-memory state for the orchestrator
//!
//! The [`Store`] is the single shared mutable resource. Ownership of a
//! row is implicit in its status: every mutation is a compare-and-set
//! that checks the current status first and reports whether it applied,
//! mirroring `UPDATE … WHERE status = ?` affected-row semantics. The API
//! is kept narrow so a SQL-backed implementation can sit behind the same
//! surface.

pub mod dynamic;
pub mod error;
pub mod state;
pub mod store;

pub use dynamic::{DynamicRow, DynamicTable};
pub use error::StoreError;
pub use state::{RunbookRecord, StoreState};
pub use store::Store;
