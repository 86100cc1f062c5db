// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] convoy_runbook::ParseError),

    #[error(transparent)]
    Store(#[from] convoy_storage::StoreError),

    #[error(transparent)]
    Bus(#[from] convoy_adapters::BusError),

    #[error(transparent)]
    DataSource(#[from] convoy_adapters::DataSourceError),

    #[error(transparent)]
    Lease(#[from] convoy_adapters::LeaseError),

    #[error("runbook '{name}' v{version} not found")]
    RunbookNotFound { name: String, version: u32 },

    #[error("batch '{0}' not found")]
    BatchNotFound(String),

    #[error("batch '{0}' is in a terminal state")]
    BatchTerminal(String),

    #[error("batch '{0}' has init steps still running")]
    InitsInFlight(String),

    #[error("batch '{batch_id}': phase '{phase}' blocks advancement")]
    PhaseBlocked { batch_id: String, phase: String },
}
