// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message bus abstraction.
//!
//! Three logical channels: control events, worker jobs (fanned out by
//! `WorkerId`), and worker results. Delivery is at-least-once; the bus
//! deduplicates by message id, which is why job ids double as message
//! ids. `scheduled_at` defers enqueue for retry-checks.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{ControlEvent, JobEnvelope, ResultEnvelope};
use thiserror::Error;

pub use memory::InMemoryBus;

/// Errors from bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus is closed")]
    Closed,

    #[error("transient bus failure: {0}")]
    Transient(String),
}

/// Per-publish options: the dedup key and an optional deferred enqueue
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOpts {
    pub message_id: String,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl PublishOpts {
    pub fn immediate(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            scheduled_at: None,
        }
    }

    pub fn scheduled(message_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            message_id: message_id.into(),
            scheduled_at: Some(at),
        }
    }
}

/// Publish side of the bus, as seen by the scheduler and orchestrator.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    async fn publish_control(&self, event: ControlEvent, opts: PublishOpts)
        -> Result<(), BusError>;

    /// Jobs route to the worker named in the envelope; the job id is the
    /// message id.
    async fn publish_job(&self, job: JobEnvelope) -> Result<(), BusError>;

    async fn publish_result(&self, result: ResultEnvelope) -> Result<(), BusError>;
}
