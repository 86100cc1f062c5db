// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process bus for single-host deployments and tests.
//!
//! Messages land in per-channel ready queues; deferred messages park
//! until their enqueue time and move over on the next drain. Dedup is a
//! per-channel set of seen message ids.

use super::{Bus, BusError, PublishOpts};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_core::{ControlEvent, JobEnvelope, ResultEnvelope, WorkerId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

struct Channel<T> {
    seen: HashSet<String>,
    ready: VecDeque<T>,
    deferred: Vec<(DateTime<Utc>, T)>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            ready: VecDeque::new(),
            deferred: Vec::new(),
        }
    }
}

impl<T> Channel<T> {
    /// Returns false when the message id was already seen.
    fn offer(&mut self, message_id: &str, scheduled_at: Option<DateTime<Utc>>, value: T) -> bool {
        if !self.seen.insert(message_id.to_string()) {
            return false;
        }
        match scheduled_at {
            Some(at) => self.deferred.push((at, value)),
            None => self.ready.push_back(value),
        }
        true
    }

    fn drain_due(&mut self, now: DateTime<Utc>) -> Vec<T> {
        // Promote deferred messages whose enqueue time has arrived,
        // earliest first
        self.deferred.sort_by_key(|(at, _)| *at);
        let mut still_deferred = Vec::new();
        for (at, value) in self.deferred.drain(..) {
            if at <= now {
                self.ready.push_back(value);
            } else {
                still_deferred.push((at, value));
            }
        }
        self.deferred = still_deferred;
        self.ready.drain(..).collect()
    }

    fn next_deferred(&self) -> Option<DateTime<Utc>> {
        self.deferred.iter().map(|(at, _)| *at).min()
    }
}

struct BusInner {
    control: Channel<ControlEvent>,
    results: Channel<ResultEnvelope>,
    jobs: HashMap<WorkerId, Channel<JobEnvelope>>,
}

/// In-memory bus with message-id dedup and deferred delivery.
#[derive(Clone)]
pub struct InMemoryBus {
    inner: Arc<Mutex<BusInner>>,
    notify: Arc<Notify>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                control: Channel::default(),
                results: Channel::default(),
                jobs: HashMap::new(),
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// All control events whose enqueue time has arrived.
    pub fn drain_control(&self, now: DateTime<Utc>) -> Vec<ControlEvent> {
        self.inner.lock().control.drain_due(now)
    }

    /// All worker results ready for the orchestrator.
    pub fn drain_results(&self, now: DateTime<Utc>) -> Vec<ResultEnvelope> {
        self.inner.lock().results.drain_due(now)
    }

    /// Jobs routed to one worker.
    pub fn drain_jobs(&self, worker: &WorkerId, now: DateTime<Utc>) -> Vec<JobEnvelope> {
        let mut inner = self.inner.lock();
        match inner.jobs.get_mut(worker) {
            Some(channel) => channel.drain_due(now),
            None => Vec::new(),
        }
    }

    /// Earliest deferred control enqueue time, if any. The daemon loop
    /// uses this to bound its sleep.
    pub fn next_deferred_control(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().control.next_deferred()
    }

    /// Deferred control events with their enqueue times, for
    /// inspection without consuming.
    pub fn scheduled_control(&self) -> Vec<(DateTime<Utc>, ControlEvent)> {
        self.inner.lock().control.deferred.clone()
    }

    /// Wait until something is published.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish_control(
        &self,
        event: ControlEvent,
        opts: PublishOpts,
    ) -> Result<(), BusError> {
        let accepted = {
            let mut inner = self.inner.lock();
            inner
                .control
                .offer(&opts.message_id, opts.scheduled_at, event)
        };
        if accepted {
            self.notify.notify_waiters();
        } else {
            tracing::debug!(message_id = %opts.message_id, "duplicate control message dropped");
        }
        Ok(())
    }

    async fn publish_job(&self, job: JobEnvelope) -> Result<(), BusError> {
        let accepted = {
            let mut inner = self.inner.lock();
            let channel = inner.jobs.entry(job.worker_id.clone()).or_default();
            let message_id = job.job_id.clone();
            channel.offer(&message_id, None, job)
        };
        if accepted {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn publish_result(&self, result: ResultEnvelope) -> Result<(), BusError> {
        let accepted = {
            let mut inner = self.inner.lock();
            let message_id = format!("result-{}", result.job_id);
            inner.results.offer(&message_id, None, result)
        };
        if accepted {
            self.notify.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
