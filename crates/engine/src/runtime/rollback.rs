// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rollback sequence dispatch.
//!
//! Rollbacks are fire-and-forget compensation jobs: they carry detached
//! correlation data, so their results are logged but advance no
//! execution record.

use crate::cache::RunbookCache;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use convoy_adapters::Bus;
use convoy_core::{rollback_job_id, Batch, BatchMember, CorrelationData, JobEnvelope, WorkerId};
use convoy_runbook::{resolve_init, resolve_member};
use convoy_storage::Store;
use std::collections::HashMap;

/// Dispatch the named rollback sequence, resolved against a member when
/// one is in scope (step rollbacks) or batch-only (init rollbacks,
/// member removal after the member data is gone is still member-scoped).
pub(crate) async fn dispatch_rollback<B: Bus>(
    store: &Store,
    bus: &B,
    cache: &RunbookCache,
    batch: &Batch,
    member: Option<&BatchMember>,
    name: &str,
    now: DateTime<Utc>,
) -> Result<(), EngineError> {
    let def = cache.get(store, &batch.runbook_name, batch.runbook_version)?;
    let Some(sequence) = def.get_rollback(name) else {
        tracing::warn!(
            batch = %batch.id,
            rollback = name,
            "rollback sequence not defined, skipping"
        );
        return Ok(());
    };

    tracing::info!(
        batch = %batch.id,
        rollback = name,
        member = member.map(|m| m.member_key.as_str()).unwrap_or("-"),
        steps = sequence.len(),
        "dispatching rollback sequence"
    );

    for (index, step) in sequence.iter().enumerate() {
        let mut parameters = HashMap::new();
        for (key, tpl) in &step.params {
            let value = match member {
                Some(member) => {
                    match resolve_member(tpl, &member.data, &batch.id, batch.batch_start_time, now)
                    {
                        Ok(value) => value,
                        Err(error) => {
                            // Compensation must not wedge on a bad
                            // template; dispatch what resolves.
                            tracing::warn!(
                                batch = %batch.id,
                                rollback = name,
                                step = %step.name,
                                %error,
                                "rollback param left unresolved"
                            );
                            tpl.clone()
                        }
                    }
                }
                None => resolve_init(tpl, &batch.id, batch.batch_start_time, now),
            };
            parameters.insert(key.clone(), value);
        }

        let envelope = JobEnvelope {
            job_id: rollback_job_id(&batch.id, name, index),
            batch_id: batch.id.clone(),
            worker_id: WorkerId::new(step.worker_id.clone()),
            function_name: step.function.clone(),
            parameters,
            correlation_data: CorrelationData::detached(
                &batch.runbook_name,
                batch.runbook_version,
            ),
        };
        bus.publish_job(envelope).await?;
    }
    Ok(())
}
