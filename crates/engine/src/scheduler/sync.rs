// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Data-source sync: dynamic table upkeep, batch detection, member
//! diffing.

use super::Scheduler;
use crate::error::EngineError;
use crate::expand;
use crate::jitter::Jitter;
use chrono::{DateTime, TimeZone, Utc};
use convoy_adapters::{Bus, DataSource, DataTable, LeaseClient, PublishOpts};
use convoy_core::{
    Batch, BatchId, BatchMember, BatchStatus, Clock, ControlEvent, MemberStatus,
};
use convoy_runbook::{BatchTimeMode, MultiValueFormat, MultiValuedColumn, RunbookDefinition};
use convoy_storage::RunbookRecord;
use std::collections::{BTreeMap, HashMap};

/// A query row after normalization.
struct MemberRow {
    member_key: String,
    batch_time: Option<DateTime<Utc>>,
    data: HashMap<String, serde_json::Value>,
}

/// Round down to the nearest 5-minute boundary, so an immediate batch
/// re-detected within the window lands on the same batch row.
fn floor_to_window(now: DateTime<Utc>) -> DateTime<Utc> {
    let secs = now.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(300), 0)
        .single()
        .unwrap_or(now)
}

/// Normalize a multi-valued column into a JSON array.
fn normalize_multi_valued(value: &serde_json::Value, format: MultiValueFormat) -> serde_json::Value {
    if value.is_array() || value.is_null() {
        return value.clone();
    }
    let raw = match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    };
    match format {
        MultiValueFormat::JsonArray => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(parsed) if parsed.is_array() => parsed,
            _ => serde_json::Value::Array(vec![serde_json::Value::String(raw)]),
        },
        MultiValueFormat::SemicolonDelimited | MultiValueFormat::CommaDelimited => {
            let sep = if format == MultiValueFormat::SemicolonDelimited {
                ';'
            } else {
                ','
            };
            serde_json::Value::Array(
                raw.split(sep)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| serde_json::Value::String(s.to_string()))
                    .collect(),
            )
        }
    }
}

fn key_of(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl<B, D, L, C, J> Scheduler<B, D, L, C, J>
where
    B: Bus,
    D: DataSource,
    L: LeaseClient,
    C: Clock,
    J: Jitter,
{
    /// Turn a query result into batches and member diffs. Returns the
    /// control events to publish after the transactions commit.
    pub(super) fn sync_members(
        &self,
        record: &RunbookRecord,
        def: &RunbookDefinition,
        table: DataTable,
        now: DateTime<Utc>,
    ) -> Result<Vec<(ControlEvent, PublishOpts)>, EngineError> {
        let rows = self.normalize_rows(record, def, table, now);
        self.mirror_rows(record, &rows, now);

        // Group rows into batch cohorts
        let mut groups: BTreeMap<DateTime<Utc>, Vec<&MemberRow>> = BTreeMap::new();
        match def.data_source.batch_time {
            BatchTimeMode::Immediate => {
                if !rows.is_empty() {
                    groups.insert(floor_to_window(now), rows.iter().collect());
                }
            }
            BatchTimeMode::Column => {
                for row in &rows {
                    if let Some(start) = row.batch_time {
                        groups.entry(start).or_default().push(row);
                    }
                }
            }
        }

        let mut events = Vec::new();
        for (start, group) in groups {
            events.extend(self.sync_batch_group(record, def, start, &group, now)?);
        }
        Ok(events)
    }

    fn normalize_rows(
        &self,
        record: &RunbookRecord,
        def: &RunbookDefinition,
        table: DataTable,
        _now: DateTime<Utc>,
    ) -> Vec<MemberRow> {
        let multi: &[MultiValuedColumn] = &def.data_source.multi_valued_columns;
        let mut rows = Vec::with_capacity(table.rows.len());

        for mut data in table.rows {
            for column in multi {
                if let Some(value) = data.get(&column.name) {
                    let normalized = normalize_multi_valued(value, column.format);
                    data.insert(column.name.clone(), normalized);
                }
            }

            let Some(member_key) = data.get(&def.data_source.primary_key).and_then(key_of) else {
                tracing::warn!(
                    runbook = %record.name,
                    primary_key = %def.data_source.primary_key,
                    "row without usable primary key dropped"
                );
                continue;
            };

            let batch_time = match def.data_source.batch_time {
                BatchTimeMode::Immediate => None,
                BatchTimeMode::Column => {
                    let column = def.data_source.batch_time_column.as_deref().unwrap_or("");
                    match data.get(column).and_then(|v| v.as_str()) {
                        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
                            Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                            Err(_) => {
                                tracing::warn!(
                                    runbook = %record.name,
                                    member = %member_key,
                                    value = raw,
                                    "unparseable batch time, row dropped from grouping"
                                );
                                None
                            }
                        },
                        None => {
                            tracing::warn!(
                                runbook = %record.name,
                                member = %member_key,
                                "missing batch time, row dropped from grouping"
                            );
                            None
                        }
                    }
                }
            };

            rows.push(MemberRow {
                member_key,
                batch_time,
                data,
            });
        }
        rows
    }

    /// Mirror the query into the runbook's dynamic table: upsert
    /// current rows, retire vanished keys.
    fn mirror_rows(&self, record: &RunbookRecord, rows: &[MemberRow], now: DateTime<Utc>) {
        self.store.write(|state| {
            let table = state.table_mut(&record.data_table_name);
            for row in rows {
                table.upsert_row(&row.member_key, row.batch_time, row.data.clone(), now);
            }
            let present: Vec<&str> = rows.iter().map(|r| r.member_key.as_str()).collect();
            let retired = table.retire_missing(present);
            if retired > 0 {
                tracing::debug!(
                    table = %record.data_table_name,
                    retired,
                    "rows no longer current"
                );
            }
        });
    }

    /// Create a new batch for the group, or reconcile the existing one
    /// by diffing members. One store transaction per group.
    fn sync_batch_group(
        &self,
        record: &RunbookRecord,
        def: &RunbookDefinition,
        start: DateTime<Utc>,
        group: &[&MemberRow],
        now: DateTime<Utc>,
    ) -> Result<Vec<(ControlEvent, PublishOpts)>, EngineError> {
        let batch_id = BatchId::detected(&record.name, start);
        let existing = self.store.read(|state| state.get_batch(&batch_id).cloned());

        match existing {
            Some(batch) if batch.is_terminal() => Ok(Vec::new()),
            Some(batch) => Ok(self.reconcile_members(&batch, group, now)),
            None => self.create_batch(record, def, start, group, now),
        }
    }

    fn create_batch(
        &self,
        record: &RunbookRecord,
        def: &RunbookDefinition,
        start: DateTime<Utc>,
        group: &[&MemberRow],
        now: DateTime<Utc>,
    ) -> Result<Vec<(ControlEvent, PublishOpts)>, EngineError> {
        let batch = Batch::detected(&record.name, record.version, start, now);
        let batch_id = batch.id.clone();
        let has_inits = !def.init.is_empty();

        self.store.write(|state| {
            state.insert_batch(batch.clone())?;
            for row in group {
                state.insert_member(BatchMember::new(
                    &batch_id,
                    &row.member_key,
                    row.data.clone(),
                    now,
                ))?;
            }
            expand::materialize_batch_phases(state, &batch, def, record.version, now, false);
            expand::materialize_inits(state, &batch, &def.init, record.version, now);
            if !has_inits {
                // Nothing to initialize; phases are immediately eligible
                state.transition_batch(
                    &batch_id,
                    &[BatchStatus::Detected],
                    BatchStatus::Active,
                    now,
                );
            }
            Ok::<(), EngineError>(())
        })?;

        tracing::info!(
            batch = %batch_id,
            members = group.len(),
            start = %start,
            "batch detected"
        );

        let mut events = Vec::new();
        if has_inits {
            events.push((
                ControlEvent::BatchInit {
                    runbook_name: record.name.clone(),
                    runbook_version: record.version,
                    batch_id: batch_id.clone(),
                    batch_start_time: Some(start),
                    member_count: group.len(),
                },
                PublishOpts::immediate(format!("batch-init-{}-v{}", batch_id, record.version)),
            ));
        }
        Ok(events)
    }

    fn reconcile_members(
        &self,
        batch: &Batch,
        group: &[&MemberRow],
        now: DateTime<Utc>,
    ) -> Vec<(ControlEvent, PublishOpts)> {
        self.store.write(|state| {
            let mut events = Vec::new();
            let existing: HashMap<String, BatchMember> = state
                .members_of_batch(&batch.id)
                .into_iter()
                .map(|m| (m.member_key.clone(), m.clone()))
                .collect();

            for row in group {
                match existing.get(&row.member_key) {
                    None => {
                        let member =
                            BatchMember::new(&batch.id, &row.member_key, row.data.clone(), now);
                        let member_id = member.id.clone();
                        if state.insert_member(member).is_ok() {
                            tracing::info!(
                                batch = %batch.id,
                                member = %row.member_key,
                                "member added"
                            );
                            events.push((
                                ControlEvent::MemberAdded {
                                    runbook_name: batch.runbook_name.clone(),
                                    runbook_version: batch.runbook_version,
                                    batch_id: batch.id.clone(),
                                    batch_member_id: member_id.clone(),
                                    member_key: row.member_key.clone(),
                                },
                                PublishOpts::immediate(format!("member-added-{}", member_id)),
                            ));
                        }
                    }
                    Some(member) if member.is_active() => {
                        // Active members see fresh attributes every tick
                        state.refresh_member_data(&member.id, row.data.clone());
                    }
                    // Removed/failed members are never refreshed or
                    // resurrected
                    Some(_) => {}
                }
            }

            let current: HashMap<&str, ()> =
                group.iter().map(|r| (r.member_key.as_str(), ())).collect();
            for (key, member) in &existing {
                if member.is_active() && !current.contains_key(key.as_str()) {
                    let transitioned = state.transition_member(
                        &member.id,
                        &[MemberStatus::Active],
                        MemberStatus::Removed,
                        now,
                    );
                    if transitioned {
                        tracing::info!(batch = %batch.id, member = %key, "member removed");
                        events.push((
                            ControlEvent::MemberRemoved {
                                runbook_name: batch.runbook_name.clone(),
                                runbook_version: batch.runbook_version,
                                batch_id: batch.id.clone(),
                                batch_member_id: member.id.clone(),
                                member_key: key.clone(),
                            },
                            PublishOpts::immediate(format!("member-removed-{}", member.id)),
                        ));
                    }
                }
            }
            events
        })
    }
}
