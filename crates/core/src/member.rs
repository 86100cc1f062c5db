// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch member record.

use crate::batch::BatchId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

crate::define_id! {
    /// Unique identifier for a member within a batch:
    /// `{batch_id}:member:{member_key}`.
    pub struct BatchMemberId;
}

impl BatchMemberId {
    pub fn derive(batch_id: &BatchId, member_key: &str) -> Self {
        Self::new(crate::id::lineage(&[batch_id.as_str(), "member", member_key]))
    }
}

/// Membership status within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    /// No longer present in the data-source query
    Removed,
    /// A step failed terminally for this member
    Failed,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberStatus::Active => write!(f, "active"),
            MemberStatus::Removed => write!(f, "removed"),
            MemberStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A single migrating entity (user or mailbox) within a batch.
///
/// Members are never hard-deleted; removal is a status transition so
/// execution lineage stays intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMember {
    pub id: BatchMemberId,
    pub batch_id: BatchId,
    pub member_key: String,
    /// Last-seen attribute snapshot from the data source. Refreshed on
    /// every tick while the member is active.
    pub data: HashMap<String, serde_json::Value>,
    pub status: MemberStatus,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl BatchMember {
    pub fn new(
        batch_id: &BatchId,
        member_key: &str,
        data: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BatchMemberId::derive(batch_id, member_key),
            batch_id: batch_id.clone(),
            member_key: member_key.to_string(),
            data,
            status: MemberStatus::Active,
            added_at: now,
            removed_at: None,
            failed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

#[cfg(test)]
#[path = "member_tests.rs"]
mod tests;
