// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers and the id composition convention.
//!
//! Convoy ids are colon-joined natural keys that encode their lineage:
//! a step execution id embeds its phase id, the phase id embeds its
//! batch id, and the batch id embeds the runbook name and start time.
//! Re-materializing an entity therefore always lands on the same row,
//! which is what lets insert-if-absent double as the idempotency guard
//! and keeps job ids deterministic across retries of the same tick.

/// Join id segments with the `:` lineage separator.
///
/// Segments come from runbook names, data-source primary keys, and
/// step names, none of which are sanitized; a `:` inside a segment is
/// harmless because ids are only ever compared whole, never reparsed.
pub fn lineage(segments: &[&str]) -> String {
    segments.join(":")
}

/// Append `vN` to an id's lineage, marking which runbook version an
/// execution row belongs to.
pub fn versioned(prefix: &str, version: u32) -> String {
    format!("{}:v{}", prefix, version)
}

/// Fresh random key for the one entity with no natural lineage: a
/// manually created batch.
pub fn nonce() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Define a newtype id over a composed lineage key.
///
/// Generates the surface the rest of the system leans on: `new` /
/// `as_str` constructors, `Display` for logging, `From` conversions,
/// string comparisons, and the `Hash`/`Ord` derives that let ids key
/// the store's ordered collections and the bus's per-worker routing
/// tables.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash,
            serde::Serialize, serde::Deserialize,
        )]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
