// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template variable interpolation for step parameters.
//!
//! Parameters reference `{{identifier}}` where the identifier is either a
//! system variable (`_batch_id`, `_batch_start_time`) or a column of the
//! member's data snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use convoy_core::BatchId;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Regex pattern for {{identifier}} references
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static TEMPLATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
        .expect("constant regex pattern is valid")
});

/// Errors from per-member template resolution
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unresolved template identifiers {unresolved:?} in '{template}'")]
    Unresolved {
        template: String,
        unresolved: Vec<String>,
    },
}

/// Resolve a template against a member's data snapshot.
///
/// Unresolved identifiers are a hard failure: a step dispatched with a
/// half-resolved parameter would act on the wrong object.
pub fn resolve_member(
    template: &str,
    member_data: &HashMap<String, serde_json::Value>,
    batch_id: &BatchId,
    batch_start_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<String, TemplateError> {
    let mut unresolved = Vec::new();
    let resolved = TEMPLATE_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let ident = &caps[1];
            match lookup(ident, Some(member_data), batch_id, batch_start_time, now) {
                Some(value) => value,
                None => {
                    unresolved.push(ident.to_string());
                    caps[0].to_string()
                }
            }
        })
        .to_string();

    if unresolved.is_empty() {
        Ok(resolved)
    } else {
        Err(TemplateError::Unresolved {
            template: template.to_string(),
            unresolved,
        })
    }
}

/// Resolve a template for an init step.
///
/// Init steps have no member context, so only the system variables
/// resolve; anything else is left literally and logged.
pub fn resolve_init(
    template: &str,
    batch_id: &BatchId,
    batch_start_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> String {
    TEMPLATE_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            let ident = &caps[1];
            match lookup(ident, None, batch_id, batch_start_time, now) {
                Some(value) => value,
                None => {
                    tracing::warn!(
                        template,
                        identifier = ident,
                        "unresolved identifier in init template, left literal"
                    );
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}

fn lookup(
    ident: &str,
    member_data: Option<&HashMap<String, serde_json::Value>>,
    batch_id: &BatchId,
    batch_start_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<String> {
    match ident {
        "_batch_id" => Some(batch_id.to_string()),
        "_batch_start_time" => Some(
            batch_start_time
                .unwrap_or(now)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        _ => {
            let data = member_data?;
            data.get(ident)
                // System-column convention: retry with a leading underscore
                .or_else(|| data.get(&format!("_{}", ident)))
                .map(render_value)
        }
    }
}

/// Data values substitute as bare strings; null becomes empty.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
