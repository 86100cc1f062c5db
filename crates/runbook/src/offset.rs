// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Offset and duration grammars.
//!
//! Offsets (`T-<n><u>`) anchor phases relative to a batch's start time
//! and normalize to whole minutes, rounding seconds up. Durations
//! (`<n><u>`) configure polling and retry intervals in whole seconds.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Errors from the offset and duration grammars
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrammarError {
    #[error("invalid offset '{0}': expected T-<n><u> with u in d/h/m/s")]
    Offset(String),

    #[error("invalid duration '{0}': expected <n><u> with u in d/h/m/s")]
    Duration(String),
}

/// Parse `T-<n><u>` into a minute count.
///
/// `T-0` is zero. Seconds round up to the next whole minute, so the
/// smallest non-zero offset is one minute.
pub fn parse_offset(s: &str) -> Result<i64, GrammarError> {
    let s = s.trim();
    let rest = s
        .strip_prefix("T-")
        .ok_or_else(|| GrammarError::Offset(s.to_string()))?;

    if rest == "0" {
        return Ok(0);
    }

    let (amount, unit) = split_amount(rest).ok_or_else(|| GrammarError::Offset(s.to_string()))?;
    let minutes = match unit {
        "d" => amount.checked_mul(24 * 60),
        "h" => amount.checked_mul(60),
        "m" => Some(amount),
        "s" => amount.checked_add(59).map(|v| v / 60),
        _ => None,
    }
    .ok_or_else(|| GrammarError::Offset(s.to_string()))?;

    Ok(minutes)
}

/// Render a minute count back into the offset grammar: `T-0` for zero,
/// `T-<minutes>m` otherwise. `parse_offset(render_offset(m)) == m`.
pub fn render_offset(minutes: i64) -> String {
    if minutes == 0 {
        "T-0".to_string()
    } else {
        format!("T-{}m", minutes)
    }
}

/// Parse `<n><u>` into whole seconds. Empty input is zero.
pub fn parse_duration_secs(s: &str) -> Result<u64, GrammarError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0);
    }

    let (amount, unit) = split_amount(s).ok_or_else(|| GrammarError::Duration(s.to_string()))?;
    let amount = u64::try_from(amount).map_err(|_| GrammarError::Duration(s.to_string()))?;
    let secs = match unit {
        "d" => amount.checked_mul(24 * 3600),
        "h" => amount.checked_mul(3600),
        "m" => amount.checked_mul(60),
        "s" => Some(amount),
        _ => None,
    }
    .ok_or_else(|| GrammarError::Duration(s.to_string()))?;

    Ok(secs)
}

/// Compute the fire time of a phase: `batch_start_time − offset`.
pub fn due_at(batch_start_time: DateTime<Utc>, offset_minutes: i64) -> DateTime<Utc> {
    batch_start_time - Duration::minutes(offset_minutes)
}

/// Split a `<digits><unit>` string. Returns None when either part is
/// missing or the digits do not parse.
fn split_amount(s: &str) -> Option<(i64, &str)> {
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let amount: i64 = s[..split].parse().ok()?;
    Some((amount, &s[split..]))
}

#[cfg(test)]
#[path = "offset_tests.rs"]
mod tests;
