// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::offset::{due_at, parse_duration_secs, parse_offset, render_offset, GrammarError};
use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use yare::parameterized;

#[parameterized(
    zero = { "T-0", 0 },
    one_minute = { "T-1m", 1 },
    five_days = { "T-5d", 7200 },
    two_hours = { "T-2h", 120 },
    ninety_minutes = { "T-90m", 90 },
    sixty_seconds = { "T-60s", 1 },
    one_second_rounds_up = { "T-1s", 1 },
    ninety_seconds_rounds_up = { "T-90s", 2 },
)]
fn parse_offset_grammar(input: &str, expected_minutes: i64) {
    assert_eq!(parse_offset(input), Ok(expected_minutes));
}

#[parameterized(
    missing_prefix = { "5d" },
    positive_sign = { "T+5d" },
    no_unit = { "T-5" },
    unknown_unit = { "T-5w" },
    no_amount = { "T-d" },
    empty = { "" },
)]
fn parse_offset_rejects_bad_grammar(input: &str) {
    assert!(matches!(parse_offset(input), Err(GrammarError::Offset(_))));
}

#[test]
fn render_offset_round_trips() {
    assert_eq!(render_offset(0), "T-0");
    assert_eq!(render_offset(7200), "T-7200m");
    assert_eq!(parse_offset(&render_offset(7200)), Ok(7200));
}

proptest! {
    #[test]
    fn rendered_offsets_reparse_to_the_same_minutes(minutes in 0i64..=1_000_000) {
        prop_assert_eq!(parse_offset(&render_offset(minutes)), Ok(minutes));
    }
}

#[parameterized(
    empty = { "", 0 },
    thirty_seconds = { "30s", 30 },
    five_minutes = { "5m", 300 },
    one_hour = { "1h", 3600 },
    one_day = { "1d", 86400 },
)]
fn parse_duration_grammar(input: &str, expected_secs: u64) {
    assert_eq!(parse_duration_secs(input), Ok(expected_secs));
}

#[parameterized(
    bare_word = { "bogus" },
    t_prefixed = { "T-5m" },
    unknown_unit = { "10w" },
)]
fn parse_duration_rejects_bad_grammar(input: &str) {
    assert!(matches!(
        parse_duration_secs(input),
        Err(GrammarError::Duration(_))
    ));
}

#[test]
fn due_at_subtracts_the_offset() {
    let start = Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap();
    assert_eq!(due_at(start, 0), start);
    assert_eq!(due_at(start, 24 * 60), start - Duration::days(1));
    assert_eq!(due_at(start, 5 * 24 * 60), start - Duration::days(5));
}
