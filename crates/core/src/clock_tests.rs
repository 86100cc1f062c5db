// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::clock::{Clock, FakeClock, SystemClock};
use chrono::{Duration, TimeZone, Utc};

#[test]
fn system_clock_produces_nonzero_epoch() {
    let clock = SystemClock;
    assert!(clock.epoch_ms() > 0);
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::new();
    let start = clock.now_utc();
    clock.advance(Duration::minutes(5));
    assert_eq!(clock.now_utc(), start + Duration::minutes(5));
}

#[test]
fn fake_clock_set_pins_time() {
    let clock = FakeClock::new();
    let target = Utc.with_ymd_and_hms(2030, 1, 10, 0, 0, 0).single().unwrap();
    clock.set(target);
    assert_eq!(clock.now_utc(), target);

    // Clones observe the same time source
    let clone = clock.clone();
    clock.advance(Duration::hours(1));
    assert_eq!(clone.now_utc(), target + Duration::hours(1));
}
