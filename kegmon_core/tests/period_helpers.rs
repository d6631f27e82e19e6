// Focused tests for period and day helpers.
use kegmon_core::util::{MILLIS_PER_DAY, day_of, period_ms, period_us};

#[test]
fn period_us_clamps_and_floors() {
    // hz=2 → 500_000µs, the default sampling rate
    assert_eq!(period_us(2), 500_000);
    assert_eq!(period_us(1), 1_000_000);
    // zero is treated as 1 Hz
    assert_eq!(period_us(0), 1_000_000);
    assert_eq!(period_us(u32::MAX), 1);
}

#[test]
fn period_ms_has_one_ms_floor() {
    assert_eq!(period_ms(2), 500);
    assert_eq!(period_ms(1000), 1);
    assert_eq!(period_ms(10_000), 1);
}

#[test]
fn day_boundaries_are_utc_midnight() {
    assert_eq!(day_of(0), 0);
    assert_eq!(day_of(MILLIS_PER_DAY - 1), 0);
    assert_eq!(day_of(MILLIS_PER_DAY), 1);
    // 2024-01-01T00:00:00Z
    assert_eq!(day_of(1_704_067_200_000), 19_723);
}
