//! Common time/period helpers for kegmon_core.

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;
/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;
/// Milliseconds in one UTC day; usage buckets are keyed by `timestamp_ms / MILLIS_PER_DAY`.
pub const MILLIS_PER_DAY: u64 = 86_400_000;

/// Compute the period in microseconds for a given sampling rate in Hz.
/// Clamps `hz` to at least 1 and the result to at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// Compute the period in milliseconds for a given sampling rate in Hz.
/// Clamps `hz` to at least 1 and the result to at least 1 millisecond.
#[inline]
pub fn period_ms(hz: u32) -> u64 {
    (MILLIS_PER_SEC / u64::from(hz.max(1))).max(1)
}

/// UTC day index of a wall-clock timestamp.
#[inline]
pub fn day_of(timestamp_ms: u64) -> u64 {
    timestamp_ms / MILLIS_PER_DAY
}
