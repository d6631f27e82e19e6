use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Block until `is_high` reports the line low (HX711 data ready) or `timeout` expires.
/// Sleeps `poll_interval` between checks instead of spinning.
pub fn wait_until_low_with_timeout(
    mut is_high: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while is_high() {
        if Instant::now() >= deadline {
            return Err(HwError::DataReadyTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}

/// Sign-extend a 24-bit two's complement value held in the low bits of `raw`.
#[inline]
pub fn sign_extend_24(raw: u32) -> i32 {
    let v = raw & 0x00FF_FFFF;
    // Shift the sign bit into bit 31, then arithmetic-shift back.
    ((v << 8) as i32) >> 8
}

/// Retry `op` while it fails with a timeout, up to `max_retries` extra attempts.
/// Non-timeout errors are returned immediately.
pub fn retry_on_timeout<T>(max_retries: u32, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempts = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(HwError::Timeout | HwError::DataReadyTimeout) if attempts < max_retries => {
                attempts += 1;
                tracing::warn!(retries = attempts, "load cell timeout, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
