use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Time source for the monitor loop.
///
/// - now(): monotonic instant used for pacing and staleness
/// - sleep(): blocks (or simulates blocking) for the given duration
/// - wall_ms(): wall-clock milliseconds since the Unix epoch, used to stamp readings
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Milliseconds since the Unix epoch. Returns 0 if the system clock is before 1970.
    fn wall_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0 on underflow.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        u64::try_from(dur.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Real-time clock backed by `Instant` and `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d);
    }

    fn wall_ms(&self) -> u64 {
        (**self).wall_ms()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Wall time reported at offset zero (2024-01-01T00:00:00Z).
    pub const TEST_WALL_ORIGIN_MS: u64 = 1_704_067_200_000;

    /// Deterministic clock whose time only moves when told to.
    ///
    /// now() = origin + offset, wall_ms() = `TEST_WALL_ORIGIN_MS` + offset.
    /// sleep(d) advances the offset by d without blocking. Clones share the offset.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        fn offset(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.offset()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }

        fn wall_ms(&self) -> u64 {
            let off = u64::try_from(self.offset().as_millis()).unwrap_or(u64::MAX);
            TEST_WALL_ORIGIN_MS.saturating_add(off)
        }
    }

}
