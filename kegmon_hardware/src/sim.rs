//! Simulated sensors for development and tests.
//!
//! Each simulated device is driven through a cloneable handle so a test (or the
//! CLI's sim backend) can move the keg weight, inject bus faults, or unplug the
//! probe while the device itself lives inside the monitor thread.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kegmon_traits::{LoadCell, Thermometer};

use crate::error::HwError;

#[derive(Debug, Default)]
struct LoadCellState {
    raw: i32,
    /// Added to `raw` after every successful read (simulated pouring when negative).
    step: i32,
    /// Counts for a triangle-wave jitter of +/- `jitter` around `raw`.
    jitter: i32,
    phase: u32,
    fail_next: u32,
    fail_forever: bool,
    reads: u64,
}

/// Control handle for a [`SimulatedLoadCell`].
#[derive(Debug, Clone, Default)]
pub struct SimLoadCellHandle {
    state: Arc<Mutex<LoadCellState>>,
}

impl SimLoadCellHandle {
    fn with<R>(&self, f: impl FnOnce(&mut LoadCellState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_raw(&self, raw: i32) {
        self.with(|s| s.raw = raw);
    }

    pub fn raw(&self) -> i32 {
        self.with(|s| s.raw)
    }

    pub fn set_step(&self, step: i32) {
        self.with(|s| s.step = step);
    }

    pub fn set_jitter(&self, jitter: i32) {
        self.with(|s| s.jitter = jitter.abs());
    }

    /// Make the next `n` reads fail with a timeout.
    pub fn fail_next(&self, n: u32) {
        self.with(|s| s.fail_next = n);
    }

    /// Fail every read until cleared.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.with(|s| s.fail_forever = disconnected);
    }

    pub fn reads(&self) -> u64 {
        self.with(|s| s.reads)
    }
}

pub struct SimulatedLoadCell {
    handle: SimLoadCellHandle,
}

impl SimulatedLoadCell {
    pub fn new(raw: i32) -> Self {
        let handle = SimLoadCellHandle::default();
        handle.set_raw(raw);
        Self { handle }
    }

    pub fn handle(&self) -> SimLoadCellHandle {
        self.handle.clone()
    }
}

impl LoadCell for SimulatedLoadCell {
    fn read(&mut self, _timeout: Duration) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        self.handle.with(|s| -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
            s.reads += 1;
            if s.fail_forever {
                return Err(HwError::Disconnected.into());
            }
            if s.fail_next > 0 {
                s.fail_next -= 1;
                return Err(HwError::Timeout.into());
            }
            let offset = if s.jitter == 0 {
                0
            } else {
                // Deterministic triangle wave over 4 reads: 0, +j, 0, -j
                s.phase = s.phase.wrapping_add(1);
                match s.phase % 4 {
                    1 => s.jitter,
                    3 => -s.jitter,
                    _ => 0,
                }
            };
            let value = s.raw.saturating_add(offset);
            s.raw = s.raw.saturating_add(s.step);
            tracing::trace!(raw = value, "simulated load cell read");
            Ok(value)
        })
    }
}

/// Control handle for a [`SimulatedThermometer`]. `None` means unplugged.
#[derive(Debug, Clone, Default)]
pub struct SimThermometerHandle {
    celsius: Arc<Mutex<Option<f32>>>,
}

impl SimThermometerHandle {
    pub fn set(&self, celsius: Option<f32>) {
        *self.celsius.lock().unwrap_or_else(PoisonError::into_inner) = celsius;
    }

    fn get(&self) -> Option<f32> {
        *self.celsius.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SimulatedThermometer {
    handle: SimThermometerHandle,
}

impl SimulatedThermometer {
    pub fn new(celsius: f32) -> Self {
        let handle = SimThermometerHandle::default();
        handle.set(Some(celsius));
        Self { handle }
    }

    pub fn handle(&self) -> SimThermometerHandle {
        self.handle.clone()
    }
}

impl Thermometer for SimulatedThermometer {
    fn read_celsius(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        self.handle
            .get()
            .ok_or_else(|| HwError::Disconnected.into())
    }
}
