//! Sensor adapter: turns trait-level load-cell/thermometer reads into typed samples.

use std::sync::Arc;
use std::time::Duration;

use kegmon_traits::{Clock, LoadCell, Thermometer};

use crate::error::KegmonError;
use crate::hw_error::map_hw_error;
use crate::types::RawSample;

/// Running min/max/mean/variance of raw counts (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawStats {
    pub count: u64,
    pub min: Option<i32>,
    pub max: Option<i32>,
    mean: f64,
    m2: f64,
}

impl RawStats {
    pub fn push(&mut self, raw: i32) {
        self.count += 1;
        self.min = Some(self.min.map_or(raw, |m| m.min(raw)));
        self.max = Some(self.max.map_or(raw, |m| m.max(raw)));
        let x = f64::from(raw);
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        let delta = x - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (x - self.mean);
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Sample standard deviation; `None` below two samples.
    #[allow(clippy::cast_precision_loss)]
    pub fn stddev(&self) -> Option<f64> {
        (self.count > 1).then(|| (self.m2 / (self.count - 1) as f64).sqrt())
    }
}

pub struct SensorAdapter {
    load_cell: Box<dyn LoadCell + Send>,
    thermometer: Option<Box<dyn Thermometer + Send>>,
    timeout: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
    stats: RawStats,
    errors: u64,
    thermometer_ok: bool,
}

impl SensorAdapter {
    pub fn new(
        load_cell: Box<dyn LoadCell + Send>,
        thermometer: Option<Box<dyn Thermometer + Send>>,
        timeout: Duration,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            load_cell,
            thermometer,
            timeout,
            clock,
            stats: RawStats::default(),
            errors: 0,
            thermometer_ok: true,
        }
    }

    /// Read one conversion. Bus failures come back as typed errors, never as a stale value.
    pub fn poll(&mut self) -> Result<RawSample, KegmonError> {
        match self.load_cell.read(self.timeout) {
            Ok(raw) => {
                self.stats.push(raw);
                Ok(RawSample {
                    timestamp_ms: self.clock.wall_ms(),
                    raw,
                })
            }
            Err(e) => {
                self.errors += 1;
                Err(map_hw_error(&*e))
            }
        }
    }

    pub fn has_thermometer(&self) -> bool {
        self.thermometer.is_some()
    }

    /// Latest temperature, or `None` when no probe is fitted or the probe failed.
    /// Logs only on ok/failed transitions.
    pub fn temperature(&mut self) -> Option<f32> {
        let probe = self.thermometer.as_mut()?;
        match probe.read_celsius() {
            Ok(t) if t.is_finite() => {
                if !self.thermometer_ok {
                    tracing::info!(celsius = t, "thermometer recovered");
                    self.thermometer_ok = true;
                }
                Some(t)
            }
            Ok(t) => {
                self.note_thermometer_fault(&format!("non-finite reading {t}"));
                None
            }
            Err(e) => {
                self.note_thermometer_fault(&e.to_string());
                None
            }
        }
    }

    fn note_thermometer_fault(&mut self, msg: &str) {
        if self.thermometer_ok {
            tracing::warn!(error = msg, "thermometer unavailable; compensation skipped");
            self.thermometer_ok = false;
        }
    }

    pub fn raw_stats(&self) -> &RawStats {
        &self.stats
    }

    pub fn error_count(&self) -> u64 {
        self.errors
    }
}
