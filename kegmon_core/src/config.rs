//! Runtime configuration for the measurement pipeline.
//!
//! Separate from the TOML schema in `kegmon_config`; see `conversions` for the mapping.

use std::time::Duration;

/// Scalar Kalman noise model, in raw counts squared.
#[derive(Debug, Clone)]
pub struct FilterCfg {
    /// Q: how far the true weight may drift between samples.
    pub process_noise: f64,
    /// R: sensor noise variance.
    pub measurement_noise: f64,
    /// P after the first sample.
    pub initial_uncertainty: f64,
    /// Lower bound on P so the filter never stops listening.
    pub min_uncertainty: f64,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            process_noise: 400.0,
            measurement_noise: 40_000.0,
            initial_uncertainty: 1.0e6,
            min_uncertainty: 1.0,
        }
    }
}

/// Physically plausible weight window; raw samples mapping outside it are rejected.
#[derive(Debug, Clone, Copy)]
pub struct PlausibilityCfg {
    pub min_weight_kg: f32,
    pub max_weight_kg: f32,
}

impl Default for PlausibilityCfg {
    fn default() -> Self {
        Self {
            min_weight_kg: -5.0,
            max_weight_kg: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KegCfg {
    pub empty_weight_kg: f32,
    pub capacity_l: f32,
    pub density_kg_per_l: f32,
    pub glass_volume_l: f32,
}

impl Default for KegCfg {
    fn default() -> Self {
        Self {
            empty_weight_kg: 4.0,
            capacity_l: 19.0,
            density_kg_per_l: 1.0,
            glass_volume_l: 0.40,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PourCfg {
    pub noise_threshold_l: f32,
    pub settle_ms: u64,
    pub min_pour_l: f32,
    pub confirm_samples: u32,
    /// Gross weight below which the scale is treated as having no keg on it.
    pub absent_weight_kg: f32,
}

impl Default for PourCfg {
    fn default() -> Self {
        Self {
            noise_threshold_l: 0.05,
            settle_ms: 3_000,
            min_pour_l: 0.10,
            confirm_samples: 2,
            absent_weight_kg: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HistoryCfg {
    pub capacity: usize,
    pub level_interval_ms: u64,
    pub outbound_capacity: usize,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            capacity: 1_024,
            level_interval_ms: 60_000,
            outbound_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FaultCfg {
    pub max_stale_ms: u64,
}

impl Default for FaultCfg {
    fn default() -> Self {
        Self {
            max_stale_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Upper bound on one load-cell read; bounds the tick duration.
    pub sensor: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            sensor: Duration::from_millis(150),
        }
    }
}
