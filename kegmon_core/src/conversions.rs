//! Conversions between `kegmon_config` schemas (TOML, state file) and runtime types.

use std::collections::VecDeque;
use std::time::Duration;

use crate::calibration::{CalibrationParameters, CalibrationPoint};
use crate::compensation::CompensationCurve;
use crate::config::{FaultCfg, FilterCfg, HistoryCfg, KegCfg, PlausibilityCfg, PourCfg, Timeouts};
use crate::error::KegmonError;
use crate::history::{DayBucket, USAGE_DAYS, UsageStats};
use crate::types::LevelReading;

// ── Pipeline configuration ───────────────────────────────────────────────────

impl From<&kegmon_config::FilterCfg> for FilterCfg {
    fn from(c: &kegmon_config::FilterCfg) -> Self {
        Self {
            process_noise: c.process_noise,
            measurement_noise: c.measurement_noise,
            initial_uncertainty: c.initial_uncertainty,
            min_uncertainty: c.min_uncertainty,
        }
    }
}

impl From<&kegmon_config::FilterCfg> for PlausibilityCfg {
    fn from(c: &kegmon_config::FilterCfg) -> Self {
        Self {
            min_weight_kg: c.min_weight_kg,
            max_weight_kg: c.max_weight_kg,
        }
    }
}

impl From<&kegmon_config::KegCfg> for KegCfg {
    fn from(c: &kegmon_config::KegCfg) -> Self {
        Self {
            empty_weight_kg: c.empty_weight_kg,
            capacity_l: c.capacity_l,
            density_kg_per_l: c.density_kg_per_l,
            glass_volume_l: c.glass_volume_l,
        }
    }
}

impl From<&kegmon_config::PourCfg> for PourCfg {
    fn from(c: &kegmon_config::PourCfg) -> Self {
        Self {
            noise_threshold_l: c.noise_threshold_l,
            settle_ms: c.settle_ms,
            min_pour_l: c.min_pour_l,
            confirm_samples: c.confirm_samples,
            absent_weight_kg: c.absent_weight_kg,
        }
    }
}

impl From<&kegmon_config::HistoryCfg> for HistoryCfg {
    fn from(c: &kegmon_config::HistoryCfg) -> Self {
        Self {
            capacity: c.capacity,
            level_interval_ms: c.level_interval_ms,
            outbound_capacity: c.outbound_capacity,
        }
    }
}

impl From<&kegmon_config::FaultCfg> for FaultCfg {
    fn from(c: &kegmon_config::FaultCfg) -> Self {
        Self {
            max_stale_ms: c.max_stale_ms,
        }
    }
}

impl From<&kegmon_config::Hardware> for Timeouts {
    fn from(c: &kegmon_config::Hardware) -> Self {
        Self {
            sensor: Duration::from_millis(c.sensor_read_timeout_ms),
        }
    }
}

impl TryFrom<&kegmon_config::TemperatureCfg> for CompensationCurve {
    type Error = KegmonError;

    fn try_from(c: &kegmon_config::TemperatureCfg) -> Result<Self, Self::Error> {
        Self::new(c.reference_c, c.coefficients.clone())
    }
}

// ── Calibration ──────────────────────────────────────────────────────────────

impl TryFrom<&kegmon_config::PersistedCalibration> for CalibrationParameters {
    type Error = KegmonError;

    fn try_from(c: &kegmon_config::PersistedCalibration) -> Result<Self, Self::Error> {
        let points = c
            .points
            .iter()
            .map(|r| CalibrationPoint { raw: r.raw, kg: r.kg })
            .collect();
        Self::with_points(c.tare_offset, c.scale_factor, points)
    }
}

impl From<&CalibrationParameters> for kegmon_config::PersistedCalibration {
    fn from(p: &CalibrationParameters) -> Self {
        Self {
            tare_offset: p.tare_offset(),
            scale_factor: p.scale_factor(),
            points: p
                .points()
                .iter()
                .map(|pt| kegmon_config::CalibrationRow { raw: pt.raw, kg: pt.kg })
                .collect(),
        }
    }
}

// ── Persisted state ──────────────────────────────────────────────────────────

impl From<&LevelReading> for kegmon_config::PersistedReading {
    fn from(r: &LevelReading) -> Self {
        Self {
            timestamp_ms: r.timestamp_ms,
            weight_kg: r.weight_kg,
            volume_l: r.volume_l,
            level_percent: r.level_percent,
        }
    }
}

impl From<&UsageStats> for kegmon_config::PersistedStats {
    fn from(s: &UsageStats) -> Self {
        Self {
            pour_count: s.pour_count,
            invalid_pours: s.invalid_pours,
            total_volume_l: s.total_volume_l,
            min_pour_l: s.min_pour_l,
            max_pour_l: s.max_pour_l,
            last_pour_ms: s.last_pour_ms,
            keg_replacements: s.keg_replacements,
            last_replacement_ms: s.last_replacement_ms,
            daily: s
                .daily
                .iter()
                .map(|b| kegmon_config::DailyUsage {
                    day: b.day,
                    volume_l: b.volume_l,
                })
                .collect(),
        }
    }
}

impl From<&kegmon_config::PersistedStats> for UsageStats {
    fn from(s: &kegmon_config::PersistedStats) -> Self {
        let mut daily: Vec<DayBucket> = s
            .daily
            .iter()
            .filter(|d| d.volume_l.is_finite())
            .map(|d| DayBucket {
                day: d.day,
                volume_l: d.volume_l,
            })
            .collect();
        daily.sort_by_key(|b| b.day);
        daily.dedup_by(|b, a| {
            if a.day == b.day {
                a.volume_l += b.volume_l;
                true
            } else {
                false
            }
        });
        let skip = daily.len().saturating_sub(USAGE_DAYS);
        Self {
            pour_count: s.pour_count,
            invalid_pours: s.invalid_pours,
            total_volume_l: s.total_volume_l,
            min_pour_l: s.min_pour_l,
            max_pour_l: s.max_pour_l,
            last_pour_ms: s.last_pour_ms,
            keg_replacements: s.keg_replacements,
            last_replacement_ms: s.last_replacement_ms,
            daily: daily.into_iter().skip(skip).collect::<VecDeque<_>>(),
        }
    }
}
