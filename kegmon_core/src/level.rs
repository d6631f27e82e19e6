//! Weight to volume, fill percentage and glass count.

use crate::config::KegCfg;
use crate::types::{CompensationStatus, LevelReading, RangeFlag};

#[derive(Debug, Clone)]
pub struct LevelEstimator {
    keg: KegCfg,
}

impl LevelEstimator {
    pub fn new(keg: KegCfg) -> Self {
        Self { keg }
    }

    pub fn keg(&self) -> &KegCfg {
        &self.keg
    }

    /// Volume is clamped to `[0, capacity]`; the reading says which side it fell off.
    pub fn estimate(
        &self,
        weight_kg: f32,
        timestamp_ms: u64,
        compensation: CompensationStatus,
    ) -> LevelReading {
        let capacity = self.keg.capacity_l;
        let raw_volume = (weight_kg - self.keg.empty_weight_kg) / self.keg.density_kg_per_l;
        let (volume_l, range) = if !raw_volume.is_finite() || raw_volume < 0.0 {
            (0.0, RangeFlag::BelowEmpty)
        } else if raw_volume > capacity {
            (capacity, RangeFlag::AboveCapacity)
        } else {
            (raw_volume, RangeFlag::InRange)
        };
        LevelReading {
            timestamp_ms,
            weight_kg,
            volume_l,
            level_percent: volume_l / capacity * 100.0,
            glasses: volume_l / self.keg.glass_volume_l,
            range,
            compensation,
        }
    }
}
