//! Values flowing between pipeline stages.

/// One load-cell conversion as delivered by the sensor adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSample {
    pub timestamp_ms: u64,
    pub raw: i32,
}

/// Smoothed raw value with its error variance (counts squared).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredEstimate {
    pub timestamp_ms: u64,
    pub value: f64,
    pub uncertainty: f64,
}

/// Where the computed volume fell before clamping to `[0, capacity]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeFlag {
    #[default]
    InRange,
    /// Lighter than an empty keg; usually the keg was lifted off the scale.
    BelowEmpty,
    AboveCapacity,
}

impl RangeFlag {
    pub fn is_in_range(self) -> bool {
        matches!(self, Self::InRange)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InRange => "in_range",
            Self::BelowEmpty => "below_empty",
            Self::AboveCapacity => "above_capacity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompensationStatus {
    Applied,
    /// No curve configured; the weight is used as measured.
    #[default]
    NotConfigured,
    /// A curve is configured but the probe gave no usable reading.
    TemperatureUnavailable,
}

impl CompensationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::NotConfigured => "not_configured",
            Self::TemperatureUnavailable => "temperature_unavailable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    pub timestamp_ms: u64,
    /// Compensated gross weight on the scale, keg included.
    pub weight_kg: f32,
    /// Liquid volume, clamped to `[0, capacity]`.
    pub volume_l: f32,
    pub level_percent: f32,
    pub glasses: f32,
    pub range: RangeFlag,
    pub compensation: CompensationStatus,
}

impl LevelReading {
    /// True when the value should be shown with a caveat.
    pub fn reduced_confidence(&self) -> bool {
        !self.range.is_in_range()
            || matches!(self.compensation, CompensationStatus::TemperatureUnavailable)
    }
}

/// A completed pour. `valid` is false when the keg left the scale mid-pour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PourEvent {
    pub start_ms: u64,
    pub end_ms: u64,
    pub start_level_l: f32,
    pub end_level_l: f32,
    pub volume_l: f32,
    pub valid: bool,
}

impl PourEvent {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// The keg left the scale or a different (or refilled) keg went on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KegEvent {
    Removed {
        timestamp_ms: u64,
        /// Level the detector held before the keg was lifted.
        previous_level_l: f32,
    },
    Replaced {
        timestamp_ms: u64,
        /// `None` when the scale was empty before.
        previous_level_l: Option<f32>,
        level_l: f32,
    },
}

impl KegEvent {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Removed { timestamp_ms, .. } | Self::Replaced { timestamp_ms, .. } => {
                *timestamp_ms
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Removed { .. } => "keg_removed",
            Self::Replaced { .. } => "keg_replaced",
        }
    }
}
