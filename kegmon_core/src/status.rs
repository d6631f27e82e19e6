//! Device status and the result of a single pipeline tick.

use crate::error::KegmonError;
use crate::types::{FilteredEstimate, KegEvent, LevelReading, PourEvent};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DeviceStatus {
    /// No tick has completed yet.
    #[default]
    Starting,
    Ok,
    /// Sensor works but no calibration is loaded.
    Uncalibrated,
    /// Sensor failing; the last good reading is still being served.
    Stale { since_ms: u64, error: KegmonError },
    /// Sensor failing beyond the staleness limit; pour detection is halted.
    Fault(KegmonError),
}

impl DeviceStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ok => "ok",
            Self::Uncalibrated => "uncalibrated",
            Self::Stale { .. } => "stale",
            Self::Fault(_) => "fault",
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// What one tick produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Reading {
        reading: LevelReading,
        pour: Option<PourEvent>,
        keg: Option<KegEvent>,
    },
    /// Fail-closed: the filter ran but there is no calibration to turn it into weight.
    Uncalibrated { estimate: FilteredEstimate },
    /// Transient sensor error inside the staleness limit.
    Stale {
        last: Option<LevelReading>,
        error: KegmonError,
    },
    Fault(KegmonError),
}

impl TickOutcome {
    pub fn reading(&self) -> Option<&LevelReading> {
        match self {
            Self::Reading { reading, .. } => Some(reading),
            Self::Stale { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    pub fn pour(&self) -> Option<&PourEvent> {
        match self {
            Self::Reading { pour, .. } => pour.as_ref(),
            _ => None,
        }
    }

    pub fn keg(&self) -> Option<&KegEvent> {
        match self {
            Self::Reading { keg, .. } => keg.as_ref(),
            _ => None,
        }
    }
}
