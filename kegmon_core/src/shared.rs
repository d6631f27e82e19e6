//! Read side of the monitor: one writer (the pipeline), any number of readers.
//!
//! All fields readers care about sit behind a single `RwLock`, so a snapshot is
//! always internally consistent: the latest reading, status and statistics come
//! from the same tick.

use std::ops::RangeInclusive;
use std::sync::{Arc, PoisonError, RwLock};

use crate::calibration::CalibrationParameters;
use crate::history::{History, HistoryEntry, UsageStats};
use crate::status::DeviceStatus;
use crate::types::{FilteredEstimate, LevelReading, PourEvent};

#[derive(Debug, Clone)]
pub struct View {
    pub history: History,
    pub status: DeviceStatus,
    pub calibration: Option<CalibrationParameters>,
    pub estimate: Option<FilteredEstimate>,
    pub pour_state: &'static str,
    pub pouring_volume_l: f32,
}

/// Owned copy of the view, detached from the lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub latest: Option<LevelReading>,
    pub status: DeviceStatus,
    pub calibration: Option<CalibrationParameters>,
    pub estimate: Option<FilteredEstimate>,
    pub stats: UsageStats,
    pub recent_pours: Vec<PourEvent>,
    pub pour_state: &'static str,
    pub pouring_volume_l: f32,
    pub history_len: usize,
}

impl Snapshot {
    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SharedView {
    inner: Arc<RwLock<View>>,
}

impl SharedView {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(View {
                history: History::new(history_capacity),
                status: DeviceStatus::Starting,
                calibration: None,
                estimate: None,
                pour_state: "idle",
                pouring_volume_l: 0.0,
            })),
        }
    }

    /// Mutate under the write lock. A panicked writer leaves the last consistent
    /// state in place, so poisoning is not treated as fatal.
    pub fn update<R>(&self, f: impl FnOnce(&mut View) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn read<R>(&self, f: impl FnOnce(&View) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn snapshot(&self, recent_pours: usize) -> Snapshot {
        self.read(|v| Snapshot {
            latest: v.history.latest().copied(),
            status: v.status.clone(),
            calibration: v.calibration.clone(),
            estimate: v.estimate,
            stats: v.history.stats().clone(),
            recent_pours: v.history.recent_pours(recent_pours),
            pour_state: v.pour_state,
            pouring_volume_l: v.pouring_volume_l,
            history_len: v.history.len(),
        })
    }

    pub fn latest(&self) -> Option<LevelReading> {
        self.read(|v| v.history.latest().copied())
    }

    pub fn status(&self) -> DeviceStatus {
        self.read(|v| v.status.clone())
    }

    pub fn query(&self, range: RangeInclusive<u64>) -> Vec<HistoryEntry> {
        self.read(|v| v.history.query(range))
    }
}
