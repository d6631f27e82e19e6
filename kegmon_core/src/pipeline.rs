//! The measurement pipeline: one tick is one pass through every stage.
//!
//! ```text
//! SensorAdapter ─▶ NoiseFilter ─▶ CalibrationModel ─▶ TemperatureCompensator
//!                                                            │
//!   OutboundQueue ◀── SharedView/History ◀── PourDetector ◀── LevelEstimator
//! ```
//!
//! The pipeline owns all mutable stage state; readers only ever see the
//! [`SharedView`] it publishes at the end of a tick.

use std::sync::Arc;

use kegmon_config::{PersistedCalibration, PersistedReading, PersistedState, PersistedStats};
use kegmon_traits::Clock;

use crate::calibration::{CalibrationModel, CalibrationParameters, CalibrationPoint};
use crate::compensation::{CompensationCurve, TemperatureCompensator};
use crate::config::{FaultCfg, HistoryCfg, PlausibilityCfg, PourCfg};
use crate::error::KegmonError;
use crate::filter::NoiseFilter;
use crate::history::{HistoryEntry, UsageStats};
use crate::level::LevelEstimator;
use crate::outbound::{OutboundMessage, OutboundQueue};
use crate::pour::{DetectorEvent, PourDetector};
use crate::sensor::{RawStats, SensorAdapter};
use crate::shared::SharedView;
use crate::status::{DeviceStatus, TickOutcome};
use crate::types::{CompensationStatus, FilteredEstimate, LevelReading};

/// Operator requests handled between ticks.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Capture the current estimate as the empty-scale zero.
    Tare,
    /// Finish a two-point calibration with a known weight on the scale.
    Calibrate { known_kg: f32 },
    CalibratePoints(Vec<CalibrationPoint>),
    SetCalibration(CalibrationParameters),
    ClearCalibration,
    SetCompensation(Option<CompensationCurve>),
    SetPourCfg(PourCfg),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    Tared {
        zero_raw: f64,
        /// Re-zeroed parameters when a calibration was already active.
        recalibrated: Option<CalibrationParameters>,
    },
    Calibrated(CalibrationParameters),
    Cleared,
    Updated,
}

pub struct Pipeline {
    pub(crate) sensor: SensorAdapter,
    pub(crate) filter: NoiseFilter,
    pub(crate) calibration: CalibrationModel,
    pub(crate) compensator: TemperatureCompensator,
    pub(crate) estimator: LevelEstimator,
    pub(crate) detector: PourDetector,
    pub(crate) plausibility: PlausibilityCfg,
    pub(crate) history: HistoryCfg,
    pub(crate) fault: FaultCfg,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) view: SharedView,
    pub(crate) outbound: OutboundQueue,
    /// Wall time of the last sample that made it through the filter.
    pub(crate) last_ok_ms: u64,
    pub(crate) last_good: Option<LevelReading>,
    pub(crate) last_recorded_ms: Option<u64>,
    pub(crate) status: DeviceStatus,
    pub(crate) dirty: bool,
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("status", &self.status.name())
            .field("calibrated", &self.calibration.is_calibrated())
            .field("pour_state", &self.detector.state().name())
            .field("last_ok_ms", &self.last_ok_ms)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> crate::builder::PipelineBuilder<crate::builder::Missing> {
        crate::builder::PipelineBuilder::default()
    }

    /// One pass: read, filter, calibrate, compensate, estimate, detect, publish.
    pub fn tick(&mut self) -> TickOutcome {
        let estimate = match self
            .sensor
            .poll()
            .and_then(|sample| self.filter.update(&sample))
        {
            Ok(e) => e,
            Err(e) => return self.on_sensor_error(e),
        };
        self.on_good_sample();

        let weight_kg = match self.calibration.apply(&estimate) {
            Ok(kg) => kg,
            Err(_) => {
                self.set_status(DeviceStatus::Uncalibrated);
                let status = self.status.clone();
                self.view.update(|v| {
                    v.estimate = Some(estimate);
                    v.status = status;
                });
                return TickOutcome::Uncalibrated { estimate };
            }
        };

        let celsius = if self.compensator.wants_temperature() {
            self.sensor.temperature()
        } else {
            None
        };
        let compensated = self.compensator.compensate(weight_kg, celsius);
        let reading = self.estimator.estimate(
            compensated.weight_kg,
            estimate.timestamp_ms,
            compensated.status,
        );
        self.on_reading(estimate, reading)
    }

    fn on_reading(&mut self, estimate: FilteredEstimate, reading: LevelReading) -> TickOutcome {
        let was_in_range = self.last_good.is_none_or(|r| r.range.is_in_range());
        if was_in_range && !reading.range.is_in_range() {
            tracing::warn!(
                range = reading.range.as_str(),
                weight_kg = reading.weight_kg,
                "reading out of range; level clamped"
            );
        }

        let event = self.detector.update(&reading);
        let pour = event.and_then(DetectorEvent::pour);
        let keg = event.and_then(DetectorEvent::keg);
        self.set_status(DeviceStatus::Ok);
        self.last_good = Some(reading);

        let record_level = self
            .last_recorded_ms
            .is_none_or(|t| reading.timestamp_ms.saturating_sub(t) >= self.history.level_interval_ms);
        if record_level {
            self.last_recorded_ms = Some(reading.timestamp_ms);
        }
        if record_level || event.is_some() {
            self.dirty = true;
        }

        let status = self.status.clone();
        let pour_state = self.detector.state().name();
        let pouring_volume_l = self.detector.pouring_volume_l();
        self.view.update(|v| {
            if record_level {
                v.history.record(HistoryEntry::Level(reading));
            } else {
                v.history.set_latest(reading);
            }
            if let Some(p) = pour {
                v.history.record(HistoryEntry::Pour(p));
            }
            if let Some(k) = keg {
                v.history.record(HistoryEntry::Keg(k));
            }
            v.estimate = Some(estimate);
            v.status = status;
            v.pour_state = pour_state;
            v.pouring_volume_l = pouring_volume_l;
        });

        self.outbound.push(OutboundMessage::Level(reading));
        if let Some(p) = pour {
            self.outbound.push(OutboundMessage::Pour(p));
        }
        if let Some(k) = keg {
            self.outbound.push(OutboundMessage::Keg(k));
        }
        TickOutcome::Reading { reading, pour, keg }
    }

    fn on_good_sample(&mut self) {
        if matches!(self.status, DeviceStatus::Stale { .. } | DeviceStatus::Fault(_)) {
            tracing::info!(
                down_ms = self.clock.wall_ms().saturating_sub(self.last_ok_ms),
                "sensor recovered"
            );
        }
        self.last_ok_ms = self.clock.wall_ms();
    }

    fn on_sensor_error(&mut self, error: KegmonError) -> TickOutcome {
        let stale_for_ms = self.clock.wall_ms().saturating_sub(self.last_ok_ms);
        if stale_for_ms <= self.fault.max_stale_ms {
            if matches!(self.status, DeviceStatus::Stale { .. }) {
                tracing::debug!(error = %error, stale_for_ms, "sensor read failed");
            } else {
                tracing::warn!(error = %error, "sensor read failed; serving last reading");
            }
            self.set_status(DeviceStatus::Stale {
                since_ms: self.last_ok_ms,
                error: error.clone(),
            });
            self.publish_status();
            return TickOutcome::Stale {
                last: self.last_good,
                error,
            };
        }

        let fault =
            KegmonError::PipelineFault(format!("no valid sample for {stale_for_ms} ms: {error}"));
        if !self.status.is_fault() {
            tracing::error!(error = %error, stale_for_ms, "sensor fault; pour detection halted");
            self.detector.halt();
        }
        self.set_status(DeviceStatus::Fault(fault.clone()));
        self.publish_status();
        TickOutcome::Fault(fault)
    }

    /// Store the new status; a change of kind is announced to subscribers.
    fn set_status(&mut self, next: DeviceStatus) {
        if next.name() != self.status.name() {
            tracing::debug!(from = self.status.name(), to = next.name(), "status changed");
            self.outbound.push(OutboundMessage::Status(next.clone()));
        }
        self.status = next;
    }

    fn publish_status(&self) {
        let status = self.status.clone();
        let pour_state = self.detector.state().name();
        self.view.update(|v| {
            v.status = status;
            v.pour_state = pour_state;
            v.pouring_volume_l = 0.0;
        });
    }

    fn publish_calibration(&self) {
        let calibration = self.calibration.parameters().cloned();
        let pour_state = self.detector.state().name();
        self.view.update(|v| {
            v.calibration = calibration;
            v.pour_state = pour_state;
            v.pouring_volume_l = 0.0;
        });
    }

    /// Raw window matching the plausible weight range under the active calibration.
    fn plausible_raw_range(&self) -> Option<(f64, f64)> {
        self.calibration.parameters().map(|p| {
            (
                p.raw_for(f64::from(self.plausibility.min_weight_kg)),
                p.raw_for(f64::from(self.plausibility.max_weight_kg)),
            )
        })
    }

    fn on_calibration_changed(&mut self) {
        self.filter.set_plausible_range(self.plausible_raw_range());
        // Levels under the old calibration are not comparable with the new ones.
        self.detector.reset();
        self.last_recorded_ms = None;
        self.dirty = true;
        self.publish_calibration();
    }

    fn current_estimate(&self) -> Result<FilteredEstimate, KegmonError> {
        self.filter.estimate().ok_or(KegmonError::NoEstimate)
    }

    /// Handle an operator command. A failed command leaves the pipeline unchanged.
    pub fn apply(&mut self, cmd: Command) -> Result<CommandReply, KegmonError> {
        let reply = match cmd {
            Command::Tare => {
                let estimate = self.current_estimate()?;
                let recalibrated = self.calibration.tare(&estimate)?;
                let changed = recalibrated.is_some();
                let reply = CommandReply::Tared {
                    zero_raw: estimate.value,
                    recalibrated,
                };
                if !changed {
                    return Ok(reply);
                }
                reply
            }
            Command::Calibrate { known_kg } => {
                let estimate = self.current_estimate()?;
                CommandReply::Calibrated(self.calibration.calibrate(known_kg, &estimate)?)
            }
            Command::CalibratePoints(points) => {
                CommandReply::Calibrated(self.calibration.calibrate_points(&points)?)
            }
            Command::SetCalibration(params) => {
                self.calibration.set(params.clone());
                CommandReply::Calibrated(params)
            }
            Command::ClearCalibration => {
                self.calibration.clear();
                tracing::warn!("calibration cleared; readings suppressed until recalibrated");
                CommandReply::Cleared
            }
            Command::SetCompensation(curve) => {
                tracing::info!(enabled = curve.is_some(), "temperature compensation updated");
                self.compensator.set_curve(curve);
                return Ok(CommandReply::Updated);
            }
            Command::SetPourCfg(cfg) => {
                self.detector.set_cfg(cfg);
                return Ok(CommandReply::Updated);
            }
        };
        self.on_calibration_changed();
        Ok(reply)
    }

    /// Restart the filter and feed `samples` reads straight through it, without
    /// publishing, then return the settled estimate. Used to average before
    /// tare/calibrate so a load change just before the capture is not smeared in.
    pub fn capture(&mut self, samples: u32) -> Result<FilteredEstimate, KegmonError> {
        self.filter.reset();
        let mut last_err = None;
        for _ in 0..samples.max(1) {
            match self
                .sensor
                .poll()
                .and_then(|sample| self.filter.update(&sample))
            {
                Ok(_) => self.on_good_sample(),
                Err(e) => last_err = Some(e),
            }
        }
        match (self.filter.estimate(), last_err) {
            (Some(e), _) => Ok(e),
            (None, Some(err)) => Err(err),
            (None, None) => Err(KegmonError::NoEstimate),
        }
    }

    /// Everything needed to resume after a restart.
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            last_estimate_raw: self.filter.estimate().map(|e| e.value),
            pour_reference_l: self.detector.reference_l(),
            calibration: self.calibration.parameters().map(PersistedCalibration::from),
            last_reading: self.last_good.as_ref().map(PersistedReading::from),
            stats: Some(self.view.read(|v| PersistedStats::from(v.history.stats()))),
            ..PersistedState::default()
        }
    }

    /// Resume from a snapshot. An unusable calibration is skipped with a warning
    /// and whatever calibration the pipeline was built with stays active.
    pub fn restore(&mut self, state: &PersistedState) {
        if let Some(cal) = &state.calibration {
            match CalibrationParameters::try_from(cal) {
                Ok(params) => self.calibration.set(params),
                Err(e) => tracing::warn!(error = %e, "ignoring persisted calibration"),
            }
        }
        self.filter.set_plausible_range(self.plausible_raw_range());

        let latest = state.last_reading.map(|r| {
            self.estimator
                .estimate(r.weight_kg, r.timestamp_ms, CompensationStatus::NotConfigured)
        });
        if let Some(raw) = state.last_estimate_raw {
            self.filter
                .seed(raw, latest.map_or(0, |r| r.timestamp_ms));
        }
        if let Some(reference_l) = state.pour_reference_l.or(latest.map(|r| r.volume_l)) {
            self.detector.resume(reference_l);
        }
        self.last_good = latest;

        let stats = state
            .stats
            .as_ref()
            .map(UsageStats::from)
            .unwrap_or_default();
        let calibration = self.calibration.parameters().cloned();
        let pour_state = self.detector.state().name();
        tracing::info!(
            calibrated = calibration.is_some(),
            pours = stats.pour_count,
            "state restored"
        );
        self.view.update(|v| {
            v.history.restore(latest, stats);
            v.calibration = calibration;
            v.pour_state = pour_state;
        });
    }

    /// True once since the last call if anything worth persisting changed.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    pub fn outbound(&self) -> &OutboundQueue {
        &self.outbound
    }

    pub fn status(&self) -> &DeviceStatus {
        &self.status
    }

    pub fn calibration(&self) -> Option<&CalibrationParameters> {
        self.calibration.parameters()
    }

    pub fn detector(&self) -> &PourDetector {
        &self.detector
    }

    pub fn estimate(&self) -> Option<FilteredEstimate> {
        self.filter.estimate()
    }

    pub fn raw_stats(&self) -> &RawStats {
        self.sensor.raw_stats()
    }

    pub fn sensor_errors(&self) -> u64 {
        self.sensor.error_count()
    }

    pub fn has_thermometer(&self) -> bool {
        self.sensor.has_thermometer()
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }
}
