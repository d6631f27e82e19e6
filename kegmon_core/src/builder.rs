//! Type-state builder for [`Pipeline`].
//!
//! The builder enforces at compile time that a load cell is provided before
//! `build()` is available. `try_build()` is always available for dynamic checks.

use std::marker::PhantomData;
use std::sync::Arc;

use kegmon_traits::clock::{Clock, MonotonicClock};
use kegmon_traits::{LoadCell, Thermometer};

use crate::calibration::{CalibrationModel, CalibrationParameters};
use crate::compensation::{CompensationCurve, TemperatureCompensator};
use crate::config::*;
use crate::error::{BuildError, Result};
use crate::filter::NoiseFilter;
use crate::level::LevelEstimator;
use crate::outbound::OutboundQueue;
use crate::pipeline::Pipeline;
use crate::pour::PourDetector;
use crate::sensor::SensorAdapter;
use crate::shared::SharedView;
use crate::status::DeviceStatus;

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for [`Pipeline`]. All fields are validated on `build()`.
pub struct PipelineBuilder<L> {
    load_cell: Option<Box<dyn LoadCell + Send>>,
    thermometer: Option<Box<dyn Thermometer + Send>>,
    filter: Option<FilterCfg>,
    plausibility: Option<PlausibilityCfg>,
    keg: Option<KegCfg>,
    pour: Option<PourCfg>,
    history: Option<HistoryCfg>,
    fault: Option<FaultCfg>,
    timeouts: Option<Timeouts>,
    calibration: Option<CalibrationParameters>,
    compensation: Option<CompensationCurve>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    _l: PhantomData<L>,
}

impl Default for PipelineBuilder<Missing> {
    fn default() -> Self {
        Self {
            load_cell: None,
            thermometer: None,
            filter: None,
            plausibility: None,
            keg: None,
            pour: None,
            history: None,
            fault: None,
            timeouts: None,
            calibration: None,
            compensation: None,
            clock: None,
            _l: PhantomData,
        }
    }
}

fn invalid(msg: &'static str) -> eyre::Report {
    eyre::Report::new(BuildError::InvalidConfig(msg))
}

fn validate(
    filter: &FilterCfg,
    plausibility: &PlausibilityCfg,
    keg: &KegCfg,
    pour: &PourCfg,
    history: &HistoryCfg,
    fault: &FaultCfg,
    timeouts: &Timeouts,
) -> Result<()> {
    if !(filter.process_noise.is_finite() && filter.process_noise > 0.0) {
        return Err(invalid("process_noise must be > 0"));
    }
    if !(filter.measurement_noise.is_finite() && filter.measurement_noise > 0.0) {
        return Err(invalid("measurement_noise must be > 0"));
    }
    if !(filter.initial_uncertainty.is_finite() && filter.initial_uncertainty > 0.0) {
        return Err(invalid("initial_uncertainty must be > 0"));
    }
    if !(filter.min_uncertainty.is_finite() && filter.min_uncertainty > 0.0) {
        return Err(invalid("min_uncertainty must be > 0"));
    }
    if !(plausibility.min_weight_kg.is_finite()
        && plausibility.max_weight_kg.is_finite()
        && plausibility.min_weight_kg < plausibility.max_weight_kg)
    {
        return Err(invalid("min_weight_kg must be below max_weight_kg"));
    }
    if !(keg.capacity_l.is_finite() && keg.capacity_l > 0.0) {
        return Err(invalid("capacity_l must be > 0"));
    }
    if !(keg.density_kg_per_l.is_finite() && keg.density_kg_per_l > 0.0) {
        return Err(invalid("density_kg_per_l must be > 0"));
    }
    if !(keg.empty_weight_kg.is_finite() && keg.empty_weight_kg >= 0.0) {
        return Err(invalid("empty_weight_kg must be >= 0"));
    }
    if !(keg.glass_volume_l.is_finite() && keg.glass_volume_l > 0.0) {
        return Err(invalid("glass_volume_l must be > 0"));
    }
    if !(pour.noise_threshold_l.is_finite() && pour.noise_threshold_l >= 0.0) {
        return Err(invalid("noise_threshold_l must be >= 0"));
    }
    if !(pour.min_pour_l.is_finite() && pour.min_pour_l >= 0.0) {
        return Err(invalid("min_pour_l must be >= 0"));
    }
    if !(pour.absent_weight_kg.is_finite() && pour.absent_weight_kg >= 0.0) {
        return Err(invalid("absent_weight_kg must be >= 0"));
    }
    if history.capacity == 0 {
        return Err(invalid("history capacity must be >= 1"));
    }
    if history.outbound_capacity == 0 {
        return Err(invalid("outbound_capacity must be >= 1"));
    }
    if fault.max_stale_ms == 0 {
        return Err(invalid("max_stale_ms must be >= 1"));
    }
    if timeouts.sensor.is_zero() {
        return Err(invalid("sensor timeout must be > 0"));
    }
    Ok(())
}

impl<L> PipelineBuilder<L> {
    /// Fallible build available in any type-state; returns detailed error for missing pieces.
    pub fn try_build(self) -> Result<Pipeline> {
        let load_cell = self
            .load_cell
            .ok_or_else(|| eyre::Report::new(BuildError::MissingLoadCell))?;
        let filter = self.filter.unwrap_or_default();
        let plausibility = self.plausibility.unwrap_or_default();
        let keg = self.keg.unwrap_or_default();
        let pour = self.pour.unwrap_or_default();
        let history = self.history.unwrap_or_default();
        let fault = self.fault.unwrap_or_default();
        let timeouts = self.timeouts.unwrap_or_default();
        validate(
            &filter,
            &plausibility,
            &keg,
            &pour,
            &history,
            &fault,
            &timeouts,
        )?;

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };

        let calibration = CalibrationModel::new(self.calibration);
        let mut noise_filter = NoiseFilter::new(filter);
        noise_filter.set_plausible_range(calibration.parameters().map(|p| {
            (
                p.raw_for(f64::from(plausibility.min_weight_kg)),
                p.raw_for(f64::from(plausibility.max_weight_kg)),
            )
        }));

        let view = SharedView::new(history.capacity);
        let calibration_params = calibration.parameters().cloned();
        view.update(|v| v.calibration = calibration_params);

        let last_ok_ms = clock.wall_ms();
        Ok(Pipeline {
            sensor: SensorAdapter::new(load_cell, self.thermometer, timeouts.sensor, clock.clone()),
            filter: noise_filter,
            calibration,
            compensator: TemperatureCompensator::new(self.compensation),
            estimator: LevelEstimator::new(keg),
            detector: PourDetector::new(pour),
            plausibility,
            history,
            fault,
            clock,
            view,
            outbound: OutboundQueue::new(history.outbound_capacity),
            last_ok_ms,
            last_good: None,
            last_recorded_ms: None,
            status: DeviceStatus::Starting,
            dirty: false,
        })
    }
}

/// Chainable setters that do not affect type-state.
impl<L> PipelineBuilder<L> {
    pub fn with_thermometer(mut self, thermometer: impl Thermometer + Send + 'static) -> Self {
        self.thermometer = Some(Box::new(thermometer));
        self
    }
    pub fn with_filter(mut self, filter: FilterCfg) -> Self {
        self.filter = Some(filter);
        self
    }
    pub fn with_plausibility(mut self, plausibility: PlausibilityCfg) -> Self {
        self.plausibility = Some(plausibility);
        self
    }
    pub fn with_keg(mut self, keg: KegCfg) -> Self {
        self.keg = Some(keg);
        self
    }
    pub fn with_pour(mut self, pour: PourCfg) -> Self {
        self.pour = Some(pour);
        self
    }
    pub fn with_history(mut self, history: HistoryCfg) -> Self {
        self.history = Some(history);
        self
    }
    pub fn with_fault(mut self, fault: FaultCfg) -> Self {
        self.fault = Some(fault);
        self
    }
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
    /// Start calibrated. Without this the pipeline fails closed until a calibration arrives.
    pub fn with_calibration(mut self, calibration: CalibrationParameters) -> Self {
        self.calibration = Some(calibration);
        self
    }
    pub fn with_compensation(mut self, curve: CompensationCurve) -> Self {
        self.compensation = Some(curve);
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }
}

// Setter that advances type-state
impl PipelineBuilder<Missing> {
    pub fn with_load_cell(
        self,
        load_cell: impl LoadCell + Send + 'static,
    ) -> PipelineBuilder<Set> {
        PipelineBuilder {
            load_cell: Some(Box::new(load_cell)),
            thermometer: self.thermometer,
            filter: self.filter,
            plausibility: self.plausibility,
            keg: self.keg,
            pour: self.pour,
            history: self.history,
            fault: self.fault,
            timeouts: self.timeouts,
            calibration: self.calibration,
            compensation: self.compensation,
            clock: self.clock,
            _l: PhantomData,
        }
    }
}

impl PipelineBuilder<Set> {
    /// Validate and build. Only available once a load cell is set.
    pub fn build(self) -> Result<Pipeline> {
        self.try_build()
    }
}
