#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Keg level measurement pipeline (hardware-agnostic).
//!
//! All hardware interactions go through `kegmon_traits::LoadCell` and
//! `kegmon_traits::Thermometer`; time comes from `kegmon_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Sensor**: typed raw samples and read statistics (`sensor`)
//! - **Filtering**: scalar Kalman filter with a plausibility window (`filter`)
//! - **Calibration**: linear or piecewise raw→kg, fail-closed (`calibration`)
//! - **Compensation**: temperature correction polynomial (`compensation`)
//! - **Level**: kg → litres, percent and glasses with range flags (`level`)
//! - **Pours**: drain/settle state machine emitting `PourEvent`s and keg swaps (`pour`)
//! - **History**: bounded time-ordered log plus usage statistics (`history`)
//! - **Publishing**: `SharedView` for readers, `OutboundQueue` for publishers
//!
//! `Pipeline::tick` runs one pass through all stages; `Monitor` drives it on a
//! background thread and handles commands and persistence.

pub mod builder;
pub mod calibration;
pub mod compensation;
pub mod config;
pub mod conversions;
pub mod error;
pub mod filter;
pub mod history;
pub mod hw_error;
pub mod level;
pub mod mocks;
pub mod monitor;
pub mod outbound;
pub mod pipeline;
pub mod pour;
pub mod sensor;
pub mod shared;
pub mod status;
pub mod types;
pub mod util;

pub use builder::{Missing, PipelineBuilder, Set};
pub use calibration::{CalibrationModel, CalibrationParameters, CalibrationPoint};
pub use compensation::{CompensationCurve, TemperatureCompensator};
pub use config::{FaultCfg, FilterCfg, HistoryCfg, KegCfg, PlausibilityCfg, PourCfg, Timeouts};
pub use error::{BuildError, KegmonError, Report, Result};
pub use filter::NoiseFilter;
pub use history::{History, HistoryEntry, UsageStats};
pub use level::LevelEstimator;
pub use monitor::Monitor;
pub use outbound::{OutboundMessage, OutboundQueue};
pub use pipeline::{Command, CommandReply, Pipeline};
pub use pour::{DetectorEvent, PourDetector, PourState};
pub use shared::{SharedView, Snapshot};
pub use status::{DeviceStatus, TickOutcome};
pub use types::{
    CompensationStatus, FilteredEstimate, KegEvent, LevelReading, PourEvent, RangeFlag,
    RawSample,
};
