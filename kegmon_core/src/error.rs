use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KegmonError {
    /// Transient bus or driver failure; the tick is dropped.
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("implausible raw sample {raw}")]
    Implausible { raw: i32 },
    /// No calibration is active; weight and level are not produced.
    #[error("scale is not calibrated")]
    CalibrationMissing,
    /// Tare/calibrate was requested before the filter has seen a sample.
    #[error("no sensor estimate available yet")]
    NoEstimate,
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    /// Sensor has been failing for longer than the staleness limit.
    #[error("pipeline fault: {0}")]
    PipelineFault(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("monitor is not running")]
    Stopped,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing load cell")]
    MissingLoadCell,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
