//! Sensor assembly: GPIO/1-Wire devices with `--features hardware`, simulated ones otherwise.
//!
//! The simulated backend reads its knobs from the environment so the binary can
//! be driven end to end without a scale:
//! `KEGMON_SIM_RAW` (initial raw counts), `KEGMON_SIM_STEP` (counts added per read),
//! `KEGMON_SIM_JITTER`, `KEGMON_SIM_TIMEOUT=1` (every read times out),
//! `KEGMON_SIM_TEMP_C` (attach a probe) and `KEGMON_SIM_LOADED_RAW` (raw counts
//! once the operator confirms the reference weight is on the scale).

use eyre::WrapErr;
use kegmon_config::Config;
use kegmon_traits::{LoadCell, Thermometer};

pub struct Backend {
    pub load_cell: Box<dyn LoadCell + Send>,
    pub thermometer: Option<Box<dyn Thermometer + Send>>,
    /// Called after the operator places the reference weight during calibration.
    pub on_weight_placed: Option<Box<dyn Fn()>>,
}

#[cfg(feature = "hardware")]
pub fn make_backend(cfg: &Config) -> eyre::Result<Backend> {
    let load_cell = kegmon_hardware::hardware::HardwareLoadCell::try_new(
        cfg.pins.hx711_dt,
        cfg.pins.hx711_sck,
    )
    .wrap_err("open hx711")?;
    let thermometer = cfg.pins.w1_thermometer.as_deref().map(|id| {
        tracing::info!(device = id, "using DS18B20 probe");
        Box::new(kegmon_hardware::Ds18b20::new(id)) as Box<dyn Thermometer + Send>
    });
    Ok(Backend {
        load_cell: Box::new(load_cell),
        thermometer,
        on_weight_placed: None,
    })
}

#[cfg(not(feature = "hardware"))]
pub fn make_backend(_cfg: &Config) -> eyre::Result<Backend> {
    use kegmon_hardware::{SimulatedLoadCell, SimulatedThermometer};

    let raw = env_parse::<i32>("KEGMON_SIM_RAW")?.unwrap_or(0);
    let cell = SimulatedLoadCell::new(raw);
    let handle = cell.handle();
    if let Some(step) = env_parse::<i32>("KEGMON_SIM_STEP")? {
        handle.set_step(step);
    }
    if let Some(jitter) = env_parse::<i32>("KEGMON_SIM_JITTER")? {
        handle.set_jitter(jitter);
    }
    if env_parse::<u8>("KEGMON_SIM_TIMEOUT")?.is_some_and(|v| v != 0) {
        handle.fail_next(u32::MAX);
    }
    let thermometer = env_parse::<f32>("KEGMON_SIM_TEMP_C")?
        .map(|c| Box::new(SimulatedThermometer::new(c)) as Box<dyn Thermometer + Send>);
    let on_weight_placed = env_parse::<i32>("KEGMON_SIM_LOADED_RAW")?.map(|loaded| {
        Box::new(move || handle.set_raw(loaded)) as Box<dyn Fn()>
    });
    tracing::info!(raw, "using simulated load cell");
    Ok(Backend {
        load_cell: Box::new(cell),
        thermometer,
        on_weight_placed,
    })
}

#[cfg(not(feature = "hardware"))]
fn env_parse<T>(key: &str) -> eyre::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .wrap_err_with(|| format!("invalid {key}={v}")),
        Err(_) => Ok(None),
    }
}
