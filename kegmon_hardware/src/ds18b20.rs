//! DS18B20 temperature probe read through the Linux `w1-therm` sysfs driver.
//!
//! The driver exposes `/sys/bus/w1/devices/<id>/w1_slave` with two lines:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```

use std::path::{Path, PathBuf};

use kegmon_traits::Thermometer;

use crate::error::{HwError, Result};

pub const W1_DEVICES: &str = "/sys/bus/w1/devices";

/// Raw value the sensor reports before its first conversion completes.
const POWER_ON_RESET_MILLI_C: i32 = 85_000;

pub struct Ds18b20 {
    path: PathBuf,
}

impl Ds18b20 {
    /// Probe with the given 1-Wire id (e.g. `28-0316a279d2ff`) under the default sysfs root.
    pub fn new(device_id: &str) -> Self {
        Self::at_path(Path::new(W1_DEVICES).join(device_id).join("w1_slave"))
    }

    /// Probe reading an explicit `w1_slave` path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn read(&self) -> Result<f32> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HwError::Disconnected,
            _ => HwError::Io(e),
        })?;
        parse_w1_slave(&text)
    }
}

impl Thermometer for Ds18b20 {
    fn read_celsius(&mut self) -> std::result::Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        self.read().map_err(|e| {
            tracing::debug!(path = %self.path.display(), error = %e, "ds18b20 read failed");
            Box::new(e) as Box<dyn std::error::Error + Send + Sync>
        })
    }
}

/// Parse the two-line `w1_slave` payload into degrees Celsius.
#[allow(clippy::cast_possible_truncation)]
pub fn parse_w1_slave(text: &str) -> Result<f32> {
    let mut lines = text.lines();
    let crc_line = lines
        .next()
        .ok_or_else(|| HwError::Parse("empty w1_slave".into()))?;
    if !crc_line.trim_end().ends_with("YES") {
        return Err(HwError::Checksum);
    }
    let data_line = lines
        .next()
        .ok_or_else(|| HwError::Parse("missing temperature line".into()))?;
    let (_, milli) = data_line
        .rsplit_once("t=")
        .ok_or_else(|| HwError::Parse(format!("no t= field in {data_line:?}")))?;
    let milli: i32 = milli
        .trim()
        .parse()
        .map_err(|_| HwError::Parse(format!("bad temperature {milli:?}")))?;
    if milli == POWER_ON_RESET_MILLI_C {
        return Err(HwError::Parse("power-on reset value".into()));
    }
    Ok(f64::from(milli) as f32 / 1000.0)
}
