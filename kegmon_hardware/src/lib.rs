pub mod ds18b20;
pub mod error;
#[cfg(feature = "hardware")]
pub mod hx711;
pub mod sim;
pub mod util;

pub use ds18b20::Ds18b20;
pub use sim::{SimLoadCellHandle, SimThermometerHandle, SimulatedLoadCell, SimulatedThermometer};

#[cfg(feature = "hardware")]
pub mod hardware {
    use std::time::Duration;

    use kegmon_traits::LoadCell;
    use rppal::gpio::Gpio;

    use crate::error::{HwError, Result};
    use crate::hx711::Hx711;
    use crate::util::retry_on_timeout;

    /// Channel A, gain 128.
    pub const DEFAULT_GAIN_PULSES: u8 = 25;
    const MAX_RETRIES: u32 = 3;

    /// HX711-backed load cell on Raspberry Pi GPIO.
    pub struct HardwareLoadCell {
        hx711: Hx711,
    }

    impl HardwareLoadCell {
        pub fn try_new(dt_pin: u8, sck_pin: u8) -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))?;
            let dt = gpio
                .get(dt_pin)
                .map_err(|e| HwError::Gpio(format!("open hx711 dt pin {dt_pin}: {e}")))?
                .into_input();
            let sck = gpio
                .get(sck_pin)
                .map_err(|e| HwError::Gpio(format!("open hx711 sck pin {sck_pin}: {e}")))?
                .into_output();
            Ok(Self {
                hx711: Hx711::new(dt, sck, DEFAULT_GAIN_PULSES)?,
            })
        }
    }

    impl LoadCell for HardwareLoadCell {
        fn read(
            &mut self,
            timeout: Duration,
        ) -> std::result::Result<i32, Box<dyn std::error::Error + Send + Sync>> {
            match retry_on_timeout(MAX_RETRIES, || self.hx711.read_with_timeout(timeout)) {
                Ok(raw) => {
                    tracing::debug!(raw, "hx711 sample");
                    Ok(raw)
                }
                Err(e) => {
                    tracing::error!(error = %e, "load cell read error");
                    Err(Box::new(e))
                }
            }
        }
    }
}
