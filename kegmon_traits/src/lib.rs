pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Load-cell amplifier delivering signed raw counts (e.g. a 24-bit HX711 channel).
pub trait LoadCell {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Ambient or keg temperature probe.
pub trait Thermometer {
    fn read_celsius(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: LoadCell + ?Sized> LoadCell for Box<T> {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(timeout)
    }
}

impl<T: Thermometer + ?Sized> Thermometer for Box<T> {
    fn read_celsius(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_celsius()
    }
}
