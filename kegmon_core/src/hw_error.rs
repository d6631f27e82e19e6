//! Maps `Box<dyn Error>` from trait boundaries to typed `KegmonError`.
//!
//! The traits in `kegmon_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `kegmon_hardware::HwError` downcasting.

use crate::error::KegmonError;

/// Map a trait-boundary error to a typed `KegmonError`.
///
/// Known hardware error types are downcast first, then string heuristics apply.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> KegmonError {
    #[cfg(feature = "hardware-errors")]
    {
        use kegmon_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout | HwError::DataReadyTimeout => KegmonError::Timeout,
                other => KegmonError::SensorRead(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        KegmonError::Timeout
    } else {
        KegmonError::SensorRead(s)
    }
}
