#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = kegmon_config::load_toml(data)
        && cfg.validate().is_ok()
        && let Some(cal) = &cfg.sanitize().calibration
    {
        assert!(cal.scale_factor.is_finite() && cal.scale_factor != 0.0);
    }
});
