//! Human-readable error descriptions and structured JSON error formatting.

use kegmon_core::error::{BuildError, KegmonError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLoadCell => {
                "What happened: No load cell was provided to the monitor.\nLikely causes: The HX711 failed to initialize or was not wired into the builder.\nHow to fix: Ensure the load cell is created successfully and passed via with_load_cell(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See etc/kegmon.toml for a sample."
            ),
        };
    }

    if let Some(ke) = err.downcast_ref::<KegmonError>() {
        return match ke {
            KegmonError::Timeout => "What happened: Load cell read timed out.\nLikely causes: HX711 not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify DT/SCK pins and power, and consider increasing hardware.sensor_read_timeout_ms in the config.".to_string(),
            KegmonError::SensorRead(detail) => format!(
                "What happened: Load cell read failed ({detail}).\nLikely causes: Loose wiring or a failing amplifier board.\nHow to fix: Check the HX711 connections and run `kegmon self-check`."
            ),
            KegmonError::CalibrationMissing => "What happened: The scale is not calibrated.\nLikely causes: No saved state, no [calibration] table and no calibration CSV.\nHow to fix: Run `kegmon calibrate --kg <weight>` with a known reference weight.".to_string(),
            KegmonError::NoEstimate => "What happened: No stable reading was available for the capture.\nLikely causes: Every sample during the capture failed or was rejected.\nHow to fix: Check the load cell, then retry.".to_string(),
            KegmonError::Config(detail) => format!(
                "What happened: Configuration is invalid or incomplete ({detail}).\nLikely causes: Missing [pins] (hx711_dt, hx711_sck) or out-of-range values.\nHow to fix: Edit the TOML config and try again. See etc/kegmon.toml for a sample."
            ),
            KegmonError::InvalidCalibration(detail) => format!(
                "What happened: Calibration rejected ({detail}).\nLikely causes: Reference weight too small, scale not emptied before tare, or points out of order.\nHow to fix: Empty the scale, use a heavier reference weight and calibrate again."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open hx711") || lower.contains("open gpio") {
        return "What happened: Failed to initialize hardware pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Point --config at a readable TOML file. Original: {msg}"
        );
    }

    // Calibration CSV header special-case
    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'raw,kg'.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 for sensor faults, 4 for calibration problems,
/// 5 for configuration errors, 1 for everything else. Clap uses 2 for usage errors.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 5;
    }
    match err.downcast_ref::<KegmonError>() {
        Some(
            KegmonError::Timeout
            | KegmonError::SensorRead(_)
            | KegmonError::Implausible { .. }
            | KegmonError::PipelineFault(_)
            | KegmonError::NoEstimate,
        ) => 3,
        Some(KegmonError::CalibrationMissing | KegmonError::InvalidCalibration(_)) => 4,
        Some(KegmonError::Config(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingLoadCell => "MissingLoadCell",
            BuildError::InvalidConfig(_) => "InvalidConfig",
        };
    }
    match err.downcast_ref::<KegmonError>() {
        Some(KegmonError::Timeout) => "Timeout",
        Some(KegmonError::SensorRead(_)) => "SensorRead",
        Some(KegmonError::Implausible { .. }) => "Implausible",
        Some(KegmonError::CalibrationMissing) => "CalibrationMissing",
        Some(KegmonError::NoEstimate) => "NoEstimate",
        Some(KegmonError::InvalidCalibration(_)) => "InvalidCalibration",
        Some(KegmonError::PipelineFault(_)) => "PipelineFault",
        Some(KegmonError::Config(_)) => "Config",
        Some(KegmonError::Stopped) => "Stopped",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    json!({
        "type": "error",
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
