//! Command implementations: config mapping, pipeline assembly and the run loop.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel as xch;
use eyre::{Report, WrapErr, eyre};
use kegmon_config::{
    CalibrationFit, Config, PersistedCalibration, PersistedState, load_state, save_state,
};
use kegmon_core::{
    CalibrationParameters, Command, CommandReply, CompensationCurve, KegmonError, Monitor,
    Pipeline,
};
use kegmon_traits::LoadCell;
use serde_json::json;

use crate::backend::{Backend, make_backend};
use crate::render::{print_message, print_summary};

/// Recent pours kept in summaries.
const SUMMARY_POURS: usize = 5;

/// Inputs shared by every subcommand.
pub struct Context {
    pub cfg: Config,
    pub csv_calibration: Option<PersistedCalibration>,
    pub state_path: Option<PathBuf>,
    pub json: bool,
}

impl Context {
    pub fn new(
        cfg: Config,
        csv_calibration: Option<PersistedCalibration>,
        state_override: Option<PathBuf>,
        json: bool,
    ) -> Self {
        let state_path = state_override.or_else(|| cfg.storage.state_file.as_ref().map(PathBuf::from));
        Self {
            cfg,
            csv_calibration,
            state_path,
            json,
        }
    }
}

/// Build the pipeline from config. Calibration priority: persisted state,
/// then `[calibration]` in the config, then the CSV file.
pub fn assemble(ctx: &Context, backend: Backend) -> eyre::Result<Pipeline> {
    let cfg = &ctx.cfg;
    let mut builder = Pipeline::builder()
        .with_load_cell(backend.load_cell)
        .with_filter((&cfg.filter).into())
        .with_plausibility((&cfg.filter).into())
        .with_keg((&cfg.keg).into())
        .with_pour((&cfg.pour).into())
        .with_history((&cfg.history).into())
        .with_fault((&cfg.fault).into())
        .with_timeouts((&cfg.hardware).into());
    if let Some(t) = backend.thermometer {
        builder = builder.with_thermometer(t);
    }
    if let Some(t) = &cfg.temperature {
        builder = builder.with_compensation(CompensationCurve::try_from(t)?);
    }
    if let Some(cal) = cfg.calibration.as_ref().or(ctx.csv_calibration.as_ref()) {
        match CalibrationParameters::try_from(cal) {
            Ok(params) => builder = builder.with_calibration(params),
            Err(e) => tracing::warn!(error = %e, "calibration rejected; starting uncalibrated"),
        }
    }
    let mut pipeline = builder.build()?;

    if let Some(state) = ctx.state_path.as_deref().and_then(saved_state) {
        pipeline.restore(&state);
    }
    Ok(pipeline)
}

/// Saved state at `path`, if any. A file that cannot be read or parsed is
/// logged and treated as a fresh start; the next save replaces it.
fn saved_state(path: &Path) -> Option<PersistedState> {
    load_state(path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "ignoring unusable state file");
        None
    })
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn persist(ctx: &Context, pipeline: &Pipeline) -> eyre::Result<()> {
    if let Some(path) = &ctx.state_path {
        save_state(path, &pipeline.persisted_state())?;
        tracing::info!(path = %path.display(), "state saved");
    } else {
        tracing::warn!("no state file configured; calibration lasts for this process only");
    }
    Ok(())
}

pub fn run(ctx: &Context, ticks: Option<u64>, shutdown: Arc<AtomicBool>) -> eyre::Result<()> {
    let backend = make_backend(&ctx.cfg)?;
    let pipeline = assemble(ctx, backend)?;
    let hz = ctx.cfg.sampling.sample_rate_hz;
    let monitor = Monitor::spawn(pipeline, hz, ctx.state_path.clone());
    let view = monitor.view().clone();
    let rx = monitor.outbound().clone();
    tracing::info!(hz, ticks, "monitor started");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            tracing::info!("shutdown requested");
            break;
        }
        if ticks.is_some_and(|n| monitor.ticks() >= n) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(msg) => print_message(&msg, ctx.json),
            Err(xch::RecvTimeoutError::Timeout) => {}
            Err(xch::RecvTimeoutError::Disconnected) => {
                return Err(Report::new(KegmonError::Stopped));
            }
        }
    }
    let ran = monitor.ticks();
    // Joins the thread and writes the final state.
    drop(monitor);
    for msg in rx.try_iter() {
        print_message(&msg, ctx.json);
    }
    tracing::info!(ticks = ran, "monitor stopped");
    print_summary("summary", &view.snapshot(SUMMARY_POURS), true, now_ms(), ctx.json);
    Ok(())
}

/// Wait for the operator to confirm a step. A closed stdin counts as confirmation.
fn confirm(prompt: &str, json: bool) -> eyre::Result<()> {
    if json {
        println!("{}", json!({ "type": "prompt", "message": prompt }));
    } else {
        println!("{prompt}");
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .wrap_err("read operator confirmation")?;
    Ok(())
}

pub fn tare(ctx: &Context) -> eyre::Result<()> {
    let backend = make_backend(&ctx.cfg)?;
    let mut pipeline = assemble(ctx, backend)?;
    let estimate = pipeline.capture(ctx.cfg.sampling.read_count_calibration)?;
    tracing::debug!(raw = estimate.value, uncertainty = estimate.uncertainty, "zero captured");
    let CommandReply::Tared {
        zero_raw,
        recalibrated,
    } = pipeline.apply(Command::Tare)?
    else {
        return Err(eyre!("unexpected reply to tare"));
    };
    let calibrated = recalibrated.is_some();
    if calibrated {
        persist(ctx, &pipeline)?;
    }
    if ctx.json {
        println!(
            "{}",
            json!({ "type": "tare", "zero_raw": zero_raw, "calibrated": calibrated })
        );
    } else if calibrated {
        println!("Tare complete: zero at raw {zero_raw:.0}.");
    } else {
        println!(
            "Zero captured at raw {zero_raw:.0}; the scale is not calibrated yet. Run `kegmon calibrate --kg <weight>`."
        );
    }
    Ok(())
}

pub fn calibrate(ctx: &Context, known_kg: f32) -> eyre::Result<()> {
    if !(known_kg.is_finite() && known_kg > 0.0) {
        return Err(Report::new(KegmonError::InvalidCalibration(format!(
            "reference weight must be > 0 kg, got {known_kg}"
        ))));
    }
    let Backend {
        load_cell,
        thermometer,
        on_weight_placed,
    } = make_backend(&ctx.cfg)?;
    let samples = ctx.cfg.sampling.read_count_calibration;
    let mut pipeline = assemble(
        ctx,
        Backend {
            load_cell,
            thermometer,
            on_weight_placed: None,
        },
    )?;
    // Tare-then-calibrate must not reuse a zero from an older calibration.
    pipeline.apply(Command::ClearCalibration)?;

    confirm("Remove everything from the scale, then press Enter.", ctx.json)?;
    pipeline.capture(samples)?;
    pipeline.apply(Command::Tare)?;

    confirm(
        &format!("Place the {known_kg} kg reference weight on the scale, then press Enter."),
        ctx.json,
    )?;
    if let Some(placed) = &on_weight_placed {
        placed();
    }
    pipeline.capture(samples)?;
    let CommandReply::Calibrated(params) = pipeline.apply(Command::Calibrate { known_kg })? else {
        return Err(eyre!("unexpected reply to calibrate"));
    };
    persist(ctx, &pipeline)?;

    if ctx.json {
        println!(
            "{}",
            json!({
                "type": "calibration",
                "tare_offset": params.tare_offset(),
                "scale_factor": params.scale_factor(),
                "known_kg": known_kg,
            })
        );
    } else {
        println!(
            "Calibration complete: zero at raw {:.0}, {:.2} counts/kg.",
            params.tare_offset(),
            params.scale_factor()
        );
    }
    Ok(())
}

pub fn status(ctx: &Context) -> eyre::Result<()> {
    let path = ctx
        .state_path
        .as_deref()
        .ok_or_else(|| {
            Report::new(KegmonError::Config(
                "no state file configured (storage.state_file or --state)".into(),
            ))
        })?;
    if saved_state(path).is_none() {
        if ctx.json {
            println!("{}", json!({ "type": "status", "status": "offline", "state": null }));
        } else {
            println!("No saved state at {}.", path.display());
        }
        return Ok(());
    }
    let backend = Backend {
        load_cell: Box::new(kegmon_core::mocks::NoopLoadCell),
        thermometer: None,
        on_weight_placed: None,
    };
    let pipeline = assemble(ctx, backend)?;
    print_summary(
        "status",
        &pipeline.view().snapshot(SUMMARY_POURS),
        false,
        now_ms(),
        ctx.json,
    );
    Ok(())
}

pub fn self_check(ctx: &Context) -> eyre::Result<()> {
    let mut backend = make_backend(&ctx.cfg)?;
    let timeout = Duration::from_millis(ctx.cfg.hardware.sensor_read_timeout_ms);
    let samples = ctx.cfg.sampling.read_count_calibration.min(10);
    let mut stats = kegmon_core::sensor::RawStats::default();
    let mut last_err = None;
    for _ in 0..samples {
        match backend.load_cell.read(timeout) {
            Ok(raw) => stats.push(raw),
            Err(e) => last_err = Some(kegmon_core::hw_error::map_hw_error(&*e)),
        }
    }
    let Some(mean) = stats.mean() else {
        return Err(Report::new(last_err.unwrap_or(KegmonError::NoEstimate)))
            .wrap_err("load cell produced no samples");
    };
    let temperature = backend.thermometer.as_mut().map(|t| t.read_celsius());
    let temp_c = temperature.as_ref().and_then(|r| r.as_ref().ok().copied());
    if let Some(Err(e)) = &temperature {
        tracing::warn!(error = %e, "thermometer read failed");
    }
    if ctx.json {
        println!(
            "{}",
            json!({
                "type": "self_check",
                "ok": true,
                "samples": stats.count,
                "mean_raw": mean,
                "stddev_raw": stats.stddev(),
                "thermometer": backend.thermometer.is_some(),
                "temperature_c": temp_c,
            })
        );
    } else {
        println!(
            "load cell: ok ({} samples, mean {mean:.0}, stddev {:.1})",
            stats.count,
            stats.stddev().unwrap_or(0.0)
        );
        match (&temperature, temp_c) {
            (None, _) => println!("thermometer: not configured"),
            (Some(_), Some(c)) => println!("thermometer: ok ({c:.1} °C)"),
            (Some(_), None) => println!("thermometer: read failed"),
        }
    }
    Ok(())
}

/// Load the optional calibration CSV named on the command line. A malformed
/// file is an error; rows that do not fit a usable line leave the monitor uncalibrated.
pub fn load_csv(path: Option<&Path>) -> eyre::Result<Option<PersistedCalibration>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let rows = kegmon_config::read_calibration_csv(path)?;
    match CalibrationFit::from_rows(&rows) {
        Ok(fit) => {
            tracing::debug!(
                rows = rows.len(),
                inliers = fit.inliers.len(),
                scale_factor = fit.scale_factor,
                "calibration CSV fitted"
            );
            Ok(Some(fit.into_persisted()))
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "calibration CSV rejected; starting uncalibrated");
            Ok(None)
        }
    }
}
