#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! `kegmon` binary: loads the config, assembles sensors and the pipeline, and
//! dispatches subcommands. Data goes to stdout (text or JSON lines), logs to
//! stderr and optionally to a rotating JSON log file.

mod app;
mod backend;
mod cli;
mod error_fmt;
mod render;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;
use eyre::WrapErr;
use kegmon_core::KegmonError;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::app::Context;
use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE, json_mode};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error hooks: {e}");
    }

    if let Err(e) = real_main(cli) {
        tracing::debug!(error = ?e, "command failed");
        if json_mode() {
            println!("{}", format_error_json(&e));
        } else {
            eprintln!("{}", humanize(&e));
        }
        std::process::exit(exit_code_for_error(&e));
    }
}

fn real_main(cli: Cli) -> eyre::Result<()> {
    let text = std::fs::read_to_string(&cli.config)
        .wrap_err_with(|| format!("read config {}", cli.config.display()))?;
    let cfg = kegmon_config::load_toml(&text).map_err(|e| {
        KegmonError::Config(format!("parse {}: {e}", cli.config.display()))
    })?;
    cfg.validate()
        .map_err(|e| KegmonError::Config(e.to_string()))?;

    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;
    tracing::debug!(config = %cli.config.display(), "config loaded");
    let cfg = cfg.sanitize();

    let csv = app::load_csv(cli.calibration.as_deref())?;
    let ctx = Context::new(cfg, csv, cli.state, cli.json);

    match cli.cmd {
        Commands::Run { ticks } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            let flag = shutdown.clone();
            ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))
                .wrap_err("install Ctrl-C handler")?;
            app::run(&ctx, ticks, shutdown)
        }
        Commands::Tare => app::tare(&ctx),
        Commands::Calibrate { kg } => app::calibrate(&ctx, kg),
        Commands::Status => app::status(&ctx),
        Commands::SelfCheck => app::self_check(&ctx),
    }
}

fn rotation(name: Option<&str>) -> eyre::Result<Rotation> {
    match name.unwrap_or("never") {
        "never" => Ok(Rotation::NEVER),
        "daily" => Ok(Rotation::DAILY),
        "hourly" => Ok(Rotation::HOURLY),
        other => Err(eyre::eyre!(
            "logging.rotation must be never, daily or hourly, got {other}"
        )),
    }
}

/// Console logs go to stderr so stdout stays clean for data. `RUST_LOG` wins
/// over `--log-level`. The optional file sink always writes JSON lines.
fn init_tracing(json: bool, level: &str, logging: &kegmon_config::Logging) -> eyre::Result<()> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file}"))?;
        let appender =
            RollingFileAppender::new(rotation(logging.rotation.as_deref())?, dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("init tracing")?;
    Ok(())
}
