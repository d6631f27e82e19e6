//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

#[derive(Parser, Debug)]
#[command(name = "kegmon", version, about = "Keg level monitor")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/kegmon.toml")]
    pub config: PathBuf,

    /// Optional calibration CSV (strict header), used when no other calibration is known
    #[arg(long, value_name = "FILE")]
    pub calibration: Option<PathBuf>,

    /// State file; overrides storage.state_file from the config
    #[arg(long, value_name = "FILE")]
    pub state: Option<PathBuf>,

    /// Emit JSON lines on stdout instead of text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor the keg until Ctrl-C, printing readings, pours and status changes
    Run {
        /// Stop after this many monitor ticks
        #[arg(long, value_name = "N")]
        ticks: Option<u64>,
    },
    /// Capture the empty-scale zero point
    Tare,
    /// Two-step calibration: tare, then place a known weight
    Calibrate {
        /// Reference weight in kilograms
        #[arg(long, value_name = "KG")]
        kg: f32,
    },
    /// Print the last persisted level and usage statistics
    Status,
    /// Quick health check (sensor presence / sim ok)
    SelfCheck,
}
