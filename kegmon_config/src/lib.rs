#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schemas, calibration parsing and persisted state for the keg monitor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before slope/intercept estimation.
//! - `state` holds the restart-survival snapshot written atomically to disk.
use serde::{Deserialize, Serialize};

pub mod state;

pub use state::{
    DailyUsage, PersistedReading, PersistedState, PersistedStats, STATE_VERSION, load_state,
    save_state, write_atomic,
};

/// Calibration CSV schema.
///
/// Expected headers:
/// raw,kg
///
/// Example:
/// raw,kg
/// 84291,0.0
/// 284291,10.0
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct CalibrationRow {
    pub raw: f64,
    pub kg: f64,
}

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub hx711_dt: u8,
    pub hx711_sck: u8,
    /// 1-Wire id of a DS18B20 probe (e.g. "28-0316a279d2ff"); no compensation input when absent.
    #[serde(default)]
    pub w1_thermometer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sampling {
    pub sample_rate_hz: u32,
    /// Samples averaged through the filter before a tare/calibration capture.
    pub read_count_calibration: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            sample_rate_hz: 2,
            read_count_calibration: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for HX711 data-ready (DT low) before failing
    pub sensor_read_timeout_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 150,
        }
    }
}

/// Kalman noise model. Variances are in raw counts squared.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    pub process_noise: f64,
    pub measurement_noise: f64,
    pub initial_uncertainty: f64,
    pub min_uncertainty: f64,
    /// Readings heavier than this (after calibration) are rejected as implausible.
    pub max_weight_kg: f32,
    /// Readings lighter than this are rejected; allows for slack below tare.
    pub min_weight_kg: f32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            process_noise: 400.0,
            measurement_noise: 40_000.0,
            initial_uncertainty: 1.0e6,
            min_uncertainty: 1.0,
            max_weight_kg: 100.0,
            min_weight_kg: -5.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KegCfg {
    /// Weight of the empty keg (and anything else resting on the scale).
    pub empty_weight_kg: f32,
    pub capacity_l: f32,
    /// Density of the contents; 1.010 for a beer finishing at FG 1.010.
    pub density_kg_per_l: f32,
    pub glass_volume_l: f32,
}

impl Default for KegCfg {
    fn default() -> Self {
        Self {
            empty_weight_kg: 4.0,
            capacity_l: 19.0,
            density_kg_per_l: 1.0,
            glass_volume_l: 0.40,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PourCfg {
    /// Level changes within this band are treated as noise.
    pub noise_threshold_l: f32,
    /// Level must hold steady this long before a pour is closed.
    pub settle_ms: u64,
    /// Drains smaller than this are discarded.
    pub min_pour_l: f32,
    /// Consecutive out-of-band samples needed to leave Stable.
    pub confirm_samples: u32,
    /// Gross weight below this means the keg is off the scale.
    pub absent_weight_kg: f32,
}

impl Default for PourCfg {
    fn default() -> Self {
        Self {
            noise_threshold_l: 0.05,
            settle_ms: 3_000,
            min_pour_l: 0.10,
            confirm_samples: 2,
            absent_weight_kg: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryCfg {
    pub capacity: usize,
    /// Minimum spacing between level readings stored in history (pours are always stored).
    pub level_interval_ms: u64,
    pub outbound_capacity: usize,
}

impl Default for HistoryCfg {
    fn default() -> Self {
        Self {
            capacity: 1_024,
            level_interval_ms: 60_000,
            outbound_capacity: 64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FaultCfg {
    /// How long the last good reading may be reused while the sensor is failing.
    pub max_stale_ms: u64,
}

impl Default for FaultCfg {
    fn default() -> Self {
        Self {
            max_stale_ms: 10_000,
        }
    }
}

/// Polynomial correction `sum(c[i] * dT^(i+1))` in kg, `dT = t - reference_c`.
#[derive(Debug, Deserialize, Clone)]
pub struct TemperatureCfg {
    pub reference_c: f32,
    #[serde(default)]
    pub coefficients: Vec<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Storage {
    /// Persisted calibration/level/stats; nothing survives a restart when unset.
    pub state_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    pub keg: KegCfg,
    #[serde(default)]
    pub sampling: Sampling,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub filter: FilterCfg,
    #[serde(default)]
    pub pour: PourCfg,
    #[serde(default)]
    pub history: HistoryCfg,
    #[serde(default)]
    pub fault: FaultCfg,
    #[serde(default)]
    pub temperature: Option<TemperatureCfg>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub storage: Storage,
    /// Optional calibration; the persisted state file takes precedence when it holds one.
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
}

/// Calibration as stored in config or state: `kg = (raw - tare_offset) / scale_factor`,
/// or piecewise-linear through `points` when two or more are present.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PersistedCalibration {
    /// raw counts with nothing on the scale
    pub tare_offset: f64,
    /// raw counts per kg
    pub scale_factor: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<CalibrationRow>,
}

impl PersistedCalibration {
    pub fn validate(&self) -> eyre::Result<()> {
        if !self.tare_offset.is_finite() {
            eyre::bail!("calibration.tare_offset must be finite");
        }
        if !self.scale_factor.is_finite() || self.scale_factor.abs() < f64::EPSILON {
            eyre::bail!("calibration.scale_factor must be finite and non-zero");
        }
        if self.points.len() == 1 {
            eyre::bail!("calibration.points needs at least two points when present");
        }
        if self.points.iter().any(|p| !p.raw.is_finite() || !p.kg.is_finite()) {
            eyre::bail!("calibration.points must be finite");
        }
        if !self.points.is_empty() {
            check_monotonic(&self.points)?;
        }
        Ok(())
    }
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Result of fitting calibration rows: `kg = (raw - tare_offset) / scale_factor`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationFit {
    pub tare_offset: f64,
    pub scale_factor: f64,
    /// Rows kept after outlier rejection, in input order.
    pub inliers: Vec<CalibrationRow>,
}

impl CalibrationFit {
    /// Build a fit from calibration rows using ordinary least squares plus one robust refit.
    /// Fits kg = a*raw + b, then converts to kg = (raw - tare_offset) / scale_factor
    /// with `scale_factor = 1/a` and `tare_offset = -b/a` (the raw value at 0 kg).
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        if rows.iter().any(|r| !r.raw.is_finite() || !r.kg.is_finite()) {
            eyre::bail!("calibration rows must be finite numbers");
        }
        check_monotonic(rows)?;

        let (a0, b0) = ols(rows.iter())?;
        let sumsq: f64 = rows
            .iter()
            .map(|r| {
                let res = r.kg - (a0 * r.raw + b0);
                res * res
            })
            .sum();
        #[allow(clippy::cast_precision_loss)]
        let rms = (sumsq / rows.len() as f64).sqrt();

        // Reject outliers with |residual| > 2 sigma and refit if at least 2 remain.
        let (a, b, inliers) = match robust_refit(rows, a0, b0, rms, 2.0) {
            Some((a, b, kept)) => (a, b, kept),
            None => (a0, b0, rows.to_vec()),
        };

        let tare_offset = -b / a;
        let scale_factor = 1.0 / a;
        if !tare_offset.is_finite() || !scale_factor.is_finite() {
            eyre::bail!("calibration produced invalid tare baseline");
        }
        Ok(Self {
            tare_offset,
            scale_factor,
            inliers,
        })
    }

    pub fn into_persisted(self) -> PersistedCalibration {
        PersistedCalibration {
            tare_offset: self.tare_offset,
            scale_factor: self.scale_factor,
            points: self.inliers,
        }
    }
}

fn check_monotonic(rows: &[CalibrationRow]) -> eyre::Result<()> {
    // Strictly monotonic raw values (increasing or decreasing), no duplicates.
    let mut dir = 0.0f64;
    for (i, pair) in rows.windows(2).enumerate() {
        let d = pair[1].raw - pair[0].raw;
        if d == 0.0 {
            eyre::bail!(
                "calibration rows have duplicate raw values at index {} and {}",
                i,
                i + 1
            );
        }
        if dir == 0.0 {
            dir = d.signum();
        } else if dir != d.signum() {
            eyre::bail!(
                "calibration raw values must be monotonic (strictly increasing or strictly decreasing)"
            );
        }
    }
    Ok(())
}

/// OLS fit of kg on raw, computed in mean-centred form.
fn ols<'a>(rows: impl Iterator<Item = &'a CalibrationRow> + Clone) -> eyre::Result<(f64, f64)> {
    let (n, sum_x, sum_y) = rows
        .clone()
        .fold((0usize, 0.0f64, 0.0f64), |(n, sx, sy), r| (n + 1, sx + r.raw, sy + r.kg));
    #[allow(clippy::cast_precision_loss)]
    let nf = n as f64;
    let mean_x = sum_x / nf;
    let mean_y = sum_y / nf;
    let (sxx, sxy) = rows.fold((0.0f64, 0.0f64), |(sxx, sxy), r| {
        let x = r.raw - mean_x;
        (sxx + x * x, sxy + x * (r.kg - mean_y))
    });
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine slope (degenerate raw variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("calibration produced non-finite slope");
    }
    if a == 0.0 {
        eyre::bail!("calibration produced zero slope (invalid scale factor)");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Single-step robust refit: drop rows with |residual| > k * rms around y = a0*x + b0,
/// then refit the inliers with an online (Welford/Chan) covariance update.
/// Returns None when nothing was rejected or the refit is degenerate; the caller keeps (a0, b0).
fn robust_refit(
    rows: &[CalibrationRow],
    a0: f64,
    b0: f64,
    rms: f64,
    k: f64,
) -> Option<(f64, f64, Vec<CalibrationRow>)> {
    if !(rms.is_finite() && rms > 0.0 && k.is_finite() && k > 0.0) {
        return None;
    }
    let thr = k * rms;
    let mut kept = Vec::with_capacity(rows.len());
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for row in rows {
        let (x, y) = (row.raw, row.kg);
        if (y - (a0 * x + b0)).abs() > thr {
            continue;
        }
        kept.push(*row);
        #[allow(clippy::cast_precision_loss)]
        let n = kept.len() as f64;
        let dx = x - mean_x;
        mean_x += dx / n;
        mean_y += (y - mean_y) / n;
        cxx += dx * (x - mean_x);
        cxy += dx * (y - mean_y);
    }

    if kept.len() < 2 || kept.len() == rows.len() {
        return None;
    }
    if !cxx.is_finite() || cxx == 0.0 {
        return None;
    }
    let a = cxy / cxx;
    if !a.is_finite() || a == 0.0 {
        return None;
    }
    Some((a, mean_y - a * mean_x, kept))
}

impl TryFrom<&[CalibrationRow]> for CalibrationFit {
    type Error = eyre::Report;
    fn try_from(rows: &[CalibrationRow]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

/// Read and fit a `raw,kg` calibration CSV.
pub fn load_calibration_csv(path: &std::path::Path) -> eyre::Result<PersistedCalibration> {
    let rows = read_calibration_csv(path)?;
    let fit = CalibrationFit::from_rows(&rows)?;
    tracing::debug!(
        rows = rows.len(),
        inliers = fit.inliers.len(),
        scale_factor = fit.scale_factor,
        "calibration CSV fitted"
    );
    Ok(fit.into_persisted())
}

/// Read the rows of a `raw,kg` calibration CSV without fitting them.
pub fn read_calibration_csv(path: &std::path::Path) -> eyre::Result<Vec<CalibrationRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {}: {}", path.display(), e))?;

    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {}: {}", path.display(), e))?
        .clone();
    let expected = ["raw", "kg"];
    let actual: Vec<&str> = headers.iter().collect();
    if actual != expected {
        eyre::bail!(
            "calibration CSV must have headers 'raw,kg', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    Ok(rows)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Sampling
        if self.sampling.sample_rate_hz == 0 {
            eyre::bail!("sampling.sample_rate_hz must be > 0");
        }
        if self.sampling.sample_rate_hz > 80 {
            eyre::bail!("sampling.sample_rate_hz must be <= 80 (HX711 max rate)");
        }
        if self.sampling.read_count_calibration == 0 {
            eyre::bail!("sampling.read_count_calibration must be >= 1");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }

        // Filter
        let f = &self.filter;
        if !(f.process_noise.is_finite() && f.process_noise > 0.0) {
            eyre::bail!("filter.process_noise must be > 0");
        }
        if !(f.measurement_noise.is_finite() && f.measurement_noise > 0.0) {
            eyre::bail!("filter.measurement_noise must be > 0");
        }
        if !(f.initial_uncertainty.is_finite() && f.initial_uncertainty > 0.0) {
            eyre::bail!("filter.initial_uncertainty must be > 0");
        }
        if !(f.min_uncertainty.is_finite() && f.min_uncertainty > 0.0) {
            eyre::bail!("filter.min_uncertainty must be > 0");
        }
        if !(f.max_weight_kg.is_finite() && f.min_weight_kg.is_finite())
            || f.min_weight_kg >= f.max_weight_kg
        {
            eyre::bail!("filter.min_weight_kg must be below filter.max_weight_kg");
        }

        // Keg
        let k = &self.keg;
        if !(k.empty_weight_kg.is_finite() && k.empty_weight_kg >= 0.0) {
            eyre::bail!("keg.empty_weight_kg must be >= 0");
        }
        if !(k.capacity_l.is_finite() && k.capacity_l > 0.0) {
            eyre::bail!("keg.capacity_l must be > 0");
        }
        if !(k.density_kg_per_l.is_finite() && (0.5..=2.0).contains(&k.density_kg_per_l)) {
            eyre::bail!("keg.density_kg_per_l must be in [0.5, 2.0]");
        }
        if !(k.glass_volume_l.is_finite() && k.glass_volume_l > 0.0) {
            eyre::bail!("keg.glass_volume_l must be > 0");
        }

        // Pour detection
        let p = &self.pour;
        if !(p.noise_threshold_l.is_finite() && p.noise_threshold_l > 0.0) {
            eyre::bail!("pour.noise_threshold_l must be > 0");
        }
        if !(p.min_pour_l.is_finite() && p.min_pour_l >= p.noise_threshold_l) {
            eyre::bail!("pour.min_pour_l must be >= pour.noise_threshold_l");
        }
        if p.settle_ms == 0 {
            eyre::bail!("pour.settle_ms must be >= 1");
        }
        if p.settle_ms > 5 * 60 * 1000 {
            eyre::bail!("pour.settle_ms is unreasonably large (>5min)");
        }
        if p.confirm_samples < 2 {
            eyre::bail!("pour.confirm_samples must be >= 2");
        }
        if !(p.absent_weight_kg.is_finite() && p.absent_weight_kg >= 0.0) {
            eyre::bail!("pour.absent_weight_kg must be >= 0");
        }

        // History
        if self.history.capacity == 0 {
            eyre::bail!("history.capacity must be >= 1");
        }
        if self.history.outbound_capacity == 0 {
            eyre::bail!("history.outbound_capacity must be >= 1");
        }

        // Faults
        if self.fault.max_stale_ms == 0 {
            eyre::bail!("fault.max_stale_ms must be >= 1");
        }

        // Temperature
        if let Some(t) = &self.temperature {
            if !t.reference_c.is_finite() {
                eyre::bail!("temperature.reference_c must be finite");
            }
            if t.coefficients.iter().any(|c| !c.is_finite()) {
                eyre::bail!("temperature.coefficients must be finite");
            }
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }

    /// Drop a `[calibration]` table that would not produce a usable model.
    /// The monitor then starts uncalibrated rather than refusing to run.
    pub fn sanitize(mut self) -> Self {
        if let Some(cal) = &self.calibration
            && let Err(e) = cal.validate()
        {
            tracing::warn!(error = %e, "configured calibration invalid; starting uncalibrated");
            self.calibration = None;
        }
        self
    }
}
