//! Restart-survival snapshot: active calibration, last known level, usage summary.
//!
//! Stored as TOML next to the config and replaced atomically so a power cut
//! mid-write leaves either the old or the new file, never a torn one.

use std::{fs, io::Write, path::Path};

use serde::{Deserialize, Serialize};

use crate::PersistedCalibration;

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub version: u32,
    /// Filter estimate in raw counts at the time of the snapshot.
    #[serde(default)]
    pub last_estimate_raw: Option<f64>,
    /// Stable level the pour detector was anchored to.
    #[serde(default)]
    pub pour_reference_l: Option<f32>,
    #[serde(default)]
    pub calibration: Option<PersistedCalibration>,
    #[serde(default)]
    pub last_reading: Option<PersistedReading>,
    #[serde(default)]
    pub stats: Option<PersistedStats>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_estimate_raw: None,
            pour_reference_l: None,
            calibration: None,
            last_reading: None,
            stats: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersistedReading {
    pub timestamp_ms: u64,
    pub weight_kg: f32,
    pub volume_l: f32,
    pub level_percent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// Days since the Unix epoch (UTC).
    pub day: u64,
    pub volume_l: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PersistedStats {
    pub pour_count: u64,
    #[serde(default)]
    pub invalid_pours: u64,
    pub total_volume_l: f64,
    #[serde(default)]
    pub min_pour_l: Option<f32>,
    #[serde(default)]
    pub max_pour_l: Option<f32>,
    #[serde(default)]
    pub last_pour_ms: Option<u64>,
    #[serde(default)]
    pub keg_replacements: u64,
    #[serde(default)]
    pub last_replacement_ms: Option<u64>,
    #[serde(default)]
    pub daily: Vec<DailyUsage>,
}

impl PersistedState {
    /// Drop parts that cannot be trusted instead of refusing the whole file.
    pub fn sanitize(mut self) -> Self {
        if let Some(cal) = &self.calibration
            && let Err(e) = cal.validate()
        {
            tracing::warn!(error = %e, "persisted calibration invalid; starting uncalibrated");
            self.calibration = None;
        }
        if let Some(r) = &self.last_reading
            && !(r.weight_kg.is_finite() && r.volume_l.is_finite() && r.level_percent.is_finite())
        {
            tracing::warn!("persisted reading not finite; ignoring");
            self.last_reading = None;
        }
        if self.last_estimate_raw.is_some_and(|v| !v.is_finite()) {
            self.last_estimate_raw = None;
        }
        if self.pour_reference_l.is_some_and(|v| !v.is_finite()) {
            self.pour_reference_l = None;
        }
        if let Some(s) = &self.stats
            && !s.total_volume_l.is_finite()
        {
            tracing::warn!("persisted statistics not finite; resetting");
            self.stats = None;
        }
        self
    }
}

/// Load state from `path`. A missing file is a fresh start (`Ok(None)`).
pub fn load_state(path: &Path) -> eyre::Result<Option<PersistedState>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(eyre::eyre!("read state file {}: {}", path.display(), e)),
    };
    let state: PersistedState = toml::from_str(&text)
        .map_err(|e| eyre::eyre!("parse state file {}: {}", path.display(), e))?;
    if state.version != STATE_VERSION {
        eyre::bail!(
            "state file {} has version {}, expected {}",
            path.display(),
            state.version,
            STATE_VERSION
        );
    }
    Ok(Some(state.sanitize()))
}

pub fn save_state(path: &Path, state: &PersistedState) -> eyre::Result<()> {
    let text = toml::to_string(state).map_err(|e| eyre::eyre!("serialize state: {e}"))?;
    write_atomic(path, text.as_bytes())
        .map_err(|e| eyre::eyre!("write state file {}: {}", path.display(), e))
}

/// Write to a sibling temp file, fsync, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}
