//! Scalar Kalman filter over raw load-cell counts.
//!
//! The true weight is modelled as a random walk (process noise Q) observed
//! through a noisy sensor (measurement noise R):
//!
//! ```text
//! predict:  P' = P + Q
//! gain:     K  = P' / (P' + R)
//! correct:  x  = x + K (z - x)
//!           P  = max((1 - K) P', P_min)
//! ```
//!
//! The first accepted sample seeds `x = z, P = initial_uncertainty`.

use crate::config::FilterCfg;
use crate::error::KegmonError;
use crate::types::{FilteredEstimate, RawSample};

#[derive(Debug, Clone, Copy)]
struct KalmanState {
    estimate: f64,
    uncertainty: f64,
}

#[derive(Debug, Clone)]
pub struct NoiseFilter {
    cfg: FilterCfg,
    state: Option<KalmanState>,
    last_ts: u64,
    /// Accepted raw window `[lo, hi]`; everything is accepted when unset.
    plausible: Option<(f64, f64)>,
}

impl NoiseFilter {
    pub fn new(cfg: FilterCfg) -> Self {
        Self {
            cfg,
            state: None,
            last_ts: 0,
            plausible: None,
        }
    }

    pub fn cfg(&self) -> &FilterCfg {
        &self.cfg
    }

    /// Restrict accepted raw values. Bounds may be given in either order.
    pub fn set_plausible_range(&mut self, range: Option<(f64, f64)>) {
        self.plausible = range.map(|(a, b)| (a.min(b), a.max(b)));
    }

    pub fn plausible_range(&self) -> Option<(f64, f64)> {
        self.plausible
    }

    /// Feed one sample. Implausible samples are rejected without touching the state.
    pub fn update(&mut self, sample: &RawSample) -> Result<FilteredEstimate, KegmonError> {
        let z = f64::from(sample.raw);
        if let Some((lo, hi)) = self.plausible
            && !(lo..=hi).contains(&z)
        {
            tracing::warn!(raw = sample.raw, lo, hi, "rejecting implausible sample");
            return Err(KegmonError::Implausible { raw: sample.raw });
        }

        let next = match self.state {
            None => KalmanState {
                estimate: z,
                uncertainty: self.cfg.initial_uncertainty.max(self.cfg.min_uncertainty),
            },
            Some(s) => {
                let p_pred = s.uncertainty + self.cfg.process_noise;
                let gain = p_pred / (p_pred + self.cfg.measurement_noise);
                KalmanState {
                    estimate: s.estimate + gain * (z - s.estimate),
                    uncertainty: ((1.0 - gain) * p_pred).max(self.cfg.min_uncertainty),
                }
            }
        };
        self.state = Some(next);
        // Timestamps never run backwards even if the wall clock is stepped.
        self.last_ts = self.last_ts.max(sample.timestamp_ms);
        Ok(FilteredEstimate {
            timestamp_ms: self.last_ts,
            value: next.estimate,
            uncertainty: next.uncertainty,
        })
    }

    /// Current estimate without feeding a new sample.
    pub fn estimate(&self) -> Option<FilteredEstimate> {
        self.state.map(|s| FilteredEstimate {
            timestamp_ms: self.last_ts,
            value: s.estimate,
            uncertainty: s.uncertainty,
        })
    }

    /// Start from a previously known value. The seed is trusted like one measurement,
    /// so the next sample pulls the estimate about halfway toward reality.
    pub fn seed(&mut self, value: f64, timestamp_ms: u64) {
        if !value.is_finite() {
            return;
        }
        self.state = Some(KalmanState {
            estimate: value,
            uncertainty: self.cfg.measurement_noise.max(self.cfg.min_uncertainty),
        });
        self.last_ts = self.last_ts.max(timestamp_ms);
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}
