//! Raw counts to kilograms.
//!
//! A linear model `kg = (raw - tare_offset) / scale_factor` is always present.
//! When two or more reference points are stored the mapping is piecewise-linear
//! through them instead, which absorbs load-cell non-linearity.
//!
//! The model fails closed: until parameters exist, `apply` returns
//! [`KegmonError::CalibrationMissing`] rather than a made-up weight.

use kegmon_config::{CalibrationFit, CalibrationRow};

use crate::error::KegmonError;
use crate::types::FilteredEstimate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationPoint {
    pub raw: f64,
    pub kg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationParameters {
    tare_offset: f64,
    scale_factor: f64,
    /// Sorted by raw, ascending; empty or at least two entries.
    points: Vec<CalibrationPoint>,
}

impl CalibrationParameters {
    pub fn linear(tare_offset: f64, scale_factor: f64) -> Result<Self, KegmonError> {
        if !tare_offset.is_finite() {
            return Err(KegmonError::InvalidCalibration(
                "tare offset must be finite".into(),
            ));
        }
        if !scale_factor.is_finite() || scale_factor.abs() < f64::EPSILON {
            return Err(KegmonError::InvalidCalibration(
                "scale factor must be finite and non-zero".into(),
            ));
        }
        Ok(Self {
            tare_offset,
            scale_factor,
            points: Vec::new(),
        })
    }

    /// Fit reference points (least squares with one outlier-rejecting refit) and keep
    /// the surviving points for piecewise interpolation.
    pub fn from_points(points: &[CalibrationPoint]) -> Result<Self, KegmonError> {
        let rows: Vec<CalibrationRow> = points
            .iter()
            .map(|p| CalibrationRow { raw: p.raw, kg: p.kg })
            .collect();
        let fit = CalibrationFit::from_rows(&rows)
            .map_err(|e| KegmonError::InvalidCalibration(e.to_string()))?;
        let kept: Vec<CalibrationPoint> = fit
            .inliers
            .iter()
            .map(|r| CalibrationPoint { raw: r.raw, kg: r.kg })
            .collect();
        Self::with_points(fit.tare_offset, fit.scale_factor, kept)
    }

    /// Linear parameters plus explicit interpolation points (as loaded from storage).
    pub fn with_points(
        tare_offset: f64,
        scale_factor: f64,
        mut points: Vec<CalibrationPoint>,
    ) -> Result<Self, KegmonError> {
        let mut params = Self::linear(tare_offset, scale_factor)?;
        if points.len() == 1 {
            return Err(KegmonError::InvalidCalibration(
                "piecewise calibration needs at least two points".into(),
            ));
        }
        if points.iter().any(|p| !p.raw.is_finite() || !p.kg.is_finite()) {
            return Err(KegmonError::InvalidCalibration(
                "calibration points must be finite".into(),
            ));
        }
        points.sort_by(|a, b| a.raw.total_cmp(&b.raw));
        if points.windows(2).any(|w| w[0].raw == w[1].raw) {
            return Err(KegmonError::InvalidCalibration(
                "calibration points have duplicate raw values".into(),
            ));
        }
        params.points = points;
        Ok(params)
    }

    pub fn tare_offset(&self) -> f64 {
        self.tare_offset
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn is_piecewise(&self) -> bool {
        self.points.len() >= 2
    }

    pub fn weight_kg(&self, raw: f64) -> f64 {
        if self.points.len() < 2 {
            return (raw - self.tare_offset) / self.scale_factor;
        }
        // Segment containing raw; the end segments extrapolate.
        let idx = self
            .points
            .partition_point(|p| p.raw <= raw)
            .clamp(1, self.points.len() - 1);
        let (a, b) = (self.points[idx - 1], self.points[idx]);
        a.kg + (raw - a.raw) * (b.kg - a.kg) / (b.raw - a.raw)
    }

    /// Raw counts the linear model maps to `kg`.
    pub fn raw_for(&self, kg: f64) -> f64 {
        kg * self.scale_factor + self.tare_offset
    }

    fn retared(&self, zero_raw: f64) -> Result<Self, KegmonError> {
        if self.is_piecewise() {
            // Shift every point so the curve keeps its shape around the new zero.
            let shift = zero_raw - self.points_zero_raw();
            let points = self
                .points
                .iter()
                .map(|p| CalibrationPoint {
                    raw: p.raw + shift,
                    kg: p.kg,
                })
                .collect();
            Self::with_points(self.tare_offset + shift, self.scale_factor, points)
        } else {
            Self::linear(zero_raw, self.scale_factor)
        }
    }

    /// Raw value at 0 kg on the piecewise curve.
    fn points_zero_raw(&self) -> f64 {
        self.points
            .windows(2)
            .find_map(|w| {
                let (a, b) = (w[0], w[1]);
                let spans_zero = (a.kg <= 0.0 && b.kg >= 0.0) || (a.kg >= 0.0 && b.kg <= 0.0);
                (spans_zero && a.kg != b.kg)
                    .then(|| a.raw - a.kg * (b.raw - a.raw) / (b.kg - a.kg))
            })
            .unwrap_or(self.tare_offset)
    }
}

/// Holds the single active calibration (or none).
#[derive(Debug, Clone, Default)]
pub struct CalibrationModel {
    active: Option<CalibrationParameters>,
    pending_zero: Option<f64>,
}

impl CalibrationModel {
    pub fn new(active: Option<CalibrationParameters>) -> Self {
        Self {
            active,
            pending_zero: None,
        }
    }

    pub fn is_calibrated(&self) -> bool {
        self.active.is_some()
    }

    pub fn parameters(&self) -> Option<&CalibrationParameters> {
        self.active.as_ref()
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn apply(&self, estimate: &FilteredEstimate) -> Result<f32, KegmonError> {
        let params = self.active.as_ref().ok_or(KegmonError::CalibrationMissing)?;
        Ok(params.weight_kg(estimate.value) as f32)
    }

    /// Capture the empty-scale reading. An existing calibration is re-zeroed in place;
    /// otherwise the zero waits for [`calibrate`](Self::calibrate).
    pub fn tare(
        &mut self,
        estimate: &FilteredEstimate,
    ) -> Result<Option<CalibrationParameters>, KegmonError> {
        let zero = estimate.value;
        if !zero.is_finite() {
            return Err(KegmonError::InvalidCalibration(
                "tare reading is not finite".into(),
            ));
        }
        self.pending_zero = Some(zero);
        let Some(active) = &self.active else {
            tracing::info!(zero_raw = zero, "tare captured; awaiting reference weight");
            return Ok(None);
        };
        let next = active.retared(zero)?;
        tracing::info!(zero_raw = zero, "scale re-zeroed");
        self.active = Some(next.clone());
        Ok(Some(next))
    }

    /// Two-point calibration: the tare reading plus `estimate` taken with `known_kg` on the scale.
    /// On failure the active parameters are left untouched.
    pub fn calibrate(
        &mut self,
        known_kg: f32,
        estimate: &FilteredEstimate,
    ) -> Result<CalibrationParameters, KegmonError> {
        if !(known_kg.is_finite() && known_kg > 0.0) {
            return Err(KegmonError::InvalidCalibration(
                "reference weight must be > 0".into(),
            ));
        }
        let zero = self
            .pending_zero
            .or_else(|| self.active.as_ref().map(CalibrationParameters::tare_offset))
            .ok_or_else(|| KegmonError::InvalidCalibration("tare before calibrating".into()))?;
        let scale = (estimate.value - zero) / f64::from(known_kg);
        let next = CalibrationParameters::linear(zero, scale).map_err(|_| {
            KegmonError::InvalidCalibration(
                "reference reading equals tare reading; is the weight on the scale?".into(),
            )
        })?;
        tracing::info!(
            tare_offset = zero,
            scale_factor = scale,
            known_kg,
            "calibration updated"
        );
        self.active = Some(next.clone());
        self.pending_zero = None;
        Ok(next)
    }

    /// Multi-point calibration from reference points.
    pub fn calibrate_points(
        &mut self,
        points: &[CalibrationPoint],
    ) -> Result<CalibrationParameters, KegmonError> {
        let next = CalibrationParameters::from_points(points)?;
        tracing::info!(
            points = next.points().len(),
            scale_factor = next.scale_factor(),
            "multi-point calibration updated"
        );
        self.active = Some(next.clone());
        self.pending_zero = None;
        Ok(next)
    }

    /// Replace the active parameters wholesale.
    pub fn set(&mut self, params: CalibrationParameters) {
        self.active = Some(params);
        self.pending_zero = None;
    }

    pub fn clear(&mut self) {
        self.active = None;
        self.pending_zero = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est(value: f64) -> FilteredEstimate {
        FilteredEstimate {
            timestamp_ms: 0,
            value,
            uncertainty: 1.0,
        }
    }

    #[test]
    fn uncalibrated_model_fails_closed() {
        let m = CalibrationModel::default();
        assert_eq!(m.apply(&est(1.0)), Err(KegmonError::CalibrationMissing));
    }

    #[test]
    fn piecewise_extrapolates_with_end_segments() {
        let p = CalibrationParameters::with_points(
            0.0,
            100.0,
            vec![
                CalibrationPoint { raw: 0.0, kg: 0.0 },
                CalibrationPoint { raw: 1_000.0, kg: 10.0 },
                CalibrationPoint { raw: 2_000.0, kg: 21.0 },
            ],
        )
        .unwrap();
        assert!((p.weight_kg(500.0) - 5.0).abs() < 1e-12);
        assert!((p.weight_kg(1_500.0) - 15.5).abs() < 1e-12);
        assert!((p.weight_kg(-100.0) + 1.0).abs() < 1e-12);
        assert!((p.weight_kg(3_000.0) - 32.0).abs() < 1e-12);
    }

    #[test]
    fn retare_shifts_linear_zero() {
        let mut m =
            CalibrationModel::new(Some(CalibrationParameters::linear(100.0, 10.0).unwrap()));
        let next = m.tare(&est(150.0)).unwrap().unwrap();
        assert!((next.tare_offset() - 150.0).abs() < 1e-12);
        assert!((m.apply(&est(250.0)).unwrap() - 10.0).abs() < 1e-6);
    }
}
