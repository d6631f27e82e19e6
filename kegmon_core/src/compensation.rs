//! Temperature compensation of the calibrated weight.

use crate::error::KegmonError;
use crate::types::CompensationStatus;

/// Correction polynomial `c[0]*dT + c[1]*dT^2 + ...` in kg, `dT = t - reference_c`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationCurve {
    reference_c: f32,
    coefficients: Vec<f32>,
}

impl CompensationCurve {
    pub fn new(reference_c: f32, coefficients: Vec<f32>) -> Result<Self, KegmonError> {
        if !reference_c.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(KegmonError::Config(
                "compensation curve must be finite".into(),
            ));
        }
        Ok(Self {
            reference_c,
            coefficients,
        })
    }

    pub fn reference_c(&self) -> f32 {
        self.reference_c
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.coefficients
    }

    /// Apparent weight gain at `celsius`; zero at the reference temperature.
    pub fn correction_kg(&self, celsius: f32) -> f32 {
        let dt = celsius - self.reference_c;
        // Horner form of sum(c[i] * dt^(i+1)).
        self.coefficients
            .iter()
            .rev()
            .fold(0.0f32, |acc, c| (acc + c) * dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compensated {
    pub weight_kg: f32,
    pub status: CompensationStatus,
}

#[derive(Debug, Clone, Default)]
pub struct TemperatureCompensator {
    curve: Option<CompensationCurve>,
}

impl TemperatureCompensator {
    pub fn new(curve: Option<CompensationCurve>) -> Self {
        Self { curve }
    }

    pub fn curve(&self) -> Option<&CompensationCurve> {
        self.curve.as_ref()
    }

    pub fn set_curve(&mut self, curve: Option<CompensationCurve>) {
        self.curve = curve;
    }

    /// Whether a temperature is worth reading at all.
    pub fn wants_temperature(&self) -> bool {
        self.curve.is_some()
    }

    /// Missing temperature passes the weight through with a flag instead of failing.
    pub fn compensate(&self, weight_kg: f32, celsius: Option<f32>) -> Compensated {
        let Some(curve) = &self.curve else {
            return Compensated {
                weight_kg,
                status: CompensationStatus::NotConfigured,
            };
        };
        match celsius.filter(|t| t.is_finite()) {
            Some(t) => Compensated {
                weight_kg: weight_kg - curve.correction_kg(t),
                status: CompensationStatus::Applied,
            },
            None => Compensated {
                weight_kg,
                status: CompensationStatus::TemperatureUnavailable,
            },
        }
    }
}
