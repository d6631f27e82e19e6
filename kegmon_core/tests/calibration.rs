use kegmon_core::{
    CalibrationModel, CalibrationParameters, CalibrationPoint, FilteredEstimate, KegmonError,
};
use proptest::prelude::*;
use rstest::rstest;

fn est(value: f64) -> FilteredEstimate {
    FilteredEstimate {
        timestamp_ms: 0,
        value,
        uncertainty: 1.0,
    }
}

#[test]
fn tare_then_reference_weight_calibrates() {
    let mut m = CalibrationModel::default();
    assert_eq!(m.tare(&est(84_000.0)), Ok(None));
    assert!(!m.is_calibrated());

    let p = m.calibrate(10.0, &est(284_000.0)).unwrap();
    assert!((p.tare_offset() - 84_000.0).abs() < 1e-9);
    assert!((p.scale_factor() - 20_000.0).abs() < 1e-9);
    assert!((m.apply(&est(184_000.0)).unwrap() - 5.0).abs() < 1e-6);
}

#[rstest]
#[case(0.0)]
#[case(-1.0)]
#[case(f32::NAN)]
fn reference_weight_must_be_positive(#[case] kg: f32) {
    let mut m = CalibrationModel::default();
    m.tare(&est(0.0)).unwrap();
    assert!(matches!(
        m.calibrate(kg, &est(1_000.0)),
        Err(KegmonError::InvalidCalibration(_))
    ));
}

#[test]
fn failed_calibration_keeps_previous_parameters() {
    let before = CalibrationParameters::linear(100.0, 50.0).unwrap();
    let mut m = CalibrationModel::new(Some(before.clone()));
    m.tare(&est(100.0)).unwrap();
    // Nothing on the scale: reading equals the tare reading.
    assert!(m.calibrate(5.0, &est(100.0)).is_err());
    assert_eq!(m.parameters(), Some(&before));
}

#[test]
fn calibrate_without_any_zero_is_rejected() {
    let mut m = CalibrationModel::default();
    assert!(matches!(
        m.calibrate(5.0, &est(1_000.0)),
        Err(KegmonError::InvalidCalibration(msg)) if msg.contains("tare")
    ));
}

#[test]
fn multi_point_fit_drops_outlier_and_interpolates() {
    let mut points: Vec<CalibrationPoint> = (0..7)
        .map(|i| {
            let raw = f64::from(i) * 100_000.0;
            CalibrationPoint {
                raw,
                kg: raw / 20_000.0,
            }
        })
        .collect();
    points[3].kg += 3.0;

    let mut m = CalibrationModel::default();
    let p = m.calibrate_points(&points).unwrap();
    assert_eq!(p.points().len(), 6);
    assert!(p.is_piecewise());
    assert!(p.tare_offset().abs() < 1e-6);
    assert!((p.scale_factor() - 20_000.0).abs() < 1e-6);
    assert!((p.weight_kg(300_000.0) - 15.0).abs() < 1e-9);
}

#[test]
fn duplicate_raw_points_are_rejected() {
    let err = CalibrationParameters::with_points(
        0.0,
        1.0,
        vec![
            CalibrationPoint { raw: 1.0, kg: 0.0 },
            CalibrationPoint { raw: 1.0, kg: 1.0 },
        ],
    )
    .unwrap_err();
    assert!(matches!(err, KegmonError::InvalidCalibration(_)));
}

#[test]
fn zero_scale_factor_is_rejected() {
    assert!(CalibrationParameters::linear(0.0, 0.0).is_err());
    assert!(CalibrationParameters::linear(f64::NAN, 1.0).is_err());
}

#[test]
fn retare_keeps_piecewise_shape() {
    let p = CalibrationParameters::with_points(
        1_000.0,
        100.0,
        vec![
            CalibrationPoint { raw: 1_000.0, kg: 0.0 },
            CalibrationPoint { raw: 2_000.0, kg: 10.0 },
            CalibrationPoint { raw: 3_100.0, kg: 20.0 },
        ],
    )
    .unwrap();
    let mut m = CalibrationModel::new(Some(p));
    let shifted = m.tare(&est(1_500.0)).unwrap().unwrap();
    assert!((shifted.weight_kg(1_500.0)).abs() < 1e-9);
    assert!((shifted.weight_kg(2_500.0) - 10.0).abs() < 1e-9);
    assert!((shifted.weight_kg(3_600.0) - 20.0).abs() < 1e-9);
}

proptest! {
    #[test]
    fn linear_model_inverts(tare in -1.0e6f64..1.0e6, scale in 1.0f64..1.0e5, kg in -10.0f64..200.0) {
        let p = CalibrationParameters::linear(tare, scale).unwrap();
        let back = p.weight_kg(p.raw_for(kg));
        prop_assert!((back - kg).abs() < 1e-6 * kg.abs().max(1.0));
    }
}
