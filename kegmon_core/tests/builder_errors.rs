use kegmon_core::error::BuildError;
use kegmon_core::mocks::NoopLoadCell;
use kegmon_core::{HistoryCfg, KegCfg, Pipeline, PlausibilityCfg, Timeouts};
use rstest::rstest;
use std::time::Duration;

#[rstest]
fn builder_missing_load_cell_yields_typed_build_error() {
    let err = Pipeline::builder()
        .with_keg(KegCfg::default())
        .try_build()
        .expect_err("should fail with MissingLoadCell");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingLoadCell) => {}
        other => panic!("expected MissingLoadCell, got: {other:?}"),
    }
}

fn expect_invalid(result: kegmon_core::Result<Pipeline>, needle: &str) {
    let err = result.expect_err("config should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[rstest]
#[case(0.0, 1.0, 0.4, "capacity_l")]
#[case(19.0, 0.0, 0.4, "density_kg_per_l")]
#[case(19.0, 1.0, 0.0, "glass_volume_l")]
#[case(f32::NAN, 1.0, 0.4, "capacity_l")]
fn keg_geometry_is_validated(
    #[case] capacity_l: f32,
    #[case] density_kg_per_l: f32,
    #[case] glass_volume_l: f32,
    #[case] needle: &str,
) {
    let keg = KegCfg {
        capacity_l,
        density_kg_per_l,
        glass_volume_l,
        ..KegCfg::default()
    };
    expect_invalid(
        Pipeline::builder()
            .with_load_cell(NoopLoadCell)
            .with_keg(keg)
            .build(),
        needle,
    );
}

#[test]
fn inverted_plausibility_window_is_rejected() {
    expect_invalid(
        Pipeline::builder()
            .with_load_cell(NoopLoadCell)
            .with_plausibility(PlausibilityCfg {
                min_weight_kg: 50.0,
                max_weight_kg: 10.0,
            })
            .build(),
        "min_weight_kg",
    );
}

#[test]
fn zero_capacities_and_timeouts_are_rejected() {
    expect_invalid(
        Pipeline::builder()
            .with_load_cell(NoopLoadCell)
            .with_history(HistoryCfg {
                capacity: 0,
                ..HistoryCfg::default()
            })
            .build(),
        "history capacity",
    );
    expect_invalid(
        Pipeline::builder()
            .with_load_cell(NoopLoadCell)
            .with_timeouts(Timeouts {
                sensor: Duration::ZERO,
            })
            .build(),
        "sensor timeout",
    );
}

#[test]
fn defaults_build_uncalibrated() {
    let p = Pipeline::builder()
        .with_load_cell(NoopLoadCell)
        .build()
        .unwrap();
    assert!(p.calibration().is_none());
    assert_eq!(p.status().name(), "starting");
    assert!(!p.has_thermometer());
}
