//! State survives a restart and pour detection resumes from the saved level.

use std::time::Duration;

use kegmon_config::{load_state, save_state};
use kegmon_core::{CalibrationParameters, FilterCfg, HistoryCfg, Pipeline};
use kegmon_hardware::SimulatedLoadCell;
use kegmon_traits::clock::test_clock::TestClock;
use tempfile::tempdir;

fn fast_filter() -> FilterCfg {
    FilterCfg {
        process_noise: 1.0e9,
        measurement_noise: 1.0,
        initial_uncertainty: 1.0,
        min_uncertainty: 1.0e-6,
    }
}

fn raw_for_litres(l: f32) -> i32 {
    ((4.0 + l) * 1_000.0).round() as i32
}

#[test]
fn restored_pipeline_resumes_calibration_stats_and_reference() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.toml");
    let clock = TestClock::new();

    let sim = SimulatedLoadCell::new(raw_for_litres(10.0));
    let cell = sim.handle();
    let mut first = Pipeline::builder()
        .with_load_cell(sim)
        .with_filter(fast_filter())
        .with_history(HistoryCfg {
            level_interval_ms: 0,
            ..HistoryCfg::default()
        })
        .with_calibration(CalibrationParameters::linear(0.0, 1_000.0).unwrap())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    for l in [10.0, 9.8, 9.6, 9.5, 9.5, 9.5, 9.5, 9.5, 9.5, 9.5] {
        cell.set_raw(raw_for_litres(l));
        clock.advance(Duration::from_secs(1));
        first.tick();
    }
    assert_eq!(first.view().snapshot(0).stats.pour_count, 1);
    save_state(&path, &first.persisted_state()).unwrap();
    drop(first);

    // Someone pours a litre while the monitor is down.
    let sim = SimulatedLoadCell::new(raw_for_litres(8.5));
    let mut second = Pipeline::builder()
        .with_load_cell(sim)
        .with_filter(fast_filter())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    assert!(second.calibration().is_none());

    let state = load_state(&path).unwrap().unwrap();
    second.restore(&state);
    assert!(second.calibration().is_some());
    let snap = second.view().snapshot(0);
    assert_eq!(snap.stats.pour_count, 1);
    let latest = snap.latest.unwrap();
    assert!((latest.volume_l - 9.5).abs() < 1e-2);
    assert!((second.detector().reference_l().unwrap() - 9.5).abs() < 1e-2);

    for _ in 0..2 {
        clock.advance(Duration::from_secs(1));
        second.tick();
    }
    assert_eq!(second.detector().state().name(), "draining");
}

#[test]
fn restore_ignores_unusable_calibration() {
    let mut state = kegmon_config::PersistedState::default();
    state.calibration = Some(kegmon_config::PersistedCalibration {
        tare_offset: 0.0,
        scale_factor: 0.0,
        points: Vec::new(),
    });
    let mut p = Pipeline::builder()
        .with_load_cell(SimulatedLoadCell::new(0))
        .with_calibration(CalibrationParameters::linear(10.0, 100.0).unwrap())
        .build()
        .unwrap();
    p.restore(&state);
    assert_eq!(p.calibration().map(CalibrationParameters::scale_factor), Some(100.0));
}

#[test]
fn first_reading_after_restart_matches_the_last_one_before() {
    // Realistic gains: 20_000 counts/kg, zero at 50_000, default filter tuning.
    let raw = |l: f32| 50_000 + ((4.0 + l) * 20_000.0).round() as i32;
    let calibration = || CalibrationParameters::linear(50_000.0, 20_000.0).unwrap();
    let clock = TestClock::new();

    let sim = SimulatedLoadCell::new(raw(9.5));
    sim.handle().set_jitter(2_000);
    let mut first = Pipeline::builder()
        .with_load_cell(sim)
        .with_filter(FilterCfg::default())
        .with_calibration(calibration())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    let mut pre = None;
    for _ in 0..120 {
        clock.advance(Duration::from_millis(500));
        pre = first.tick().reading().copied();
    }
    let pre = pre.expect("reading before restart");
    let state = first.persisted_state();
    drop(first);

    clock.advance(Duration::from_secs(5));
    let sim = SimulatedLoadCell::new(raw(9.5));
    sim.handle().set_jitter(2_000);
    let mut second = Pipeline::builder()
        .with_load_cell(sim)
        .with_filter(FilterCfg::default())
        .with_clock(clock.clone())
        .build()
        .unwrap();
    second.restore(&state);
    clock.advance(Duration::from_millis(500));
    let post = *second.tick().reading().expect("reading right after restart");

    assert!(
        (post.volume_l - pre.volume_l).abs() < 0.15,
        "pre {} L, post {} L",
        pre.volume_l,
        post.volume_l
    );
    assert!((post.volume_l - 9.5).abs() < 0.2);
}
