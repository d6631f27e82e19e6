//! End-to-end ticks through the full pipeline with simulated sensors.

use std::time::Duration;

use kegmon_core::{
    CalibrationParameters, Command, CommandReply, CompensationCurve, CompensationStatus,
    DeviceStatus, FaultCfg, FilterCfg, HistoryCfg, KegEvent, KegmonError, OutboundMessage,
    Pipeline, PourCfg, RangeFlag, TickOutcome,
};
use kegmon_hardware::{SimLoadCellHandle, SimulatedLoadCell, SimulatedThermometer};
use kegmon_traits::clock::test_clock::TestClock;

/// Near pass-through filter so each tick reflects the simulated raw value.
fn fast_filter() -> FilterCfg {
    FilterCfg {
        process_noise: 1.0e9,
        measurement_noise: 1.0,
        initial_uncertainty: 1.0,
        min_uncertainty: 1.0e-6,
    }
}

/// 1000 counts per kg, zero at raw 0. Default keg: 4 kg empty, 19 l.
fn calibration() -> CalibrationParameters {
    CalibrationParameters::linear(0.0, 1_000.0).unwrap()
}

fn raw_for_litres(l: f32) -> i32 {
    ((4.0 + l) * 1_000.0).round() as i32
}

struct Rig {
    pipeline: Pipeline,
    cell: SimLoadCellHandle,
    clock: TestClock,
}

fn rig(calibrated: bool) -> Rig {
    let clock = TestClock::new();
    let sim = SimulatedLoadCell::new(raw_for_litres(10.0));
    let cell = sim.handle();
    let mut b = Pipeline::builder()
        .with_load_cell(sim)
        .with_filter(fast_filter())
        .with_fault(FaultCfg { max_stale_ms: 5_000 })
        .with_history(HistoryCfg {
            level_interval_ms: 0,
            ..HistoryCfg::default()
        })
        .with_clock(clock.clone());
    if calibrated {
        b = b.with_calibration(calibration());
    }
    Rig {
        pipeline: b.build().unwrap(),
        cell,
        clock,
    }
}

impl Rig {
    fn tick_after(&mut self, ms: u64) -> TickOutcome {
        self.clock.advance(Duration::from_millis(ms));
        self.pipeline.tick()
    }
}

#[test]
fn uncalibrated_pipeline_fails_closed() {
    let mut r = rig(false);
    let out = r.tick_after(500);
    assert!(matches!(out, TickOutcome::Uncalibrated { .. }));
    assert!(out.reading().is_none());
    let view = r.pipeline.view();
    assert!(view.latest().is_none());
    assert_eq!(view.status(), DeviceStatus::Uncalibrated);
    assert!(view.snapshot(5).estimate.is_some());
}

#[test]
fn calibrated_tick_produces_level() {
    let mut r = rig(true);
    let out = r.tick_after(500);
    let reading = *out.reading().unwrap();
    assert!((reading.volume_l - 10.0).abs() < 1e-3);
    assert!((reading.weight_kg - 14.0).abs() < 1e-3);
    assert_eq!(reading.range, RangeFlag::InRange);
    assert_eq!(reading.compensation, CompensationStatus::NotConfigured);
    assert_eq!(r.pipeline.view().latest(), Some(reading));
    assert_eq!(r.pipeline.status(), &DeviceStatus::Ok);
}

#[test]
fn implausible_sample_is_rejected_and_last_reading_served() {
    let mut r = rig(true);
    r.tick_after(500);
    r.cell.set_raw(5_000_000); // 5 t on a keg scale
    let out = r.tick_after(500);
    match out {
        TickOutcome::Stale { last, error } => {
            assert!(last.is_some());
            assert_eq!(error, KegmonError::Implausible { raw: 5_000_000 });
        }
        other => panic!("expected stale, got {other:?}"),
    }
}

#[test]
fn sensor_outage_goes_stale_then_fault_then_recovers() {
    let mut r = rig(true);
    r.tick_after(500);
    r.cell.set_disconnected(true);

    let out = r.tick_after(1_000);
    assert!(matches!(out, TickOutcome::Stale { last: Some(_), .. }));
    assert_eq!(r.pipeline.status().name(), "stale");

    let out = r.tick_after(5_000);
    assert!(matches!(out, TickOutcome::Fault(KegmonError::PipelineFault(_))));
    assert!(r.pipeline.status().is_fault());

    r.cell.set_disconnected(false);
    let out = r.tick_after(500);
    assert!(matches!(out, TickOutcome::Reading { .. }));
    assert_eq!(r.pipeline.status(), &DeviceStatus::Ok);

    let statuses: Vec<&'static str> = r
        .pipeline
        .outbound()
        .subscriber()
        .try_iter()
        .filter_map(|m| match m {
            OutboundMessage::Status(s) => Some(s.name()),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec!["ok", "stale", "fault", "ok"]);
}

#[test]
fn pour_flows_to_history_and_outbound() {
    let mut r = rig(true);
    for l in [10.0, 9.8, 9.6, 9.5, 9.5, 9.5, 9.5, 9.5, 9.5, 9.5] {
        r.cell.set_raw(raw_for_litres(l));
        r.tick_after(1_000);
    }
    let snap = r.pipeline.view().snapshot(5);
    assert_eq!(snap.stats.pour_count, 1);
    assert_eq!(snap.recent_pours.len(), 1);
    assert!((snap.recent_pours[0].volume_l - 0.5).abs() < 1e-2);
    assert_eq!(snap.pour_state, "stable");

    let pours = r
        .pipeline
        .outbound()
        .subscriber()
        .try_iter()
        .filter(|m| matches!(m, OutboundMessage::Pour(_)))
        .count();
    assert_eq!(pours, 1);
}

#[test]
fn fault_halts_detector_but_keeps_reference() {
    let mut r = rig(true);
    r.tick_after(1_000);
    r.tick_after(1_000);
    r.cell.set_disconnected(true);
    r.tick_after(6_000);
    assert!(r.pipeline.status().is_fault());
    // Level reference survives the fault so a pour during the outage is still seen.
    assert_eq!(r.pipeline.detector().reference_l().map(|l| (l * 10.0).round()), Some(100.0));
}

#[test]
fn tare_and_calibrate_commands() {
    let mut r = rig(false);
    assert_eq!(r.pipeline.apply(Command::Tare), Err(KegmonError::NoEstimate));

    r.cell.set_raw(50_000);
    r.pipeline.capture(5).unwrap();
    match r.pipeline.apply(Command::Tare).unwrap() {
        CommandReply::Tared {
            zero_raw,
            recalibrated,
        } => {
            assert!((zero_raw - 50_000.0).abs() < 1.0);
            assert!(recalibrated.is_none());
        }
        other => panic!("unexpected reply {other:?}"),
    }

    r.cell.set_raw(70_000);
    r.pipeline.capture(5).unwrap();
    let params = match r.pipeline.apply(Command::Calibrate { known_kg: 10.0 }).unwrap() {
        CommandReply::Calibrated(p) => p,
        other => panic!("unexpected reply {other:?}"),
    };
    assert!((params.scale_factor() - 2_000.0).abs() < 1.0);
    assert!(r.pipeline.take_dirty());
    assert!(r.pipeline.view().snapshot(0).is_calibrated());

    let out = r.tick_after(500);
    assert!((out.reading().unwrap().weight_kg - 10.0).abs() < 1e-2);
}

#[test]
fn clearing_calibration_fails_closed_again() {
    let mut r = rig(true);
    r.tick_after(500);
    assert_eq!(
        r.pipeline.apply(Command::ClearCalibration),
        Ok(CommandReply::Cleared)
    );
    assert!(matches!(r.tick_after(500), TickOutcome::Uncalibrated { .. }));
}

#[test]
fn compensation_is_flagged_on_each_reading() {
    let clock = TestClock::new();
    let probe = SimulatedThermometer::new(25.0);
    let probe_handle = probe.handle();
    let mut p = Pipeline::builder()
        .with_load_cell(SimulatedLoadCell::new(raw_for_litres(10.0)))
        .with_thermometer(probe)
        .with_filter(fast_filter())
        .with_calibration(calibration())
        .with_compensation(CompensationCurve::new(20.0, vec![0.02]).unwrap())
        .with_clock(clock.clone())
        .build()
        .unwrap();

    let r = *p.tick().reading().unwrap();
    assert_eq!(r.compensation, CompensationStatus::Applied);
    assert!((r.weight_kg - 13.9).abs() < 1e-3);

    probe_handle.set(None);
    clock.advance(Duration::from_millis(500));
    let r = *p.tick().reading().unwrap();
    assert_eq!(r.compensation, CompensationStatus::TemperatureUnavailable);
    assert!((r.weight_kg - 14.0).abs() < 1e-3);
    assert!(r.reduced_confidence());

    p.apply(Command::SetCompensation(None)).unwrap();
    clock.advance(Duration::from_millis(500));
    let r = *p.tick().reading().unwrap();
    assert_eq!(r.compensation, CompensationStatus::NotConfigured);
}

#[test]
fn out_of_range_reading_is_clamped_and_flagged() {
    let mut r = rig(true);
    r.cell.set_raw(1_000); // 1 kg: lighter than the empty keg
    let reading = *r.tick_after(500).reading().unwrap();
    assert_eq!(reading.range, RangeFlag::BelowEmpty);
    assert_eq!(reading.volume_l, 0.0);
}

#[test]
fn capture_averages_over_failed_reads() {
    use kegmon_core::mocks::ScriptedLoadCell;

    let mut pipeline = Pipeline::builder()
        .with_load_cell(ScriptedLoadCell::new([None, Some(1_000), None, Some(1_000)]))
        .with_filter(fast_filter())
        .with_clock(TestClock::new())
        .build()
        .unwrap();
    let estimate = pipeline.capture(4).unwrap();
    assert!((estimate.value - 1_000.0).abs() < 1e-6);
    assert_eq!(pipeline.sensor_errors(), 2);
    assert_eq!(pipeline.raw_stats().count, 2);

    let mut dead = Pipeline::builder()
        .with_load_cell(ScriptedLoadCell::new([None]))
        .with_clock(TestClock::new())
        .build()
        .unwrap();
    assert_eq!(dead.capture(3), Err(KegmonError::Timeout));
}

#[test]
fn keg_swap_flows_to_history_stats_and_outbound() {
    let mut r = rig(true);
    r.tick_after(1_000);
    r.tick_after(1_000);

    r.cell.set_raw(0);
    r.tick_after(1_000);
    let removed = r.tick_after(1_000);
    assert!(matches!(
        removed.keg(),
        Some(KegEvent::Removed { previous_level_l, .. }) if (previous_level_l - 10.0).abs() < 1e-2
    ));
    assert_eq!(r.pipeline.view().snapshot(0).pour_state, "absent");

    r.cell.set_raw(raw_for_litres(19.0));
    r.tick_after(1_000);
    r.tick_after(1_000);
    assert!(r.pipeline.take_dirty());

    let snap = r.pipeline.view().snapshot(5);
    assert_eq!(snap.stats.keg_replacements, 1);
    assert_eq!(snap.stats.pour_count, 0);
    assert_eq!(snap.pour_state, "stable");

    let kegs: Vec<KegEvent> = r
        .pipeline
        .outbound()
        .subscriber()
        .try_iter()
        .filter_map(|m| match m {
            OutboundMessage::Keg(k) => Some(k),
            _ => None,
        })
        .collect();
    assert_eq!(kegs.len(), 2);
    assert_eq!(kegs[0].name(), "keg_removed");
    assert!(matches!(
        kegs[1],
        KegEvent::Replaced { level_l, previous_level_l: Some(_), .. } if (level_l - 19.0).abs() < 1e-2
    ));
}

#[test]
fn pour_settings_apply_to_the_running_detector() {
    let mut r = rig(true);
    let cfg = PourCfg {
        min_pour_l: 0.25,
        absent_weight_kg: 2.0,
        ..PourCfg::default()
    };
    assert_eq!(
        Command::SetPourCfg(cfg),
        Command::SetPourCfg(PourCfg {
            min_pour_l: 0.25,
            absent_weight_kg: 2.0,
            ..PourCfg::default()
        })
    );
    assert_ne!(Command::SetPourCfg(cfg), Command::SetPourCfg(PourCfg::default()));
    assert_eq!(
        r.pipeline.apply(Command::SetPourCfg(cfg)),
        Ok(CommandReply::Updated)
    );
    assert_eq!(*r.pipeline.detector().cfg(), cfg);
}
