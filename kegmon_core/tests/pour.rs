//! Pour detection scenarios fed with one level reading per second.

use kegmon_core::{
    CompensationStatus, DetectorEvent, KegEvent, LevelReading, PourCfg, PourDetector, PourEvent,
    PourState, RangeFlag,
};
use proptest::prelude::*;
use rstest::rstest;

fn reading(ts: u64, volume_l: f32) -> LevelReading {
    LevelReading {
        timestamp_ms: ts,
        weight_kg: volume_l + 4.0,
        volume_l,
        level_percent: volume_l / 19.0 * 100.0,
        glasses: volume_l / 0.4,
        range: RangeFlag::InRange,
        compensation: CompensationStatus::NotConfigured,
    }
}

/// Feed `levels` at 1 s spacing starting at t=0 and collect everything emitted.
fn events(d: &mut PourDetector, levels: &[f32]) -> Vec<DetectorEvent> {
    levels
        .iter()
        .enumerate()
        .filter_map(|(i, l)| d.update(&reading(i as u64 * 1_000, *l)))
        .collect()
}

fn run(d: &mut PourDetector, levels: &[f32]) -> Vec<PourEvent> {
    events(d, levels)
        .into_iter()
        .filter_map(DetectorEvent::pour)
        .collect()
}

/// A reading with nothing on the scale.
fn empty_scale(ts: u64) -> LevelReading {
    LevelReading {
        weight_kg: 0.02,
        volume_l: 0.0,
        range: RangeFlag::BelowEmpty,
        ..reading(ts, 0.0)
    }
}

#[rstest]
#[case(&[10.0, 9.97, 10.02, 9.96, 10.0, 9.98, 10.03])]
#[case(&[10.0, 9.9, 10.0, 9.9, 10.0, 9.9, 10.0])]
fn noise_and_isolated_dips_emit_nothing(#[case] levels: &[f32]) {
    let mut d = PourDetector::new(PourCfg::default());
    assert!(run(&mut d, levels).is_empty());
    assert_eq!(d.state().name(), "stable");
    assert_eq!(d.reference_l(), Some(10.0));
}

#[test]
fn single_pour_produces_one_event() {
    let mut d = PourDetector::new(PourCfg::default());
    let events = run(
        &mut d,
        &[10.0, 9.8, 9.6, 9.5, 9.5, 9.5, 9.5, 9.5, 9.5, 9.5],
    );
    assert_eq!(events.len(), 1);
    let p = events[0];
    assert!((p.volume_l - 0.5).abs() < 1e-5);
    assert_eq!(p.start_ms, 1_000);
    assert_eq!(p.end_ms, 4_000);
    assert!((p.start_level_l - 10.0).abs() < f32::EPSILON);
    assert!((p.end_level_l - 9.5).abs() < 1e-5);
    assert!(p.valid);
    assert_eq!(d.reference_l(), Some(9.5));
}

#[test]
fn pause_shorter_than_settle_time_is_one_pour() {
    let mut d = PourDetector::new(PourCfg::default());
    let events = run(
        &mut d,
        &[
            10.0, 9.8, 9.6, 9.5, 9.5, // first draw, 1 s pause
            9.3, 9.1, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
        ],
    );
    assert_eq!(events.len(), 1);
    assert!((events[0].volume_l - 1.0).abs() < 1e-5);
    assert_eq!(events[0].start_ms, 1_000);
}

#[test]
fn pauses_longer_than_settle_time_are_separate_pours() {
    let mut d = PourDetector::new(PourCfg::default());
    let mut levels = vec![10.0, 9.8, 9.6, 9.5];
    levels.extend([9.5; 5]);
    levels.extend([9.3, 9.1, 9.0]);
    levels.extend([9.0; 5]);
    let events = run(&mut d, &levels);
    assert_eq!(events.len(), 2);
    assert!((events[0].volume_l - 0.5).abs() < 1e-5);
    assert!((events[1].volume_l - 0.5).abs() < 1e-5);
    assert!(events[1].start_ms > events[0].end_ms);
}

#[test]
fn level_returning_to_start_is_a_false_pour() {
    let mut d = PourDetector::new(PourCfg::default());
    let events = run(&mut d, &[10.0, 9.8, 9.7, 9.7, 10.0, 10.0, 10.0, 10.0, 10.0]);
    assert!(events.is_empty());
    assert_eq!(
        *d.state(),
        PourState::Stable {
            reference_l: 10.0,
            trend: kegmon_core::pour::Trend::Flat
        }
    );
}

#[test]
fn drain_below_minimum_is_discarded() {
    let mut d = PourDetector::new(PourCfg {
        min_pour_l: 0.2,
        ..PourCfg::default()
    });
    let events = run(&mut d, &[10.0, 9.9, 9.88, 9.88, 9.88, 9.88, 9.88, 9.88]);
    assert!(events.is_empty());
    assert_eq!(d.state().name(), "stable");
    assert!((d.reference_l().unwrap() - 9.88).abs() < 1e-5);
}

#[test]
fn keg_lifted_mid_pour_marks_event_invalid() {
    let mut d = PourDetector::new(PourCfg::default());
    let mut events = run(&mut d, &[10.0, 9.8, 9.6]);
    assert_eq!(d.state().name(), "draining");

    let mut lifted = reading(3_000, 0.0);
    lifted.range = RangeFlag::BelowEmpty;
    assert!(d.update(&lifted).is_none());

    for i in 4..10u64 {
        events.extend(d.update(&reading(i * 1_000, 9.5)).and_then(DetectorEvent::pour));
    }
    assert_eq!(events.len(), 1);
    assert!(!events[0].valid);

    // The next pour is judged on its own.
    for (i, l) in [9.3, 9.1, 9.0, 9.0, 9.0, 9.0, 9.0].iter().enumerate() {
        events.extend(
            d.update(&reading(20_000 + i as u64 * 1_000, *l))
                .and_then(DetectorEvent::pour),
        );
    }
    assert_eq!(events.len(), 2);
    assert!(events[1].valid);
}

#[test]
fn pouring_volume_tracks_drain_in_progress() {
    let mut d = PourDetector::new(PourCfg::default());
    run(&mut d, &[10.0, 9.8, 9.6, 9.4]);
    assert!((d.pouring_volume_l() - 0.6).abs() < 1e-5);
}

#[test]
fn reset_reanchors_on_next_reading() {
    let mut d = PourDetector::new(PourCfg::default());
    run(&mut d, &[10.0, 9.8, 9.6]);
    d.reset();
    assert_eq!(*d.state(), PourState::Idle);
    d.update(&reading(10_000, 5.0));
    assert_eq!(d.reference_l(), Some(5.0));
}

#[test]
fn keg_swap_reports_removal_then_replacement() {
    let mut d = PourDetector::new(PourCfg::default());
    assert!(events(&mut d, &[3.0, 3.0]).is_empty());

    // One empty reading is a bump, two are a removal.
    assert!(d.update(&empty_scale(2_000)).is_none());
    assert_eq!(
        d.update(&empty_scale(3_000)),
        Some(DetectorEvent::Keg(KegEvent::Removed {
            timestamp_ms: 3_000,
            previous_level_l: 3.0
        }))
    );
    assert_eq!(d.state().name(), "absent");
    assert_eq!(d.reference_l(), None);
    for ts in [4_000, 5_000] {
        assert!(d.update(&empty_scale(ts)).is_none());
    }

    assert!(d.update(&reading(6_000, 19.0)).is_none());
    assert_eq!(
        d.update(&reading(7_000, 19.0)),
        Some(DetectorEvent::Keg(KegEvent::Replaced {
            timestamp_ms: 7_000,
            previous_level_l: Some(3.0),
            level_l: 19.0
        }))
    );
    assert_eq!(d.reference_l(), Some(19.0));

    // Pours on the new keg are measured from its level.
    let pours = run(&mut d, &[19.0, 18.6, 18.5, 18.5, 18.5, 18.5, 18.5, 18.5]);
    assert_eq!(pours.len(), 1);
    assert!((pours[0].start_level_l - 19.0).abs() < 1e-5);
}

#[test]
fn starting_with_an_empty_scale_waits_for_a_keg() {
    let mut d = PourDetector::new(PourCfg::default());
    assert!(d.update(&empty_scale(0)).is_none());
    assert_eq!(d.state().name(), "absent");
    d.update(&reading(1_000, 12.0));
    let placed = d.update(&reading(2_000, 12.0)).and_then(DetectorEvent::keg);
    assert!(matches!(
        placed,
        Some(KegEvent::Replaced {
            previous_level_l: None,
            ..
        })
    ));
}

#[rstest]
#[case(&[10.0, 10.08, 10.08, 10.08], 0)]
#[case(&[5.0, 19.0, 19.0, 19.0], 1)]
fn rise_is_a_replacement_only_when_large(#[case] levels: &[f32], #[case] swaps: usize) {
    let mut d = PourDetector::new(PourCfg::default());
    let got = events(&mut d, levels);
    assert_eq!(got.iter().filter_map(|e| e.keg()).count(), swaps);
    assert_eq!(d.reference_l(), levels.last().copied());
}

#[test]
fn halt_while_absent_stays_absent() {
    let mut d = PourDetector::new(PourCfg::default());
    d.update(&reading(0, 8.0));
    d.update(&empty_scale(1_000));
    d.update(&empty_scale(2_000));
    d.update(&reading(3_000, 8.0));
    d.halt();
    assert_eq!(
        *d.state(),
        PourState::Absent {
            previous_l: Some(8.0),
            present: 0
        }
    );
}

const START_L: f32 = 10.0;

/// Level `base` plus bounded noise taken from `jitter` (values in [-1, 1]).
fn noisy(base: f32, amplitude: f32, jitter: &[f32], i: usize) -> f32 {
    base + amplitude * jitter[i % jitter.len()]
}

proptest! {
    #[test]
    fn drops_below_minimum_never_emit(
        drop_l in 0.0f32..0.06,
        amplitude in 0.0f32..0.015,
        jitter in proptest::collection::vec(-1.0f32..=1.0, 1..40),
    ) {
        let mut d = PourDetector::new(PourCfg::default());
        let levels: Vec<f32> = (0..30)
            .map(|i| {
                let base = if i < 5 { START_L } else { START_L - drop_l };
                noisy(base, amplitude, &jitter, i)
            })
            .collect();
        prop_assert!(events(&mut d, &levels).is_empty());
    }

    #[test]
    fn settled_drop_emits_exactly_one_pour(
        drop_l in 0.15f32..3.0,
        ramp in 1usize..6,
        amplitude in 0.0f32..0.015,
        settle_s in 1u64..6,
        jitter in proptest::collection::vec(-1.0f32..=1.0, 1..40),
    ) {
        let cfg = PourCfg { settle_ms: settle_s * 1_000, ..PourCfg::default() };
        let mut d = PourDetector::new(cfg);
        // Keep each ramp step well outside the noise band.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ramp = ramp.min((drop_l / 0.1) as usize).max(1);
        let hold = settle_s as usize + 10;
        #[allow(clippy::cast_precision_loss)]
        let levels: Vec<f32> = (0..5 + ramp + hold)
            .map(|i| {
                let poured = if i < 5 {
                    0.0
                } else {
                    drop_l * ((i - 4).min(ramp) as f32 / ramp as f32)
                };
                noisy(START_L - poured, amplitude, &jitter, i)
            })
            .collect();
        let pours = run(&mut d, &levels);
        prop_assert_eq!(pours.len(), 1);
        prop_assert!(
            (pours[0].volume_l - drop_l).abs() <= 2.0 * amplitude + 1e-3,
            "poured {} measured {}", drop_l, pours[0].volume_l
        );
        prop_assert!(pours[0].valid);
    }

    #[test]
    fn short_pause_keeps_one_pour(
        first_l in 0.15f32..1.0,
        second_l in 0.15f32..1.0,
        settle_s in 2u64..6,
        pause_frac in 0.0f64..1.0,
        amplitude in 0.0f32..0.015,
        jitter in proptest::collection::vec(-1.0f32..=1.0, 1..40),
    ) {
        let cfg = PourCfg { settle_ms: settle_s * 1_000, ..PourCfg::default() };
        let mut d = PourDetector::new(cfg);
        // 1..settle_s-1 samples at 1 s spacing: always under the settle time.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let pause = 1 + (pause_frac * (settle_s - 1) as f64) as usize;
        let pause = pause.min(settle_s as usize - 1);
        let mut bases = vec![START_L; 5];
        bases.extend(std::iter::repeat_n(START_L - first_l, 1 + pause));
        bases.extend(std::iter::repeat_n(START_L - first_l - second_l, settle_s as usize + 10));
        let levels: Vec<f32> = bases
            .iter()
            .enumerate()
            .map(|(i, b)| noisy(*b, amplitude, &jitter, i))
            .collect();
        let pours = run(&mut d, &levels);
        prop_assert_eq!(pours.len(), 1);
        prop_assert!((pours[0].volume_l - (first_l + second_l)).abs() <= 2.0 * amplitude + 1e-3);
    }
}
