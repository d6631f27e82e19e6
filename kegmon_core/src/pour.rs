//! Pour detection over the level stream.
//!
//! ```text
//!   Idle ──first reading──▶ Stable ──N samples below band──▶ Draining
//!                             ▲                                 │ no new low
//!                             │                                 ▼
//!                             └──── settle_ms in band ◀──── Settling
//!                                   (emit if >= min_pour)   │  ▲
//!                                                  new drop └──┘ (back to Draining)
//!
//!   Stable ──N samples under absent_weight_kg──▶ Absent ──N samples back──▶ Stable
//!          (KegRemoved)                                   (KegReplaced)
//! ```
//!
//! Every state falls back to Stable without an event when the level returns to
//! within the noise band of where the drain started (someone leaned on the keg).
//! A sustained rise of at least `min_pour_l` while Stable is reported as a
//! replaced keg; smaller rises only move the reference.

use crate::config::PourCfg;
use crate::types::{KegEvent, LevelReading, PourEvent, RangeFlag};

/// What one reading produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectorEvent {
    Pour(PourEvent),
    Keg(KegEvent),
}

impl DetectorEvent {
    pub fn pour(self) -> Option<PourEvent> {
        match self {
            Self::Pour(p) => Some(p),
            Self::Keg(_) => None,
        }
    }

    pub fn keg(self) -> Option<KegEvent> {
        match self {
            Self::Keg(k) => Some(k),
            Self::Pour(_) => None,
        }
    }
}

/// Consecutive out-of-band samples seen while Stable.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Trend {
    #[default]
    Flat,
    Falling {
        count: u32,
        first_ms: u64,
    },
    Rising {
        count: u32,
    },
    /// Gross weight under `absent_weight_kg`.
    Leaving {
        count: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PourState {
    /// No reading seen yet.
    Idle,
    Stable {
        reference_l: f32,
        trend: Trend,
    },
    Draining {
        start_l: f32,
        start_ms: u64,
        low_l: f32,
    },
    Settling {
        start_l: f32,
        start_ms: u64,
        low_l: f32,
        anchor_l: f32,
        since_ms: u64,
        sum_l: f64,
        samples: u32,
    },
    /// Nothing on the scale. `present` counts readings since a keg reappeared.
    Absent {
        previous_l: Option<f32>,
        present: u32,
    },
}

impl PourState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Stable { .. } => "stable",
            Self::Draining { .. } => "draining",
            Self::Settling { .. } => "settling",
            Self::Absent { .. } => "absent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PourDetector {
    cfg: PourCfg,
    state: PourState,
    /// A reading during the current drain was out of range (keg lifted, overload).
    disturbed: bool,
    last_level_l: Option<f32>,
}

impl PourDetector {
    pub fn new(cfg: PourCfg) -> Self {
        Self {
            cfg,
            state: PourState::Idle,
            disturbed: false,
            last_level_l: None,
        }
    }

    pub fn cfg(&self) -> &PourCfg {
        &self.cfg
    }

    /// New thresholds apply from the next reading; an in-progress drain is kept.
    pub fn set_cfg(&mut self, cfg: PourCfg) {
        self.cfg = cfg;
    }

    pub fn state(&self) -> &PourState {
        &self.state
    }

    /// Level the detector currently measures pours against.
    pub fn reference_l(&self) -> Option<f32> {
        match self.state {
            PourState::Idle | PourState::Absent { .. } => None,
            PourState::Stable { reference_l, .. } => Some(reference_l),
            PourState::Draining { start_l, .. } | PourState::Settling { start_l, .. } => {
                Some(start_l)
            }
        }
    }

    /// Volume drawn so far in the pour in progress; 0 when not pouring.
    pub fn pouring_volume_l(&self) -> f32 {
        match self.state {
            PourState::Draining { start_l, .. } | PourState::Settling { start_l, .. } => self
                .last_level_l
                .map_or(0.0, |l| (start_l - l).max(0.0)),
            _ => 0.0,
        }
    }

    /// Drop any pour in progress, keeping the last stable reference.
    /// A level that is lower once readings resume is then seen as a fresh drain.
    pub fn halt(&mut self) {
        self.state = match self.state {
            PourState::Idle => PourState::Idle,
            PourState::Absent { previous_l, .. } => PourState::Absent {
                previous_l,
                present: 0,
            },
            PourState::Stable { reference_l, .. }
            | PourState::Draining {
                start_l: reference_l,
                ..
            }
            | PourState::Settling {
                start_l: reference_l,
                ..
            } => PourState::Stable {
                reference_l,
                trend: Trend::Flat,
            },
        };
        self.disturbed = false;
    }

    /// Forget everything; the next reading becomes the reference.
    pub fn reset(&mut self) {
        self.state = PourState::Idle;
        self.disturbed = false;
        self.last_level_l = None;
    }

    /// Continue from a known stable level (restart recovery).
    pub fn resume(&mut self, reference_l: f32) {
        if reference_l.is_finite() {
            self.state = PourState::Stable {
                reference_l,
                trend: Trend::Flat,
            };
            self.disturbed = false;
        }
    }

    fn keg_absent(&self, reading: &LevelReading) -> bool {
        reading.weight_kg.is_nan() || reading.weight_kg < self.cfg.absent_weight_kg
    }

    pub fn update(&mut self, reading: &LevelReading) -> Option<DetectorEvent> {
        let level = reading.volume_l;
        let ts = reading.timestamp_ms;
        let noise = self.cfg.noise_threshold_l;
        let confirm = self.cfg.confirm_samples.max(2);
        let absent = self.keg_absent(reading);
        self.last_level_l = Some(level);
        if matches!(self.state, PourState::Draining { .. } | PourState::Settling { .. })
            && reading.range != RangeFlag::InRange
        {
            self.disturbed = true;
        }

        let (next, event) = match self.state {
            PourState::Idle if absent => (
                PourState::Absent {
                    previous_l: None,
                    present: 0,
                },
                None,
            ),
            PourState::Idle => (
                PourState::Stable {
                    reference_l: level,
                    trend: Trend::Flat,
                },
                None,
            ),

            PourState::Absent { previous_l, .. } if absent => (
                PourState::Absent {
                    previous_l,
                    present: 0,
                },
                None,
            ),
            PourState::Absent {
                previous_l,
                present,
            } => {
                if present + 1 >= confirm {
                    tracing::info!(previous_l, level_l = level, "keg back on the scale");
                    (
                        PourState::Stable {
                            reference_l: level,
                            trend: Trend::Flat,
                        },
                        Some(DetectorEvent::Keg(KegEvent::Replaced {
                            timestamp_ms: ts,
                            previous_level_l: previous_l,
                            level_l: level,
                        })),
                    )
                } else {
                    (
                        PourState::Absent {
                            previous_l,
                            present: present + 1,
                        },
                        None,
                    )
                }
            }

            PourState::Stable { reference_l, trend } if absent => {
                let count = match trend {
                    Trend::Leaving { count } => count + 1,
                    _ => 1,
                };
                if count >= confirm {
                    tracing::warn!(level_l = reference_l, "keg removed from the scale");
                    (
                        PourState::Absent {
                            previous_l: Some(reference_l),
                            present: 0,
                        },
                        Some(DetectorEvent::Keg(KegEvent::Removed {
                            timestamp_ms: ts,
                            previous_level_l: reference_l,
                        })),
                    )
                } else {
                    (
                        PourState::Stable {
                            reference_l,
                            trend: Trend::Leaving { count },
                        },
                        None,
                    )
                }
            }

            PourState::Stable { reference_l, trend } => {
                let delta = level - reference_l;
                let next = if delta < -noise {
                    let (count, first_ms) = match trend {
                        Trend::Falling { count, first_ms } => (count + 1, first_ms),
                        _ => (1, ts),
                    };
                    if count >= confirm {
                        tracing::debug!(start_l = reference_l, level_l = level, "pour started");
                        self.disturbed = reading.range != RangeFlag::InRange;
                        PourState::Draining {
                            start_l: reference_l,
                            start_ms: first_ms,
                            low_l: level,
                        }
                    } else {
                        PourState::Stable {
                            reference_l,
                            trend: Trend::Falling { count, first_ms },
                        }
                    }
                } else if delta > noise {
                    let count = match trend {
                        Trend::Rising { count } => count + 1,
                        _ => 1,
                    };
                    if count >= confirm {
                        let stable = PourState::Stable {
                            reference_l: level,
                            trend: Trend::Flat,
                        };
                        if delta >= self.cfg.min_pour_l {
                            tracing::info!(from_l = reference_l, to_l = level, "level rose; keg refilled or replaced");
                            return self.commit(
                                stable,
                                Some(DetectorEvent::Keg(KegEvent::Replaced {
                                    timestamp_ms: ts,
                                    previous_level_l: Some(reference_l),
                                    level_l: level,
                                })),
                            );
                        }
                        tracing::debug!(from_l = reference_l, to_l = level, "reference drifted up");
                        stable
                    } else {
                        PourState::Stable {
                            reference_l,
                            trend: Trend::Rising { count },
                        }
                    }
                } else {
                    PourState::Stable {
                        reference_l,
                        trend: Trend::Flat,
                    }
                };
                (next, None)
            }

            PourState::Draining {
                start_l,
                start_ms,
                low_l,
            } => {
                let next = if level >= start_l - noise {
                    Self::false_pour(start_l)
                } else if level < low_l {
                    PourState::Draining {
                        start_l,
                        start_ms,
                        low_l: level,
                    }
                } else {
                    PourState::Settling {
                        start_l,
                        start_ms,
                        low_l,
                        anchor_l: level,
                        since_ms: ts,
                        sum_l: f64::from(level),
                        samples: 1,
                    }
                };
                (next, None)
            }

            PourState::Settling {
                start_l,
                start_ms,
                low_l,
                anchor_l,
                since_ms,
                sum_l,
                samples,
            } => {
                if level >= start_l - noise {
                    (Self::false_pour(start_l), None)
                } else if level < anchor_l - noise {
                    // Flow resumed before the settle window closed: same pour.
                    (
                        PourState::Draining {
                            start_l,
                            start_ms,
                            low_l: level.min(low_l),
                        },
                        None,
                    )
                } else if level > anchor_l + noise {
                    (
                        PourState::Settling {
                            start_l,
                            start_ms,
                            low_l,
                            anchor_l: level,
                            since_ms: ts,
                            sum_l: f64::from(level),
                            samples: 1,
                        },
                        None,
                    )
                } else {
                    let sum_l = sum_l + f64::from(level);
                    let samples = samples + 1;
                    if ts.saturating_sub(since_ms) >= self.cfg.settle_ms {
                        #[allow(clippy::cast_possible_truncation)]
                        let end_l = (sum_l / f64::from(samples)) as f32;
                        let (next, pour) = self.finish(start_l, start_ms, end_l, since_ms);
                        (next, pour.map(DetectorEvent::Pour))
                    } else {
                        (
                            PourState::Settling {
                                start_l,
                                start_ms,
                                low_l,
                                anchor_l,
                                since_ms,
                                sum_l,
                                samples,
                            },
                            None,
                        )
                    }
                }
            }
        };

        self.commit(next, event)
    }

    fn commit(&mut self, next: PourState, event: Option<DetectorEvent>) -> Option<DetectorEvent> {
        if next.name() != self.state.name() {
            tracing::trace!(from = self.state.name(), to = next.name(), "pour state");
        }
        self.state = next;
        event
    }

    fn false_pour(start_l: f32) -> PourState {
        tracing::debug!(level_l = start_l, "level recovered; not a pour");
        PourState::Stable {
            reference_l: start_l,
            trend: Trend::Flat,
        }
    }

    fn finish(
        &mut self,
        start_l: f32,
        start_ms: u64,
        end_l: f32,
        end_ms: u64,
    ) -> (PourState, Option<PourEvent>) {
        let volume_l = start_l - end_l;
        let stable = PourState::Stable {
            reference_l: end_l,
            trend: Trend::Flat,
        };
        let valid = !self.disturbed;
        self.disturbed = false;
        if volume_l < self.cfg.min_pour_l {
            tracing::debug!(volume_l, "drain below minimum pour; discarded");
            return (stable, None);
        }
        let event = PourEvent {
            start_ms,
            end_ms,
            start_level_l: start_l,
            end_level_l: end_l,
            volume_l,
            valid,
        };
        if valid {
            tracing::info!(volume_l, duration_ms = event.duration_ms(), "pour detected");
        } else {
            tracing::warn!(volume_l, "pour while keg out of range; marked invalid");
        }
        (stable, Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CompensationStatus;

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

    #[test]
    fn single_out_of_band_sample_does_not_leave_stable() {
        let mut d = PourDetector::new(PourCfg::default());
        d.update(&reading(0, 10.0));
        d.update(&reading(1_000, 9.5));
        assert!(matches!(d.state(), PourState::Stable { .. }));
        d.update(&reading(2_000, 10.0));
        assert_eq!(
            *d.state(),
            PourState::Stable {
                reference_l: 10.0,
                trend: Trend::Flat
            }
        );
    }

    #[test]
    fn halt_drops_drain_but_keeps_reference() {
        let mut d = PourDetector::new(PourCfg::default());
        d.update(&reading(0, 10.0));
        d.update(&reading(1_000, 9.7));
        d.update(&reading(2_000, 9.5));
        assert_eq!(d.state().name(), "draining");
        assert!((d.pouring_volume_l() - 0.5).abs() < 1e-6);
        d.halt();
        assert_eq!(d.reference_l(), Some(10.0));
        assert_eq!(d.state().name(), "stable");
    }

    #[test]
    fn sustained_rise_moves_reference() {
        let mut d = PourDetector::new(PourCfg::default());
        d.update(&reading(0, 2.0));
        d.update(&reading(1_000, 19.0));
        d.update(&reading(2_000, 19.0));
        assert_eq!(d.reference_l(), Some(19.0));
    }
}
