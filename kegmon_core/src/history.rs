//! Bounded history of readings and pours, plus running usage statistics.
//!
//! The buffer holds at most `capacity` entries; when full, the oldest entry is
//! evicted to make room (an entry older than everything kept is dropped
//! instead). Statistics are cumulative and updated per event, so they never
//! rescan the buffer and survive eviction.

use std::collections::VecDeque;
use std::ops::RangeInclusive;

use crate::types::{KegEvent, LevelReading, PourEvent};
use crate::util::day_of;

/// Days of per-day usage retained for the weekly figure.
pub const USAGE_DAYS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HistoryEntry {
    Level(LevelReading),
    Pour(PourEvent),
    Keg(KegEvent),
}

impl HistoryEntry {
    /// Ordering key: reading time, or when the pour stopped flowing.
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Level(r) => r.timestamp_ms,
            Self::Pour(p) => p.end_ms,
            Self::Keg(k) => k.timestamp_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayBucket {
    pub day: u64,
    pub volume_l: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UsageStats {
    pub pour_count: u64,
    /// Pours flagged invalid (keg removed mid-pour); not part of the totals.
    pub invalid_pours: u64,
    pub total_volume_l: f64,
    pub min_pour_l: Option<f32>,
    pub max_pour_l: Option<f32>,
    pub last_pour_ms: Option<u64>,
    pub keg_replacements: u64,
    pub last_replacement_ms: Option<u64>,
    /// Ascending by day, at most `USAGE_DAYS` entries.
    pub daily: VecDeque<DayBucket>,
}

impl UsageStats {
    pub fn record_pour(&mut self, pour: &PourEvent) {
        if !pour.valid {
            self.invalid_pours += 1;
            return;
        }
        self.pour_count += 1;
        self.total_volume_l += f64::from(pour.volume_l);
        self.min_pour_l = Some(self.min_pour_l.map_or(pour.volume_l, |m| m.min(pour.volume_l)));
        self.max_pour_l = Some(self.max_pour_l.map_or(pour.volume_l, |m| m.max(pour.volume_l)));
        self.last_pour_ms = Some(self.last_pour_ms.map_or(pour.end_ms, |t| t.max(pour.end_ms)));
        self.add_to_day(day_of(pour.end_ms), f64::from(pour.volume_l));
    }

    pub fn record_keg(&mut self, event: &KegEvent) {
        if let KegEvent::Replaced { timestamp_ms, .. } = *event {
            self.keg_replacements += 1;
            self.last_replacement_ms = Some(
                self.last_replacement_ms
                    .map_or(timestamp_ms, |t| t.max(timestamp_ms)),
            );
        }
    }

    fn add_to_day(&mut self, day: u64, volume_l: f64) {
        let idx = self.daily.partition_point(|b| b.day < day);
        match self.daily.get_mut(idx) {
            Some(b) if b.day == day => b.volume_l += volume_l,
            _ => self.daily.insert(idx, DayBucket { day, volume_l }),
        }
        while self.daily.len() > USAGE_DAYS {
            self.daily.pop_front();
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn average_pour_l(&self) -> Option<f32> {
        (self.pour_count > 0).then(|| (self.total_volume_l / self.pour_count as f64) as f32)
    }

    /// Volume poured on the UTC day containing `now_ms`.
    pub fn daily_usage_l(&self, now_ms: u64) -> f64 {
        let today = day_of(now_ms);
        self.daily
            .iter()
            .find(|b| b.day == today)
            .map_or(0.0, |b| b.volume_l)
    }

    /// Volume poured over the seven UTC days ending with the day containing `now_ms`.
    pub fn weekly_usage_l(&self, now_ms: u64) -> f64 {
        let today = day_of(now_ms);
        let first = today.saturating_sub(USAGE_DAYS as u64 - 1);
        self.daily
            .iter()
            .filter(|b| (first..=today).contains(&b.day))
            .map(|b| b.volume_l)
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct History {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
    latest: Option<LevelReading>,
    stats: UsageStats,
    evicted: u64,
}

impl History {
    /// A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            latest: None,
            stats: UsageStats::default(),
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries dropped to make room since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn latest(&self) -> Option<&LevelReading> {
        self.latest.as_ref()
    }

    pub fn stats(&self) -> &UsageStats {
        &self.stats
    }

    /// Track the newest reading without storing it in the buffer.
    pub fn set_latest(&mut self, reading: LevelReading) {
        if self
            .latest
            .is_none_or(|l| l.timestamp_ms <= reading.timestamp_ms)
        {
            self.latest = Some(reading);
        }
    }

    /// Insert in time order. When full the oldest entry goes, which may be
    /// the new one if it predates everything in the buffer.
    pub fn record(&mut self, entry: HistoryEntry) {
        match &entry {
            HistoryEntry::Level(r) => self.set_latest(*r),
            HistoryEntry::Pour(p) => self.stats.record_pour(p),
            HistoryEntry::Keg(k) => self.stats.record_keg(k),
        }
        let ts = entry.timestamp_ms();
        let mut idx = self.entries.partition_point(|e| e.timestamp_ms() <= ts);
        if self.entries.len() >= self.capacity {
            self.evicted += 1;
            if idx == 0 {
                return;
            }
            self.entries.pop_front();
            idx -= 1;
        }
        self.entries.insert(idx, entry);
    }

    /// Entries whose timestamp falls in `range`, oldest first.
    pub fn query(&self, range: RangeInclusive<u64>) -> Vec<HistoryEntry> {
        let start = self
            .entries
            .partition_point(|e| e.timestamp_ms() < *range.start());
        self.entries
            .range(start..)
            .take_while(|e| e.timestamp_ms() <= *range.end())
            .copied()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Most recent `n` pours, newest first.
    pub fn recent_pours(&self, n: usize) -> Vec<PourEvent> {
        self.entries
            .iter()
            .rev()
            .filter_map(|e| match e {
                HistoryEntry::Pour(p) => Some(*p),
                HistoryEntry::Level(_) | HistoryEntry::Keg(_) => None,
            })
            .take(n)
            .collect()
    }

    /// Reinstate what survived a restart. The buffer itself is not persisted.
    pub fn restore(&mut self, latest: Option<LevelReading>, stats: UsageStats) {
        self.latest = latest;
        self.stats = stats;
    }
}
