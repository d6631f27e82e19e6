//! Text and JSON-lines rendering for everything the CLI prints on stdout.

use kegmon_core::{
    DeviceStatus, KegEvent, LevelReading, OutboundMessage, PourEvent, Snapshot, UsageStats,
};
use serde_json::{Value, json};

pub fn level_json(r: &LevelReading) -> Value {
    json!({
        "type": "level",
        "timestamp_ms": r.timestamp_ms,
        "weight_kg": r.weight_kg,
        "volume_l": r.volume_l,
        "level_percent": r.level_percent,
        "glasses": r.glasses,
        "range": r.range.as_str(),
        "compensation": r.compensation.as_str(),
    })
}

pub fn pour_json(p: &PourEvent) -> Value {
    json!({
        "type": "pour",
        "start_ms": p.start_ms,
        "end_ms": p.end_ms,
        "duration_ms": p.duration_ms(),
        "start_level_l": p.start_level_l,
        "end_level_l": p.end_level_l,
        "volume_l": p.volume_l,
        "valid": p.valid,
    })
}

pub fn keg_json(k: &KegEvent) -> Value {
    match *k {
        KegEvent::Removed {
            timestamp_ms,
            previous_level_l,
        } => json!({
            "type": k.name(),
            "timestamp_ms": timestamp_ms,
            "previous_level_l": previous_level_l,
        }),
        KegEvent::Replaced {
            timestamp_ms,
            previous_level_l,
            level_l,
        } => json!({
            "type": k.name(),
            "timestamp_ms": timestamp_ms,
            "previous_level_l": previous_level_l,
            "level_l": level_l,
        }),
    }
}

pub fn status_json(s: &DeviceStatus) -> Value {
    let error = match s {
        DeviceStatus::Stale { error, .. } | DeviceStatus::Fault(error) => Some(error.to_string()),
        _ => None,
    };
    json!({ "type": "status", "status": s.name(), "error": error })
}

pub fn message_json(msg: &OutboundMessage) -> Value {
    match msg {
        OutboundMessage::Level(r) => level_json(r),
        OutboundMessage::Pour(p) => pour_json(p),
        OutboundMessage::Keg(k) => keg_json(k),
        OutboundMessage::Status(s) => status_json(s),
    }
}

pub fn message_text(msg: &OutboundMessage) -> String {
    match msg {
        OutboundMessage::Level(r) => {
            let mut line = format!(
                "level: {:.1}% {:.2} L ({:.1} glasses, {:.2} kg)",
                r.level_percent, r.volume_l, r.glasses, r.weight_kg
            );
            if r.reduced_confidence() {
                line.push_str(&format!(
                    " [{}, compensation {}]",
                    r.range.as_str(),
                    r.compensation.as_str()
                ));
            }
            line
        }
        OutboundMessage::Pour(p) if p.valid => format!(
            "pour: {:.2} L in {:.1} s ({:.2} L -> {:.2} L)",
            p.volume_l,
            p.duration_ms() as f64 / 1000.0,
            p.start_level_l,
            p.end_level_l
        ),
        OutboundMessage::Pour(p) => format!(
            "pour discarded: keg left the scale after {:.1} s",
            p.duration_ms() as f64 / 1000.0
        ),
        OutboundMessage::Keg(KegEvent::Removed {
            previous_level_l, ..
        }) => format!("keg removed (was {previous_level_l:.2} L)"),
        OutboundMessage::Keg(KegEvent::Replaced { level_l, .. }) => {
            format!("keg replaced: {level_l:.2} L")
        }
        OutboundMessage::Status(s) => match s {
            DeviceStatus::Stale { error, .. } => format!("status: stale ({error})"),
            DeviceStatus::Fault(error) => format!("status: fault ({error})"),
            other => format!("status: {}", other.name()),
        },
    }
}

pub fn print_message(msg: &OutboundMessage, json: bool) {
    if json {
        println!("{}", message_json(msg));
    } else {
        println!("{}", message_text(msg));
    }
}

fn stats_json(stats: &UsageStats, now_ms: u64) -> Value {
    json!({
        "pour_count": stats.pour_count,
        "invalid_pours": stats.invalid_pours,
        "total_volume_l": stats.total_volume_l,
        "average_pour_l": stats.average_pour_l(),
        "min_pour_l": stats.min_pour_l,
        "max_pour_l": stats.max_pour_l,
        "last_pour_ms": stats.last_pour_ms,
        "keg_replacements": stats.keg_replacements,
        "last_replacement_ms": stats.last_replacement_ms,
        "daily_usage_l": stats.daily_usage_l(now_ms),
        "weekly_usage_l": stats.weekly_usage_l(now_ms),
    })
}

fn stats_text(stats: &UsageStats, now_ms: u64) -> String {
    let mut out = format!(
        "pours: {} ({} discarded), total {:.2} L",
        stats.pour_count, stats.invalid_pours, stats.total_volume_l
    );
    if let Some(avg) = stats.average_pour_l() {
        out.push_str(&format!(", average {avg:.2} L"));
    }
    out.push_str(&format!(
        "\nusage: {:.2} L today, {:.2} L this week",
        stats.daily_usage_l(now_ms),
        stats.weekly_usage_l(now_ms)
    ));
    if stats.keg_replacements > 0 {
        out.push_str(&format!("\nkegs replaced: {}", stats.keg_replacements));
    }
    out
}

/// Summary of the monitor's view, printed when `run` stops and by `status`.
/// Without `live` the snapshot comes from the state file and has no device status.
pub fn print_summary(kind: &str, snapshot: &Snapshot, live: bool, now_ms: u64, json: bool) {
    let status = if live { snapshot.status.name() } else { "offline" };
    if json {
        let obj = json!({
            "type": kind,
            "status": status,
            "calibrated": snapshot.is_calibrated(),
            "pour_state": snapshot.pour_state,
            "latest": snapshot.latest.as_ref().map(level_json),
            "stats": stats_json(&snapshot.stats, now_ms),
        });
        println!("{obj}");
        return;
    }
    println!(
        "status: {}{}",
        status,
        if snapshot.is_calibrated() { "" } else { " (not calibrated)" }
    );
    match &snapshot.latest {
        Some(r) => println!("{}", message_text(&OutboundMessage::Level(*r))),
        None => println!("level: unknown"),
    }
    println!("{}", stats_text(&snapshot.stats, now_ms));
}
