//! Record types written by every [`Recorder`](crate::Recorder).

use chrono::{DateTime, Local};
use pedguard_kernel::{Stats, TxOutcome};
use pedguard_types::{Command, FaultConfig, FaultOutcome, GuardConfig, TelemetryFrame, UNKNOWN_SPEED_KMH};
use serde::Serialize;

/// Column names of the CSV log, in [`CycleRecord`] field order.
pub const CSV_HEADER: [&str; 11] = [
    "timestamp",
    "speed_kmh",
    "pedestrian",
    "distance_m",
    "decision",
    "fault",
    "latency_s",
    "delay_s",
    "reason_type",
    "reason_detail",
    "outcome",
];

/// Wall-clock timestamp used in cycle records.
pub fn timestamp(at: DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Session identifier, also the stem of the log file names.
pub fn session_id(started: DateTime<Local>) -> String {
    format!("session_{}", started.format("%Y%m%d-%H%M%S"))
}

/// Split `"category (detail)"` into `("Category", "detail")`.
///
/// The split happens at the first `(`, so nested annotations stay in the
/// detail.  A reason without a trailing parenthesised part becomes the type
/// with an empty detail.
///
/// ```
/// use pedguard_recorder::split_reason;
///
/// assert_eq!(
///     split_reason("dropped command (flipped command (close))"),
///     ("Dropped command".to_string(), "flipped command (close)".to_string())
/// );
/// assert_eq!(split_reason("no pedestrian"), ("No pedestrian".to_string(), String::new()));
/// ```
pub fn split_reason(reason: &str) -> (String, String) {
    let reason = reason.trim();
    if reason.ends_with(')')
        && let Some((head, tail)) = reason.split_once('(')
    {
        let detail = tail[..tail.len() - 1].trim();
        return (capitalize(head.trim()), detail.to_string());
    }
    (capitalize(reason), String::new())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

// ────────────────────────────────────────────────────────────────────────────
// CycleRecord
// ────────────────────────────────────────────────────────────────────────────

/// One row of the session log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    pub timestamp: String,
    pub speed_kmh: f64,
    pub pedestrian: bool,
    pub distance_m: Option<f64>,
    /// Command after hysteresis, before fault injection.
    pub decision: Option<Command>,
    /// `Flip + Drop + Delay=0.12s` or `None`.
    pub fault: String,
    pub latency_s: f64,
    pub delay_s: f64,
    pub reason_type: String,
    pub reason_detail: String,
    pub outcome: TxOutcome,
}

impl CycleRecord {
    /// Record for a decoded frame.
    ///
    /// The reason comes from `fault`, i.e. already annotated with any
    /// injected faults.
    pub fn from_cycle(
        timestamp: String,
        frame: &TelemetryFrame,
        decision: Option<Command>,
        fault: &FaultOutcome,
        latency_s: f64,
        outcome: TxOutcome,
    ) -> Self {
        let (reason_type, reason_detail) = split_reason(&fault.reason);
        Self {
            timestamp,
            speed_kmh: round_to(frame.speed_kmh, 2),
            pedestrian: frame.pedestrian_detected,
            distance_m: frame.distance.value().map(|d| round_to(d, 2)),
            decision,
            fault: fault.summary(),
            latency_s: round_to(latency_s, 3),
            delay_s: round_to(fault.delay.as_secs_f64(), 3),
            reason_type,
            reason_detail,
            outcome,
        }
    }

    /// Record for a delayed transmission released from the schedule.
    ///
    /// There is no frame behind it, so the frame columns carry placeholders
    /// like a stale record.
    pub fn released(
        timestamp: String,
        command: Command,
        reason: &str,
        outcome: TxOutcome,
    ) -> Self {
        let (reason_type, reason_detail) = split_reason(reason);
        Self {
            timestamp,
            speed_kmh: UNKNOWN_SPEED_KMH,
            pedestrian: false,
            distance_m: None,
            decision: Some(command),
            fault: "Delay".to_string(),
            latency_s: 0.0,
            delay_s: 0.0,
            reason_type,
            reason_detail,
            outcome,
        }
    }

    /// Record for a fail-safe brake attempt on stale telemetry.
    pub fn stale(timestamp: String, reason: &str, outcome: TxOutcome) -> Self {
        let (reason_type, reason_detail) = split_reason(reason);
        Self {
            timestamp,
            speed_kmh: UNKNOWN_SPEED_KMH,
            pedestrian: false,
            distance_m: None,
            decision: Some(Command::Brake),
            fault: "None".to_string(),
            latency_s: 0.0,
            delay_s: 0.0,
            reason_type,
            reason_detail,
            outcome,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SessionSummary
// ────────────────────────────────────────────────────────────────────────────

/// End-of-session report: identity, timing, effective config and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_s: f64,
    pub slowdown_enabled: bool,
    pub config: GuardConfig,
    pub stats: Stats,
}

impl SessionSummary {
    pub fn new(
        session_id: impl Into<String>,
        started: DateTime<Local>,
        ended: DateTime<Local>,
        config: &GuardConfig,
        stats: &Stats,
    ) -> Self {
        let duration_ms = (ended - started).num_milliseconds().max(0);
        Self {
            session_id: session_id.into(),
            start_time: started.to_rfc3339(),
            end_time: ended.to_rfc3339(),
            duration_s: duration_ms as f64 / 1000.0,
            slowdown_enabled: config.slowdown_enabled(),
            config: effective_config(config),
            stats: stats.clone(),
        }
    }

    /// Effective configuration flattened to `key = value` pairs
    /// (nested tables become dotted keys).
    pub fn config_entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(value) = serde_json::to_value(&self.config) {
            flatten("", &value, &mut out);
        }
        out
    }
}

/// `config` with the fault parameters actually in force: zeroed under the
/// safety override, delay bounds ordered.
fn effective_config(config: &GuardConfig) -> GuardConfig {
    let faults = config.effective_faults();
    let (delay_min_s, delay_max_s) = faults.delay_range();
    GuardConfig {
        faults: FaultConfig {
            delay_min_s,
            delay_max_s,
            ..faults
        },
        ..config.clone()
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, inner, out);
            }
        }
        serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use pedguard_types::DistanceReading;

    use super::*;

    #[test]
    fn split_reason_handles_plain_and_nested() {
        assert_eq!(
            split_reason("pedestrian within brake range (d=4.00m <= 6.00m)"),
            (
                "Pedestrian within brake range".to_string(),
                "d=4.00m <= 6.00m".to_string()
            )
        );
        assert_eq!(
            split_reason("no data reached (> 0.50s)"),
            ("No data reached".to_string(), "> 0.50s".to_string())
        );
        assert_eq!(split_reason(""), (String::new(), String::new()));
    }

    #[test]
    fn split_reason_requires_closing_paren() {
        assert_eq!(
            split_reason("odd (unterminated"),
            ("Odd (unterminated".to_string(), String::new())
        );
    }

    #[test]
    fn cycle_record_rounds_and_summarises_faults() {
        let frame = TelemetryFrame {
            speed_kmh: 40.1234,
            pedestrian_detected: true,
            distance: DistanceReading::Value(4.005_1),
            send_time: None,
        };
        let fault = FaultOutcome {
            final_command: Some(Command::Resume),
            dropped: false,
            delay: Duration::from_millis(120),
            flipped: true,
            reason: "flipped command (pedestrian within brake range (d=4.01m <= 6.00m))"
                .to_string(),
        };
        let record = CycleRecord::from_cycle(
            "t".to_string(),
            &frame,
            Some(Command::Brake),
            &fault,
            0.012_345,
            TxOutcome::Scheduled,
        );
        assert_eq!(record.speed_kmh, 40.12);
        assert_eq!(record.distance_m, Some(4.01));
        assert_eq!(record.decision, Some(Command::Brake));
        assert_eq!(record.fault, "Flip + Delay=0.12s");
        assert_eq!(record.latency_s, 0.012);
        assert_eq!(record.delay_s, 0.12);
        assert_eq!(record.reason_type, "Flipped command");
        assert_eq!(
            record.reason_detail,
            "pedestrian within brake range (d=4.01m <= 6.00m)"
        );
    }

    #[test]
    fn stale_record_has_fixed_shape() {
        let record = CycleRecord::stale(
            "t".to_string(),
            "no data reached (> 0.50s)",
            TxOutcome::Sent,
        );
        assert_eq!(record.speed_kmh, -1.0);
        assert!(!record.pedestrian);
        assert_eq!(record.distance_m, None);
        assert_eq!(record.decision, Some(Command::Brake));
        assert_eq!(record.fault, "None");
        assert_eq!(record.reason_type, "No data reached");
    }

    #[test]
    fn summary_computes_duration_and_flattens_config() {
        let start = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let end = start + chrono::Duration::milliseconds(2_500);
        let summary = SessionSummary::new(
            session_id(start),
            start,
            end,
            &GuardConfig::default(),
            &Stats::default(),
        );
        assert_eq!(summary.session_id, "session_20260102-030405");
        assert_eq!(summary.duration_s, 2.5);
        assert!(summary.slowdown_enabled);

        let entries = summary.config_entries();
        assert!(entries.contains(&("peer_ip".to_string(), "192.168.1.25".to_string())));
        assert!(entries.contains(&("faults.flip_prob".to_string(), "0.0".to_string())));
        assert!(entries.contains(&("faults.drop_prob".to_string(), "0.0".to_string())));
        assert!(entries.contains(&("safe_mode".to_string(), "true".to_string())));
    }

    #[test]
    fn summary_keeps_active_faults_with_ordered_delay() {
        let start = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let config = GuardConfig {
            safe_mode: false,
            faults: FaultConfig {
                flip_prob: 0.25,
                drop_prob: 0.5,
                delay_min_s: 0.75,
                delay_max_s: 0.25,
            },
            ..GuardConfig::default()
        };
        let summary = SessionSummary::new("s", start, start, &config, &Stats::default());
        assert_eq!(summary.config.faults.flip_prob, 0.25);
        assert_eq!(summary.config.faults.drop_prob, 0.5);
        assert_eq!(summary.config.faults.delay_range(), (0.25, 0.75));
        assert_eq!(summary.config.faults.delay_min_s, 0.25);

        let entries = summary.config_entries();
        assert!(entries.contains(&("faults.flip_prob".to_string(), "0.25".to_string())));
    }

    #[test]
    fn released_record_names_the_delayed_command() {
        let record = CycleRecord::released(
            "t".to_string(),
            Command::Resume,
            "debounce resume (no_ped_frames=0<1)",
            TxOutcome::Cancelled,
        );
        assert_eq!(record.decision, Some(Command::Resume));
        assert_eq!(record.fault, "Delay");
        assert_eq!(record.reason_type, "Debounce resume");
        assert_eq!(record.outcome, TxOutcome::Cancelled);
    }
}
