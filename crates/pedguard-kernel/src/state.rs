//! Controller state and session counters.
//!
//! [`ControllerState`] is owned by the control loop and lent to each kernel
//! component per call.  Its fields are private: the braking flag moves only
//! through [`ControllerState::record_transmission`], so it always mirrors
//! what was actually put on the wire.

use std::time::{Duration, Instant};

use pedguard_types::Command;
use serde::Serialize;

// ────────────────────────────────────────────────────────────────────────────
// ControllerState
// ────────────────────────────────────────────────────────────────────────────

/// Mutable state of one controller instance.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    braking_active: bool,
    last_tx: Option<(Command, Instant)>,
    last_brake_sent: Option<Instant>,
    last_received: Option<Instant>,
    stale_asserted: bool,
    consecutive_no_pedestrian: u32,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while the last transmitted command was `brake`.
    pub fn braking_active(&self) -> bool {
        self.braking_active
    }

    /// Last successfully transmitted command and when it went out.
    pub fn last_tx(&self) -> Option<(Command, Instant)> {
        self.last_tx
    }

    pub fn last_brake_sent(&self) -> Option<Instant> {
        self.last_brake_sent
    }

    pub fn last_received(&self) -> Option<Instant> {
        self.last_received
    }

    pub fn stale_asserted(&self) -> bool {
        self.stale_asserted
    }

    pub fn consecutive_no_pedestrian(&self) -> u32 {
        self.consecutive_no_pedestrian
    }

    /// Time since the last transmitted brake, `None` if none was ever sent.
    pub fn since_last_brake(&self, now: Instant) -> Option<Duration> {
        self.last_brake_sent
            .map(|t| now.saturating_duration_since(t))
    }

    /// Account for a successfully decoded telemetry frame.
    ///
    /// Refreshes the receive timestamp, ends any stale outage and advances the
    /// consecutive no-pedestrian counter (reset on a detection).
    pub fn observe_frame(&mut self, pedestrian_detected: bool, now: Instant) {
        self.last_received = Some(now);
        self.stale_asserted = false;
        self.consecutive_no_pedestrian = if pedestrian_detected {
            0
        } else {
            self.consecutive_no_pedestrian.saturating_add(1)
        };
    }

    /// Record that `command` was put on the wire at `now`.
    pub fn record_transmission(&mut self, command: Command, now: Instant) {
        self.last_tx = Some((command, now));
        match command {
            Command::Brake => {
                self.braking_active = true;
                self.last_brake_sent = Some(now);
            }
            Command::Resume => self.braking_active = false,
            Command::Slowdown => {}
        }
    }

    /// Mark the current outage as handled by a fail-safe brake.
    pub fn assert_stale(&mut self) {
        self.stale_asserted = true;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stats
// ────────────────────────────────────────────────────────────────────────────

/// Monotonic session counters, reported in the shutdown summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub packets_received: u64,
    pub packets_parsed: u64,
    pub decode_errors: u64,
    pub backlog_batches: u64,
    /// Packets intentionally overwritten by latest-wins draining.
    pub backlog_dropped: u64,
    pub commands_attempted: u64,
    pub commands_sent: u64,
    pub brakes_sent: u64,
    pub resumes_sent: u64,
    pub slowdowns_sent: u64,
    pub flips: u64,
    pub drops: u64,
    pub rate_limited: u64,
    pub send_errors: u64,
    pub stale_enforced: u64,
    pub resume_debounced: u64,
    pub decisions_none: u64,
    pub delays_scheduled: u64,
    pub scheduled_discarded: u64,
    pub total_delay_s: f64,
}

impl Stats {
    /// Count a successful transmission of `command`.
    pub fn count_sent(&mut self, command: Command) {
        self.commands_sent += 1;
        match command {
            Command::Brake => self.brakes_sent += 1,
            Command::Resume => self.resumes_sent += 1,
            Command::Slowdown => self.slowdowns_sent += 1,
        }
    }

    /// Counter names and values in report order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("packets_received", self.packets_received.to_string()),
            ("packets_parsed", self.packets_parsed.to_string()),
            ("decode_errors", self.decode_errors.to_string()),
            ("backlog_batches", self.backlog_batches.to_string()),
            ("backlog_dropped", self.backlog_dropped.to_string()),
            ("commands_attempted", self.commands_attempted.to_string()),
            ("commands_sent", self.commands_sent.to_string()),
            ("brakes_sent", self.brakes_sent.to_string()),
            ("resumes_sent", self.resumes_sent.to_string()),
            ("slowdowns_sent", self.slowdowns_sent.to_string()),
            ("flips", self.flips.to_string()),
            ("drops", self.drops.to_string()),
            ("rate_limited", self.rate_limited.to_string()),
            ("send_errors", self.send_errors.to_string()),
            ("stale_enforced", self.stale_enforced.to_string()),
            ("resume_debounced", self.resume_debounced.to_string()),
            ("decisions_none", self.decisions_none.to_string()),
            ("delays_scheduled", self.delays_scheduled.to_string()),
            ("scheduled_discarded", self.scheduled_discarded.to_string()),
            ("total_delay_s", format!("{:.3}", self.total_delay_s)),
        ]
    }
}
