//! [`TxGate`] – admission rules for outgoing commands.
//!
//! The gate decides whether a payload may go on the wire and, once it has,
//! records the transmission in [`ControllerState`] and [`Stats`].  The I/O
//! itself is performed by the runtime's transmitter between
//! [`TxGate::admit`] and [`TxGate::commit`].
//!
//! Rate limiting is change-only + cooldown: a payload is suppressed when its
//! command equals the last *transmitted* command and the cooldown since that
//! transmission has not yet elapsed.  It is evaluated at send time, so
//! identical consecutive decisions are throttled without edge detection
//! upstream.

use std::fmt;
use std::time::{Duration, Instant};

use pedguard_types::{Command, CommandPayload};
use serde::Serialize;

use crate::state::{ControllerState, Stats};

/// Map a command onto its wire payload.
///
/// `slowdown` requires a numeric distance; without one nothing is sent.
pub fn map_to_payload(command: Option<Command>, distance_used: Option<f64>) -> Option<CommandPayload> {
    match command? {
        Command::Brake => Some(CommandPayload::Brake),
        Command::Resume => Some(CommandPayload::Resume),
        Command::Slowdown => distance_used
            .filter(|d| d.is_finite())
            .map(CommandPayload::slowdown),
    }
}

/// Verdict of [`TxGate::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    /// Same command already sent `since` ago, within the cooldown.
    RateLimited { last: Command, since: Duration },
}

/// What finally happened to a cycle's command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxOutcome {
    Sent,
    RateLimited,
    SendError,
    /// Nothing to send (no command, or slowdown without distance).
    #[serde(rename = "no_cmd")]
    NoCommand,
    /// Discarded by the fault injector.
    Dropped,
    /// Queued for delayed transmission.
    Scheduled,
    /// Delayed transmission withdrawn at release time.
    Cancelled,
}

impl TxOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxOutcome::Sent => "sent",
            TxOutcome::RateLimited => "rate_limited",
            TxOutcome::SendError => "send_error",
            TxOutcome::NoCommand => "no_cmd",
            TxOutcome::Dropped => "dropped",
            TxOutcome::Scheduled => "scheduled",
            TxOutcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change-only + cooldown rate limiter.
#[derive(Debug, Clone, Copy)]
pub struct TxGate {
    cooldown: Duration,
}

impl TxGate {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Check `payload` against the last transmitted command.
    ///
    /// A rate-limited verdict is counted in `stats`.
    pub fn admit(
        &self,
        payload: &CommandPayload,
        state: &ControllerState,
        stats: &mut Stats,
        now: Instant,
    ) -> Admission {
        if let Some((last, at)) = state.last_tx() {
            let since = now.saturating_duration_since(at);
            if last == payload.command() && since < self.cooldown {
                stats.rate_limited += 1;
                return Admission::RateLimited { last, since };
            }
        }
        Admission::Admit
    }

    /// Record that `payload` was transmitted at `now`.
    pub fn commit(
        &self,
        payload: &CommandPayload,
        state: &mut ControllerState,
        stats: &mut Stats,
        now: Instant,
    ) {
        let command = payload.command();
        state.record_transmission(command, now);
        stats.count_sent(command);
    }
}
