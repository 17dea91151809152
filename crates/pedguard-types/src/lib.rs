//! `pedguard-types` – shared data model for the PedGuard controller.
//!
//! Every other crate in the workspace speaks in these types: inbound
//! [`TelemetryFrame`]s, the [`Command`]s the controller can issue, their wire
//! form ([`CommandPayload`]), the engine's [`Decision`], the
//! [`FaultOutcome`] produced by chaos injection, and the immutable
//! [`GuardConfig`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

/// A command the controller may transmit to the braking actuator.
///
/// "No command" is modelled as `Option::<Command>::None` throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Brake,
    Slowdown,
    Resume,
}

impl Command {
    /// Lower-case wire name (`"brake"`, `"slowdown"`, `"resume"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Brake => "brake",
            Command::Slowdown => "slowdown",
            Command::Resume => "resume",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact JSON body sent to the vehicle endpoint.
///
/// Serialises as `{"cmd":"brake"}`, `{"cmd":"resume"}` or
/// `{"cmd":"slowdown","distance":7.25}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum CommandPayload {
    Brake,
    Resume,
    Slowdown { distance: f64 },
}

impl CommandPayload {
    /// Build a slowdown payload, rounding `distance` to two decimals.
    pub fn slowdown(distance: f64) -> Self {
        CommandPayload::Slowdown {
            distance: (distance * 100.0).round() / 100.0,
        }
    }

    /// The [`Command`] this payload carries.
    pub fn command(&self) -> Command {
        match self {
            CommandPayload::Brake => Command::Brake,
            CommandPayload::Resume => Command::Resume,
            CommandPayload::Slowdown { .. } => Command::Slowdown,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry
// ─────────────────────────────────────────────────────────────────────────────

/// Speed reported when the sender omitted it or sent garbage.
pub const UNKNOWN_SPEED_KMH: f64 = -1.0;

/// Distance-to-pedestrian estimate as received on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DistanceReading {
    /// Field missing or `null`.
    #[default]
    Absent,
    /// A number was supplied.  May still be negative.
    Value(f64),
    /// A value was supplied but could not be interpreted as a number.
    Malformed,
}

impl DistanceReading {
    /// Numeric value, if one was supplied.
    pub fn value(&self) -> Option<f64> {
        match self {
            DistanceReading::Value(d) => Some(*d),
            _ => None,
        }
    }
}

/// One decoded inbound observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    /// Vehicle speed in km/h, [`UNKNOWN_SPEED_KMH`] when unknown.
    pub speed_kmh: f64,
    pub pedestrian_detected: bool,
    pub distance: DistanceReading,
    /// Sender-side epoch timestamp (seconds), used for latency estimation.
    pub send_time: Option<f64>,
}

impl Default for TelemetryFrame {
    fn default() -> Self {
        Self {
            speed_kmh: UNKNOWN_SPEED_KMH,
            pedestrian_detected: false,
            distance: DistanceReading::Absent,
            send_time: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision pipeline outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Output of the decision engine (and, after gating, of the hysteresis
/// controller).
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub command: Option<Command>,
    /// Human-readable `"category (detail)"` explanation.
    pub reason: String,
    /// Distance that drove the decision; carried in slowdown payloads.
    pub distance_used: Option<f64>,
}

impl Decision {
    pub fn new(command: Option<Command>, reason: impl Into<String>) -> Self {
        Self {
            command,
            reason: reason.into(),
            distance_used: None,
        }
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance_used = Some(distance);
        self
    }
}

/// Result of running a command through the fault injector.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultOutcome {
    /// Command after a possible flip.
    pub final_command: Option<Command>,
    /// Computed but must not be transmitted.
    pub dropped: bool,
    pub delay: Duration,
    pub flipped: bool,
    /// Reason annotated with any applied faults.
    pub reason: String,
}

impl FaultOutcome {
    /// An outcome that leaves `command` and `reason` untouched.
    pub fn untouched(command: Option<Command>, reason: impl Into<String>) -> Self {
        Self {
            final_command: command,
            dropped: false,
            delay: Duration::ZERO,
            flipped: false,
            reason: reason.into(),
        }
    }

    /// `"Flip + Drop + Delay=0.12s"` style summary, or `"None"`.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.flipped {
            parts.push("Flip".to_string());
        }
        if self.dropped {
            parts.push("Drop".to_string());
        }
        if !self.delay.is_zero() {
            parts.push(format!("Delay={:.2}s", self.delay.as_secs_f64()));
        }
        if parts.is_empty() {
            "None".to_string()
        } else {
            parts.join(" + ")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Console output granularity.  Never affects decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Every frame, every send and every suppressed transmission.
    #[default]
    All,
    /// Successful sends only.
    Sends,
    /// Nothing beyond errors.
    Quiet,
}

impl Verbosity {
    pub fn shows_frames(&self) -> bool {
        matches!(self, Verbosity::All)
    }

    pub fn shows_sends(&self) -> bool {
        matches!(self, Verbosity::All | Verbosity::Sends)
    }
}

impl FromStr for Verbosity {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Verbosity::All),
            "sends" => Ok(Verbosity::Sends),
            "quiet" => Ok(Verbosity::Quiet),
            other => Err(GuardError::Config(format!("unknown verbosity '{other}'"))),
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verbosity::All => f.write_str("all"),
            Verbosity::Sends => f.write_str("sends"),
            Verbosity::Quiet => f.write_str("quiet"),
        }
    }
}

/// How an injected delay fault is realised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayMode {
    /// The delayed command is queued and transmitted by the loop once due;
    /// intake and the staleness watchdog keep running meanwhile.
    #[default]
    Scheduled,
    /// The whole control loop sleeps for the delay before transmitting.
    Blocking,
}

impl FromStr for DelayMode {
    type Err = GuardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(DelayMode::Scheduled),
            "blocking" => Ok(DelayMode::Blocking),
            other => Err(GuardError::Config(format!("unknown delay mode '{other}'"))),
        }
    }
}

impl fmt::Display for DelayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DelayMode::Scheduled => f.write_str("scheduled"),
            DelayMode::Blocking => f.write_str("blocking"),
        }
    }
}

/// Fault-injection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Probability of swapping brake and resume.
    #[serde(default = "default_flip_prob")]
    pub flip_prob: f64,
    /// Probability of discarding an outgoing command.
    #[serde(default = "default_drop_prob")]
    pub drop_prob: f64,
    #[serde(default)]
    pub delay_min_s: f64,
    #[serde(default)]
    pub delay_max_s: f64,
}

impl FaultConfig {
    /// All faults disabled.
    pub const NONE: FaultConfig = FaultConfig {
        flip_prob: 0.0,
        drop_prob: 0.0,
        delay_min_s: 0.0,
        delay_max_s: 0.0,
    };

    /// Delay bounds ordered so that `low <= high`.
    pub fn delay_range(&self) -> (f64, f64) {
        (
            self.delay_min_s.min(self.delay_max_s),
            self.delay_min_s.max(self.delay_max_s),
        )
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            flip_prob: default_flip_prob(),
            drop_prob: default_drop_prob(),
            delay_min_s: 0.0,
            delay_max_s: 0.0,
        }
    }
}

/// Distance thresholds used by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub brake_range_m: f64,
    pub slowdown_start_m: f64,
}

impl Thresholds {
    /// Slowdown is reachable only when its start distance lies beyond the
    /// brake range.
    pub fn slowdown_enabled(&self) -> bool {
        self.brake_range_m < self.slowdown_start_m
    }
}

/// Process-wide controller configuration, immutable after startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_listen_ip")]
    pub listen_ip: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Address of the vehicle endpoint that receives commands.
    #[serde(default = "default_peer_ip")]
    pub peer_ip: String,
    #[serde(default = "default_peer_port")]
    pub peer_port: u16,

    #[serde(default = "default_brake_range_m")]
    pub brake_range_m: f64,
    #[serde(default = "default_slowdown_start_m")]
    pub slowdown_start_m: f64,

    #[serde(default = "default_cooldown_s")]
    pub cooldown_s: f64,
    #[serde(default = "default_stale_timeout_s")]
    pub stale_timeout_s: f64,
    /// Consecutive no-pedestrian frames required before a resume.
    #[serde(default = "default_no_ped_frames")]
    pub no_ped_frames: u32,
    #[serde(default = "default_min_brake_hold_s")]
    pub min_brake_hold_s: f64,

    #[serde(default)]
    pub faults: FaultConfig,
    /// Forces every fault probability and delay to zero.
    #[serde(default = "default_safe_mode")]
    pub safe_mode: bool,
    #[serde(default)]
    pub delay_mode: DelayMode,

    #[serde(default)]
    pub verbosity: Verbosity,
    /// Directory receiving the CSV / JSON-lines session logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Upper bound on one socket poll.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on datagrams drained per poll.
    #[serde(default = "default_max_drain")]
    pub max_drain: usize,
}

fn default_listen_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    9000
}
fn default_peer_ip() -> String {
    "192.168.1.25".to_string()
}
fn default_peer_port() -> u16 {
    9001
}
fn default_brake_range_m() -> f64 {
    6.0
}
fn default_slowdown_start_m() -> f64 {
    15.0
}
fn default_cooldown_s() -> f64 {
    0.20
}
fn default_stale_timeout_s() -> f64 {
    0.50
}
fn default_no_ped_frames() -> u32 {
    5
}
fn default_min_brake_hold_s() -> f64 {
    0.50
}
fn default_flip_prob() -> f64 {
    0.20
}
fn default_drop_prob() -> f64 {
    0.10
}
fn default_safe_mode() -> bool {
    true
}
fn default_log_dir() -> String {
    "~/csv".to_string()
}
fn default_poll_interval_ms() -> u64 {
    50
}
fn default_max_drain() -> usize {
    1024
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            listen_ip: default_listen_ip(),
            listen_port: default_listen_port(),
            peer_ip: default_peer_ip(),
            peer_port: default_peer_port(),
            brake_range_m: default_brake_range_m(),
            slowdown_start_m: default_slowdown_start_m(),
            cooldown_s: default_cooldown_s(),
            stale_timeout_s: default_stale_timeout_s(),
            no_ped_frames: default_no_ped_frames(),
            min_brake_hold_s: default_min_brake_hold_s(),
            faults: FaultConfig::default(),
            safe_mode: default_safe_mode(),
            delay_mode: DelayMode::default(),
            verbosity: Verbosity::default(),
            log_dir: default_log_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            max_drain: default_max_drain(),
        }
    }
}

impl GuardConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            brake_range_m: self.brake_range_m,
            slowdown_start_m: self.slowdown_start_m,
        }
    }

    pub fn slowdown_enabled(&self) -> bool {
        self.thresholds().slowdown_enabled()
    }

    /// Fault parameters actually in force: all zero under `safe_mode`.
    pub fn effective_faults(&self) -> FaultConfig {
        if self.safe_mode {
            FaultConfig::NONE
        } else {
            self.faults
        }
    }

    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_s)
    }

    pub fn stale_timeout(&self) -> Duration {
        secs(self.stale_timeout_s)
    }

    pub fn min_brake_hold(&self) -> Duration {
        secs(self.min_brake_hold_s)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.listen_port)
    }

    pub fn peer_addr(&self) -> String {
        format!("{}:{}", self.peer_ip, self.peer_port)
    }
}

/// Convert a seconds value from configuration into a [`Duration`].
///
/// Negative and NaN inputs map to zero; values too large to represent
/// saturate.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error taxonomy shared across the workspace.
///
/// Decode, transport and recorder failures are recoverable: the control loop
/// logs and counts them and keeps watching for stale telemetry.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Telemetry Decode Error: {0}")]
    Decode(String),

    #[error("Transport Error on {endpoint}: {details}")]
    Transport { endpoint: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Recorder Error: {0}")]
    Recorder(String),
}
