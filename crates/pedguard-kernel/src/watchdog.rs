//! [`StalenessWatchdog`] – fail-safe backstop against a silent telemetry link.
//!
//! The control loop asks [`StalenessWatchdog::check`] on every iteration,
//! whether or not a packet arrived.  Once the time since the last accepted
//! frame exceeds the timeout, the watchdog calls for a fail-safe brake.  The
//! call repeats each iteration until the brake actually goes out and the loop
//! marks the outage with [`ControllerState::assert_stale`]; the next valid
//! frame re-arms it.

use std::time::{Duration, Instant};

use pedguard_types::CommandPayload;

use crate::state::ControllerState;

/// Verdict of [`StalenessWatchdog::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Telemetry is fresh, never seen, or the outage was already handled.
    Fresh,
    /// Silent for `silent_for`; a fail-safe brake is required.
    Stale { silent_for: Duration },
}

/// Telemetry staleness detector.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use pedguard_kernel::{ControllerState, StalenessWatchdog};
/// use pedguard_kernel::watchdog::Staleness;
///
/// let wd = StalenessWatchdog::new(Duration::from_millis(500));
/// let mut state = ControllerState::new();
/// let t0 = Instant::now();
/// state.observe_frame(false, t0);
///
/// assert_eq!(wd.check(&state, t0 + Duration::from_millis(100)), Staleness::Fresh);
/// assert!(matches!(
///     wd.check(&state, t0 + Duration::from_millis(600)),
///     Staleness::Stale { .. }
/// ));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct StalenessWatchdog {
    timeout: Duration,
}

impl StalenessWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Evaluate the link at `now`.
    ///
    /// Before the first frame the link is not considered stale.
    pub fn check(&self, state: &ControllerState, now: Instant) -> Staleness {
        if state.stale_asserted() {
            return Staleness::Fresh;
        }
        match state.last_received() {
            Some(at) => {
                let silent_for = now.saturating_duration_since(at);
                if silent_for > self.timeout {
                    Staleness::Stale { silent_for }
                } else {
                    Staleness::Fresh
                }
            }
            None => Staleness::Fresh,
        }
    }

    /// Payload forced through the transmission gate on staleness.
    pub fn fail_safe_payload(&self) -> CommandPayload {
        CommandPayload::Brake
    }

    /// Fixed reason attached to fail-safe brakes.
    pub fn reason(&self) -> String {
        format!("no data reached (> {:.2}s)", self.timeout.as_secs_f64())
    }
}
