//! The adapter seam between the control loop and the outside world.
//!
//! The loop never touches a socket directly.  It pulls raw telemetry from a
//! [`TelemetrySource`] and pushes wire payloads into a [`CommandSink`], so the
//! UDP transport can be swapped for the in-process simulation in
//! [`crate::sim`] without touching any decision logic.

use std::time::Duration;

use async_trait::async_trait;
use pedguard_types::{CommandPayload, GuardError};

/// Result of one drain of the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drained {
    /// The most recent datagram; every earlier one in the burst is discarded.
    pub latest: Vec<u8>,
    /// Datagrams read in this burst (at least one).
    pub received: usize,
}

impl Drained {
    /// Datagrams overwritten by latest-wins.
    pub fn discarded(&self) -> usize {
        self.received.saturating_sub(1)
    }
}

/// Inbound telemetry channel.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Wait up to `max_wait` for telemetry, then drain everything that is
    /// immediately available and keep only the newest payload.
    ///
    /// Returns `None` when nothing arrived in the window.  Must never block
    /// longer than `max_wait`.
    async fn poll_latest(&mut self, max_wait: Duration) -> Option<Drained>;
}

/// Outbound command channel.
#[async_trait]
pub trait CommandSink: Send {
    /// Put `payload` on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Transport`] when the payload could not be sent.
    async fn send(&mut self, payload: &CommandPayload) -> Result<(), GuardError>;

    /// Human-readable destination, e.g. `"192.168.1.25:9001"`.
    fn endpoint(&self) -> String;
}
