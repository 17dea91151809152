//! In-process transport for tests and dry runs without a vehicle.
//!
//! [`SimTelemetrySource`] is fed through a cloneable [`SimTelemetryFeed`];
//! [`SimCommandSink`] records every payload it is asked to send and can be
//! told to fail the next few sends.  Both sides share their buffers through
//! `Arc<Mutex<_>>`, so a test can keep a handle after moving the source or
//! sink into the control loop.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use pedguard_middleware::{SimCommandSink, SimTelemetrySource, TelemetrySource};
//!
//! # tokio_test_block_on(async {
//! let (mut source, feed) = SimTelemetrySource::new(1024);
//! feed.push(br#"{"pedestrian_detected":false}"#.to_vec());
//! let drained = source.poll_latest(Duration::ZERO).await.unwrap();
//! assert_eq!(drained.received, 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pedguard_types::{CommandPayload, GuardError};

use crate::adapter::{CommandSink, Drained, TelemetrySource};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Source
// ────────────────────────────────────────────────────────────────────────────

/// Producer handle for a [`SimTelemetrySource`].
#[derive(Clone, Default)]
pub struct SimTelemetryFeed {
    queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl SimTelemetryFeed {
    /// Queue one raw datagram.
    pub fn push(&self, raw: impl Into<Vec<u8>>) {
        lock(&self.queue).push_back(raw.into());
    }

    /// Datagrams queued and not yet polled.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

/// Telemetry source backed by an in-memory queue.
pub struct SimTelemetrySource {
    feed: SimTelemetryFeed,
    max_drain: usize,
}

impl SimTelemetrySource {
    /// Create a source and the feed that drives it.
    pub fn new(max_drain: usize) -> (Self, SimTelemetryFeed) {
        let feed = SimTelemetryFeed::default();
        (
            Self {
                feed: feed.clone(),
                max_drain: max_drain.max(1),
            },
            feed,
        )
    }
}

#[async_trait]
impl TelemetrySource for SimTelemetrySource {
    async fn poll_latest(&mut self, max_wait: Duration) -> Option<Drained> {
        let drained = {
            let mut queue = lock(&self.feed.queue);
            let take = queue.len().min(self.max_drain);
            let latest = queue.drain(..take).last();
            latest.map(|latest| Drained {
                latest,
                received: take,
            })
        };
        if drained.is_none() && !max_wait.is_zero() {
            tokio::time::sleep(max_wait).await;
        }
        drained
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sink
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SinkLog {
    sent: Vec<CommandPayload>,
    fail_next: usize,
}

/// Command sink that records instead of transmitting.
#[derive(Clone, Default)]
pub struct SimCommandSink {
    log: Arc<Mutex<SinkLog>>,
}

impl SimCommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads successfully "sent" so far, oldest first.
    pub fn sent(&self) -> Vec<CommandPayload> {
        lock(&self.log).sent.clone()
    }

    /// Make the next `n` sends fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        lock(&self.log).fail_next = n;
    }
}

#[async_trait]
impl CommandSink for SimCommandSink {
    async fn send(&mut self, payload: &CommandPayload) -> Result<(), GuardError> {
        let mut log = lock(&self.log);
        if log.fail_next > 0 {
            log.fail_next -= 1;
            return Err(GuardError::Transport {
                endpoint: self.endpoint(),
                details: "simulated send failure".to_string(),
            });
        }
        log.sent.push(payload.clone());
        Ok(())
    }

    fn endpoint(&self) -> String {
        "sim".to_string()
    }
}
