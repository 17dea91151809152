//! [`Dispatcher`] – the transmission gate in front of the command sink.
//!
//! Every payload that reaches the wire goes through
//! [`Dispatcher::transmit`]: immediate decisions, delayed decisions released
//! by the schedule, and fail-safe brakes from the watchdog alike.  Admission
//! is evaluated at send time, and controller state changes only after the
//! sink reports success.

use std::time::Instant;

use pedguard_kernel::{Admission, ControllerState, Stats, TxGate, TxOutcome};
use pedguard_middleware::CommandSink;
use pedguard_types::CommandPayload;
use tracing::{info, warn};

use crate::console::Console;

pub struct Dispatcher {
    gate: TxGate,
    sink: Box<dyn CommandSink>,
    console: Console,
}

impl Dispatcher {
    pub fn new(gate: TxGate, sink: Box<dyn CommandSink>, console: Console) -> Self {
        Self {
            gate,
            sink,
            console,
        }
    }

    pub fn endpoint(&self) -> String {
        self.sink.endpoint()
    }

    /// Gate and send `payload`.
    ///
    /// Returns [`TxOutcome::Sent`], [`TxOutcome::RateLimited`] or
    /// [`TxOutcome::SendError`].  Transport failures are logged and counted;
    /// they never propagate.
    pub async fn transmit(
        &mut self,
        payload: &CommandPayload,
        reason: &str,
        stamp: &str,
        state: &mut ControllerState,
        stats: &mut Stats,
        now: Instant,
    ) -> TxOutcome {
        if let Admission::RateLimited { last, since } = self.gate.admit(payload, state, stats, now) {
            self.console.rate_limited(stamp, last, since, reason);
            return TxOutcome::RateLimited;
        }

        match self.sink.send(payload).await {
            Ok(()) => {
                self.gate.commit(payload, state, stats, now);
                info!(command = %payload.command(), reason, "command sent");
                self.console.sent(stamp, payload, reason);
                TxOutcome::Sent
            }
            Err(e) => {
                stats.send_errors += 1;
                warn!(command = %payload.command(), error = %e, "command send failed");
                self.console.send_failed(&self.sink.endpoint(), &e.to_string());
                TxOutcome::SendError
            }
        }
    }
}
