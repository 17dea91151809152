//! `pedguard-runtime` – The Control Loop
//!
//! Wires the pure rules of `pedguard-kernel` to the transport of
//! `pedguard-middleware` and the logs of `pedguard-recorder`.
//!
//! # Modules
//!
//! - [`control_loop`] – [`ControlLoop`]: poll, staleness check, flush of
//!   delayed transmissions, then decode → decide → debounce → fault → send
//!   for the newest frame.  Owns all mutable state; no locks.
//! - [`dispatch`] – [`Dispatcher`]: the transmission gate applied at actual
//!   send time, in front of a [`CommandSink`][pedguard_middleware::CommandSink].
//! - [`schedule`] – [`Schedule`]: commands held back by an injected delay,
//!   released by the loop once due.
//! - [`console`] – [`Console`]: verbosity-gated operator output.
//! - [`telemetry`] – [`init_tracing`]: the global `tracing` subscriber with
//!   an optional OTLP span exporter.

pub mod console;
pub mod control_loop;
pub mod dispatch;
pub mod schedule;
pub mod telemetry;

pub use console::Console;
pub use control_loop::{ControlLoop, latency_estimate};
pub use dispatch::Dispatcher;
pub use schedule::{Pending, Schedule};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
