//! `pedguard-middleware` – Datagram Plumbing
//!
//! Moves bytes between the vehicle endpoint and the controller without
//! caring what the commands mean.
//!
//! # Modules
//!
//! - [`adapter`] – the [`TelemetrySource`] and [`CommandSink`] traits the
//!   control loop is written against.
//! - [`decoder`] – [`decode`]: permissive JSON telemetry parsing that never
//!   panics on malformed input.
//! - [`udp`] – [`UdpTelemetrySource`] (bounded-wait poll with latest-wins
//!   backlog draining) and [`UdpCommandSink`].
//! - [`sim`] – in-process source and sink for tests and dry runs without a
//!   vehicle on the other end.

pub mod adapter;
pub mod decoder;
pub mod sim;
pub mod udp;

pub use adapter::{CommandSink, Drained, TelemetrySource};
pub use decoder::{DecodeError, decode};
pub use sim::{SimCommandSink, SimTelemetryFeed, SimTelemetrySource};
pub use udp::{RECV_BUFFER_BYTES, UdpCommandSink, UdpTelemetrySource};
