//! `pedguard-kernel` – Safety Decision Core
//!
//! Everything in this crate is synchronous and free of I/O.  Time is passed
//! in explicitly as an [`Instant`][std::time::Instant] so that every rule can
//! be exercised deterministically.
//!
//! # Modules
//!
//! - [`state`] – [`ControllerState`][state::ControllerState] and
//!   [`Stats`][state::Stats]: the single-owner mutable state of the control
//!   loop.  `braking_active` can only change through a recorded transmission.
//! - [`decision_engine`] – [`decide`][decision_engine::decide]: maps a
//!   telemetry frame and the current braking flag onto a candidate command.
//! - [`hysteresis`] – [`ResumeHysteresis`][hysteresis::ResumeHysteresis]:
//!   vetoes `resume` until pedestrian absence has been sustained and the
//!   minimum brake hold has elapsed.
//! - [`fault_injector`] – [`FaultInjector`][fault_injector::FaultInjector]:
//!   probabilistic flip / drop / delay driven by an injectable
//!   [`EntropySource`][fault_injector::EntropySource].
//! - [`tx_gate`] – [`TxGate`][tx_gate::TxGate]: payload mapping and the
//!   change-only + cooldown admission rule.
//! - [`watchdog`] – [`StalenessWatchdog`][watchdog::StalenessWatchdog]:
//!   detects a silent telemetry link and calls for a fail-safe brake.

pub mod decision_engine;
pub mod fault_injector;
pub mod hysteresis;
pub mod state;
pub mod tx_gate;
pub mod watchdog;

pub use decision_engine::decide;
pub use fault_injector::{EntropySource, FaultInjector, RngEntropy, ScriptedEntropy};
pub use hysteresis::{GateResult, ResumeHysteresis};
pub use state::{ControllerState, Stats};
pub use tx_gate::{Admission, TxGate, TxOutcome, map_to_payload};
pub use watchdog::{Staleness, StalenessWatchdog};
