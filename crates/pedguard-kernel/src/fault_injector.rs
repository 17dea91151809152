//! [`FaultInjector`] – post-decision chaos for resilience testing.
//!
//! Three independent faults can hit a non-empty command:
//!
//! - **flip** (`brake` ↔ `resume` only; `slowdown` is never altered),
//! - **drop** (the command is computed but must not be transmitted),
//! - **delay** (uniform draw from the configured range; applied even when the
//!   command is dropped).
//!
//! Randomness comes from an [`EntropySource`] so tests can script exact
//! outcomes.  With the safety override active the injector is a
//! pass-through that never consults its entropy source.
//!
//! # Example
//!
//! ```
//! use pedguard_kernel::{FaultInjector, ScriptedEntropy};
//! use pedguard_types::{Command, FaultConfig};
//!
//! let faults = FaultConfig { flip_prob: 0.5, drop_prob: 0.0, delay_min_s: 0.0, delay_max_s: 0.0 };
//! // First draw (0.1) is below flip_prob, second (0.9) is above drop_prob.
//! let mut injector = FaultInjector::new(faults, Box::new(ScriptedEntropy::new(vec![0.1, 0.9])));
//!
//! let outcome = injector.inject(Some(Command::Brake), "pedestrian within brake range");
//! assert!(outcome.flipped);
//! assert_eq!(outcome.final_command, Some(Command::Resume));
//! ```

use std::collections::VecDeque;

use pedguard_types::{Command, FaultConfig, FaultOutcome, GuardConfig, secs};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Entropy
// ────────────────────────────────────────────────────────────────────────────

/// Source of uniform samples in `[0, 1)`.
pub trait EntropySource: Send {
    fn next_unit(&mut self) -> f64;
}

/// [`EntropySource`] backed by any `rand` generator.
pub struct RngEntropy<R: RngCore + Send>(R);

impl<R: RngCore + Send> RngEntropy<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }
}

impl RngEntropy<StdRng> {
    /// Generator seeded from the operating system.
    pub fn from_os() -> Self {
        Self(StdRng::from_entropy())
    }
}

impl<R: RngCore + Send> EntropySource for RngEntropy<R> {
    fn next_unit(&mut self) -> f64 {
        self.0.r#gen::<f64>()
    }
}

/// Replays a fixed sequence of samples, cycling when exhausted.
///
/// An empty script yields a value just below `1.0`, which never triggers a
/// fault with probability below one.
pub struct ScriptedEntropy {
    script: VecDeque<f64>,
}

impl ScriptedEntropy {
    const FALLBACK: f64 = 0.999_999;

    pub fn new(values: Vec<f64>) -> Self {
        Self {
            script: values.into(),
        }
    }
}

impl EntropySource for ScriptedEntropy {
    fn next_unit(&mut self) -> f64 {
        match self.script.pop_front() {
            Some(v) => {
                self.script.push_back(v);
                v
            }
            None => Self::FALLBACK,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FaultInjector
// ────────────────────────────────────────────────────────────────────────────

/// Applies flip / drop / delay faults to outgoing commands.
pub struct FaultInjector {
    faults: FaultConfig,
    /// `false` under the safety override.
    enabled: bool,
    entropy: Box<dyn EntropySource>,
}

impl FaultInjector {
    /// Injector applying `faults` with samples from `entropy`.
    pub fn new(faults: FaultConfig, entropy: Box<dyn EntropySource>) -> Self {
        Self {
            faults,
            enabled: true,
            entropy,
        }
    }

    /// Injector that never alters anything (safety override).
    pub fn disabled() -> Self {
        Self {
            faults: FaultConfig::NONE,
            enabled: false,
            entropy: Box::new(ScriptedEntropy::new(Vec::new())),
        }
    }

    /// Build from the controller configuration, honouring `safe_mode`.
    pub fn from_config(config: &GuardConfig, entropy: Box<dyn EntropySource>) -> Self {
        if config.safe_mode {
            Self::disabled()
        } else {
            Self::new(config.effective_faults(), entropy)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Parameters in force (all zero when disabled).
    pub fn faults(&self) -> FaultConfig {
        self.faults
    }

    /// Run `command` through the configured faults.
    ///
    /// `None` commands, and every command while disabled, come back
    /// unchanged with zero delay.
    pub fn inject(&mut self, command: Option<Command>, reason: &str) -> FaultOutcome {
        let Some(original) = command else {
            return FaultOutcome::untouched(None, reason);
        };
        if !self.enabled {
            return FaultOutcome::untouched(command, reason);
        }

        let mut outcome = FaultOutcome::untouched(command, reason);

        if matches!(original, Command::Brake | Command::Resume)
            && self.entropy.next_unit() < self.faults.flip_prob
        {
            let flipped = match original {
                Command::Brake => Command::Resume,
                _ => Command::Brake,
            };
            outcome.final_command = Some(flipped);
            outcome.flipped = true;
            outcome.reason = format!("flipped command ({reason})");
        }

        if self.entropy.next_unit() < self.faults.drop_prob {
            outcome.dropped = true;
            outcome.reason = format!("dropped command ({})", outcome.reason);
        }

        let (low, high) = self.faults.delay_range();
        if high > 0.0 && low >= 0.0 {
            let u = self.entropy.next_unit();
            outcome.delay = secs(low + u * (high - low));
        }

        if outcome != FaultOutcome::untouched(command, reason) {
            debug!(
                original = %original,
                flipped = outcome.flipped,
                dropped = outcome.dropped,
                delay_s = outcome.delay.as_secs_f64(),
                "fault injected"
            );
        }
        outcome
    }
}
