//! [`ResumeHysteresis`] – debounce for `resume` proposals.
//!
//! A resume only passes when pedestrian absence has held for
//! `frames_needed` consecutive frames **and** at least `min_hold` has elapsed
//! since the last transmitted brake.  Failing either clause turns the
//! proposal into "no command".  Non-resume decisions pass through untouched.

use std::time::{Duration, Instant};

use pedguard_types::{Command, Decision};

use crate::state::ControllerState;

/// Outcome of [`ResumeHysteresis::gate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GateResult {
    pub decision: Decision,
    /// `true` when a resume proposal was vetoed.
    pub debounced: bool,
}

/// Resume debounce policy.
#[derive(Debug, Clone, Copy)]
pub struct ResumeHysteresis {
    frames_needed: u32,
    min_hold: Duration,
}

impl ResumeHysteresis {
    pub fn new(frames_needed: u32, min_hold: Duration) -> Self {
        Self {
            frames_needed,
            min_hold,
        }
    }

    /// Apply the debounce policy to `decision`.
    pub fn gate(&self, decision: Decision, state: &ControllerState, now: Instant) -> GateResult {
        if decision.command != Some(Command::Resume) {
            return GateResult {
                decision,
                debounced: false,
            };
        }

        let mut veto: Option<String> = None;

        let frames = state.consecutive_no_pedestrian();
        if frames < self.frames_needed {
            veto = Some(format!(
                "debounce resume (no_ped_frames={frames}<{})",
                self.frames_needed
            ));
        }

        // A brake that was never sent imposes no hold.
        if let Some(held) = state.since_last_brake(now)
            && held < self.min_hold
        {
            veto = Some(format!(
                "debounce resume (min_hold {:.2}s)",
                self.min_hold.as_secs_f64()
            ));
        }

        match veto {
            Some(reason) => GateResult {
                decision: Decision::new(None, reason),
                debounced: true,
            },
            None => GateResult {
                decision,
                debounced: false,
            },
        }
    }
}
