//! Operator console output.
//!
//! This is UX, not logging: structured events go through `tracing`, while
//! these lines are what an operator watches scroll by.  Verbosity decides
//! what is printed; failures are always printed.

use std::time::Duration;

use colored::Colorize;
use pedguard_types::{Command, CommandPayload, DistanceReading, TelemetryFrame, Verbosity};

#[derive(Debug, Clone, Copy)]
pub struct Console {
    verbosity: Verbosity,
}

fn describe(payload: &CommandPayload) -> String {
    match payload {
        CommandPayload::Slowdown { distance } => format!("SLOWDOWN d={distance:.2}m"),
        other => other.command().as_str().to_uppercase(),
    }
}

impl Console {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn frame(&self, stamp: &str, frame: &TelemetryFrame) {
        if !self.verbosity.shows_frames() {
            return;
        }
        let dist = match frame.distance {
            DistanceReading::Value(d) => format!("{d:.1}"),
            DistanceReading::Absent => "None".to_string(),
            DistanceReading::Malformed => "malformed".to_string(),
        };
        println!(
            "[{stamp}] Speed={:.1} | Pedestrian={} | Dist={dist}",
            frame.speed_kmh, frame.pedestrian_detected
        );
    }

    pub fn no_tx(&self, stamp: &str, why: &str) {
        if self.verbosity.shows_frames() {
            println!("[{stamp}] ==> No TX ({})", why.dimmed());
        }
    }

    pub fn rate_limited(&self, stamp: &str, last: Command, since: Duration, reason: &str) {
        if self.verbosity.shows_frames() {
            println!(
                "[{stamp}] ==> No TX (rate-limited, last='{last}', dt={:.2}s) ({reason})",
                since.as_secs_f64()
            );
        }
    }

    pub fn sent(&self, stamp: &str, payload: &CommandPayload, reason: &str) {
        if !self.verbosity.shows_sends() {
            return;
        }
        let label = format!("SENT {}", describe(payload));
        let label = match payload.command() {
            Command::Brake => label.red().bold(),
            Command::Slowdown => label.yellow().bold(),
            Command::Resume => label.green().bold(),
        };
        println!("[{stamp}] ==> {label} ({reason})");
    }

    pub fn delayed(&self, stamp: &str, payload: &CommandPayload, delay: Duration, reason: &str) {
        if self.verbosity.shows_frames() {
            println!(
                "[{stamp}] ==> {} {} by {:.2}s ({reason})",
                "DELAYED".cyan(),
                describe(payload),
                delay.as_secs_f64()
            );
        }
    }

    pub fn decode_failed(&self, stamp: &str, error: &str) {
        if self.verbosity.shows_frames() {
            println!("[{stamp}] {} {error}", "undecodable telemetry:".yellow());
        }
    }

    pub fn send_failed(&self, endpoint: &str, error: &str) {
        println!("{} send to {endpoint} failed: {error}", "[ERROR]".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_payloads_for_operators() {
        assert_eq!(describe(&CommandPayload::Brake), "BRAKE");
        assert_eq!(describe(&CommandPayload::Resume), "RESUME");
        assert_eq!(describe(&CommandPayload::slowdown(9.5)), "SLOWDOWN d=9.50m");
    }

    #[test]
    fn quiet_console_prints_nothing_but_does_not_panic() {
        let console = Console::new(Verbosity::Quiet);
        console.frame("t", &TelemetryFrame::default());
        console.sent("t", &CommandPayload::Brake, "reason");
        assert_eq!(console.verbosity(), Verbosity::Quiet);
    }
}
