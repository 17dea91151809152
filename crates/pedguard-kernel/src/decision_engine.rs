//! Threshold-based decision engine.
//!
//! [`decide`] is a pure function of the frame, the current braking flag and
//! the configured [`Thresholds`].  Rules, in priority order:
//!
//! 1. Pedestrian with a usable distance `d`: brake inside the brake range,
//!    slow down inside the slowdown zone (when enabled), otherwise nothing.
//! 2. Pedestrian with a missing, malformed or negative distance: brake.
//! 3. No pedestrian: propose `resume` while braking, otherwise nothing.
//!
//! Speed never influences the outcome.
//!
//! ```
//! use pedguard_kernel::decide;
//! use pedguard_types::{Command, DistanceReading, TelemetryFrame, Thresholds};
//!
//! let thresholds = Thresholds { brake_range_m: 6.0, slowdown_start_m: 15.0 };
//! let frame = TelemetryFrame {
//!     speed_kmh: 40.0,
//!     pedestrian_detected: true,
//!     distance: DistanceReading::Value(4.0),
//!     send_time: None,
//! };
//! assert_eq!(decide(&frame, false, &thresholds).command, Some(Command::Brake));
//! ```

use pedguard_types::{Command, Decision, DistanceReading, TelemetryFrame, Thresholds};

/// Map one telemetry frame onto a candidate command.
pub fn decide(frame: &TelemetryFrame, braking_active: bool, thresholds: &Thresholds) -> Decision {
    if frame.pedestrian_detected {
        return decide_pedestrian(frame.distance, thresholds);
    }
    if braking_active {
        Decision::new(Some(Command::Resume), "no pedestrian (resume allowed)")
    } else {
        Decision::new(None, "no pedestrian")
    }
}

fn decide_pedestrian(distance: DistanceReading, t: &Thresholds) -> Decision {
    let d = match distance {
        DistanceReading::Value(d) if d.is_finite() && d >= 0.0 => d,
        DistanceReading::Value(d) => {
            return Decision::new(
                Some(Command::Brake),
                format!("pedestrian with invalid distance (d={d:.1}m, assume close)"),
            );
        }
        DistanceReading::Malformed => {
            return Decision::new(
                Some(Command::Brake),
                "pedestrian with malformed distance (assume close)",
            );
        }
        DistanceReading::Absent => {
            return Decision::new(
                Some(Command::Brake),
                "pedestrian without distance (assume close)",
            );
        }
    };

    if d <= t.brake_range_m {
        return Decision::new(
            Some(Command::Brake),
            format!(
                "pedestrian within brake range (d={d:.1}m <= {:.1}m)",
                t.brake_range_m
            ),
        )
        .with_distance(d);
    }

    if t.slowdown_enabled() && d <= t.slowdown_start_m {
        return Decision::new(
            Some(Command::Slowdown),
            format!(
                "pedestrian in slowdown zone ({:.1}m < d={d:.1}m <= {:.1}m)",
                t.brake_range_m, t.slowdown_start_m
            ),
        )
        .with_distance(d);
    }

    let horizon = if t.slowdown_enabled() {
        t.slowdown_start_m
    } else {
        t.brake_range_m
    };
    Decision::new(None, format!("pedestrian far (d={d:.1}m > {horizon:.1}m)")).with_distance(d)
}
