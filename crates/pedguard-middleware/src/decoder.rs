//! Telemetry decoder.
//!
//! Parses one datagram into a [`TelemetryFrame`].  Only structurally broken
//! payloads (not UTF-8, not JSON, not a JSON object) are rejected; field
//! values are interpreted permissively:
//!
//! | Field | Accepted | Fallback |
//! |---|---|---|
//! | `speed` | number or numeric string | `-1.0` |
//! | `pedestrian_detected` | truthiness of any JSON value | `false` |
//! | `distance` | number or numeric string | absent (`null`/missing) or malformed |
//! | `send_time` | number or numeric string | absent |

use pedguard_types::{DistanceReading, GuardError, TelemetryFrame, UNKNOWN_SPEED_KMH};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a datagram could not be decoded.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("payload is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is JSON but not an object")]
    NotAnObject,
}

impl From<DecodeError> for GuardError {
    fn from(e: DecodeError) -> Self {
        GuardError::Decode(e.to_string())
    }
}

/// Decode one raw telemetry datagram.
///
/// # Errors
///
/// See [`DecodeError`].  Never panics, whatever the input.
pub fn decode(raw: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    let text = std::str::from_utf8(raw)?;
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = value else {
        return Err(DecodeError::NotAnObject);
    };
    Ok(frame_from(&fields))
}

fn frame_from(fields: &Map<String, Value>) -> TelemetryFrame {
    let speed_kmh = fields
        .get("speed")
        .and_then(numeric)
        .unwrap_or(UNKNOWN_SPEED_KMH);

    let pedestrian_detected = fields.get("pedestrian_detected").is_some_and(truthy);

    let distance = match fields.get("distance") {
        None | Some(Value::Null) => DistanceReading::Absent,
        Some(v) => numeric(v).map_or(DistanceReading::Malformed, DistanceReading::Value),
    };

    let send_time = fields.get("send_time").and_then(numeric);

    TelemetryFrame {
        speed_kmh,
        pedestrian_detected,
        distance,
        send_time,
    }
}

fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
