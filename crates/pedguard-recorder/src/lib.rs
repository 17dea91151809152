//! `pedguard-recorder` – Durable Session Logs
//!
//! Every control-loop cycle produces one [`CycleRecord`]; shutdown produces
//! one [`SessionSummary`].  Both are handed to a [`Recorder`].
//!
//! # Modules
//!
//! - [`record`] – the record types, reason splitting and timestamp helpers.
//! - [`csv_log`] – [`CsvRecorder`]: one CSV row per cycle, summary appended
//!   as key/value rows.
//! - [`jsonl_log`] – [`JsonlRecorder`]: one JSON object per line, summary
//!   as a final `{"summary": {...}}` line.
//! - [`session`] – [`SessionRecorder`] fanning out to both files under the
//!   log directory, and [`MemoryRecorder`] for tests.
//!
//! Recorder failures never stop the control loop; callers log and continue.

pub mod csv_log;
pub mod jsonl_log;
pub mod record;
pub mod session;

use pedguard_types::GuardError;
use thiserror::Error;

pub use csv_log::CsvRecorder;
pub use jsonl_log::JsonlRecorder;
pub use record::{CycleRecord, SessionSummary, session_id, split_reason, timestamp};
pub use session::{MemoryRecorder, SessionRecorder};

/// Failures while writing session logs.
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<RecorderError> for GuardError {
    fn from(e: RecorderError) -> Self {
        GuardError::Recorder(e.to_string())
    }
}

/// Sink for per-cycle and end-of-session records.
pub trait Recorder: Send {
    fn record_cycle(&mut self, record: &CycleRecord) -> Result<(), RecorderError>;

    fn record_summary(&mut self, summary: &SessionSummary) -> Result<(), RecorderError>;
}
