//! Recorder composition.
//!
//! [`SessionRecorder`] is what the binary uses: a CSV and a JSON-lines log
//! side by side under the log directory.  [`MemoryRecorder`] keeps records
//! in memory so tests can assert on exactly what the loop emitted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;

use crate::csv_log::CsvRecorder;
use crate::jsonl_log::JsonlRecorder;
use crate::record::{CycleRecord, SessionSummary};
use crate::{Recorder, RecorderError};

/// CSV + JSON-lines logs for one session.
pub struct SessionRecorder {
    csv: CsvRecorder,
    jsonl: JsonlRecorder,
    csv_path: PathBuf,
    json_path: PathBuf,
}

impl SessionRecorder {
    /// Create `log_dir` if needed and open
    /// `<log_dir>/<session_id>_log.csv` and `<log_dir>/<session_id>_log.json`.
    pub fn create(log_dir: &Path, session_id: &str) -> Result<Self, RecorderError> {
        fs::create_dir_all(log_dir)?;
        let csv_path = log_dir.join(format!("{session_id}_log.csv"));
        let json_path = log_dir.join(format!("{session_id}_log.json"));
        let csv = CsvRecorder::create(&csv_path)?;
        let jsonl = JsonlRecorder::create(&json_path)?;
        info!(csv = %csv_path.display(), json = %json_path.display(), "session logs opened");
        Ok(Self {
            csv,
            jsonl,
            csv_path,
            json_path,
        })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }
}

impl Recorder for SessionRecorder {
    /// Writes to both logs even if the first fails; the first error wins.
    fn record_cycle(&mut self, record: &CycleRecord) -> Result<(), RecorderError> {
        let csv = self.csv.record_cycle(record);
        let jsonl = self.jsonl.record_cycle(record);
        csv.and(jsonl)
    }

    fn record_summary(&mut self, summary: &SessionSummary) -> Result<(), RecorderError> {
        let csv = self.csv.record_summary(summary);
        let jsonl = self.jsonl.record_summary(summary);
        csv.and(jsonl)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Captured {
    cycles: Vec<CycleRecord>,
    summaries: Vec<SessionSummary>,
}

/// Recorder that keeps everything in memory.  Clones share storage.
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    inner: Arc<Mutex<Captured>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn cycles(&self) -> Vec<CycleRecord> {
        self.lock().cycles.clone()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.lock().summaries.clone()
    }
}

impl Recorder for MemoryRecorder {
    fn record_cycle(&mut self, record: &CycleRecord) -> Result<(), RecorderError> {
        self.lock().cycles.push(record.clone());
        Ok(())
    }

    fn record_summary(&mut self, summary: &SessionSummary) -> Result<(), RecorderError> {
        self.lock().summaries.push(summary.clone());
        Ok(())
    }
}
