//! [`JsonlRecorder`] – machine-readable session log, one object per line.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::record::{CycleRecord, SessionSummary};
use crate::{Recorder, RecorderError};

#[derive(Serialize)]
struct SummaryLine<'a> {
    summary: &'a SessionSummary,
}

pub struct JsonlRecorder<W: Write + Send = File> {
    writer: BufWriter<W>,
    path: Option<PathBuf>,
}

impl JsonlRecorder<File> {
    /// Create (truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut recorder = Self::from_writer(file);
        recorder.path = Some(path.to_path_buf());
        Ok(recorder)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<W: Write + Send> JsonlRecorder<W> {
    pub fn from_writer(inner: W) -> Self {
        Self {
            writer: BufWriter::new(inner),
            path: None,
        }
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, RecorderError> {
        self.writer
            .into_inner()
            .map_err(|e| RecorderError::Io(e.into_error()))
    }

    fn line<T: Serialize>(&mut self, value: &T) -> Result<(), RecorderError> {
        serde_json::to_writer(&mut self.writer, value)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> Recorder for JsonlRecorder<W> {
    fn record_cycle(&mut self, record: &CycleRecord) -> Result<(), RecorderError> {
        self.line(record)
    }

    fn record_summary(&mut self, summary: &SessionSummary) -> Result<(), RecorderError> {
        self.line(&SummaryLine { summary })
    }
}
