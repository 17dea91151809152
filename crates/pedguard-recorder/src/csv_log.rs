//! [`CsvRecorder`] – spreadsheet-friendly session log.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::{Writer, WriterBuilder};

use crate::record::{CSV_HEADER, CycleRecord, SessionSummary};
use crate::{Recorder, RecorderError};

/// Writes one row per cycle and flushes after each, so a crashed session
/// still leaves a readable log.
pub struct CsvRecorder<W: Write + Send = File> {
    writer: Writer<W>,
    path: Option<PathBuf>,
}

impl CsvRecorder<File> {
    /// Create (truncate) `path` and write the header row.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        let mut recorder = Self::from_writer(file)?;
        recorder.path = Some(path.to_path_buf());
        Ok(recorder)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl<W: Write + Send> CsvRecorder<W> {
    /// Wrap any writer; the header row is written immediately.
    pub fn from_writer(inner: W) -> Result<Self, RecorderError> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(inner);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self { writer, path: None })
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W, RecorderError> {
        self.writer
            .into_inner()
            .map_err(|e| RecorderError::Io(e.into_error()))
    }

    fn pair(&mut self, key: &str, value: &str) -> Result<(), RecorderError> {
        self.writer.write_record([key, value])?;
        Ok(())
    }
}

impl<W: Write + Send> Recorder for CsvRecorder<W> {
    fn record_cycle(&mut self, record: &CycleRecord) -> Result<(), RecorderError> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }

    fn record_summary(&mut self, summary: &SessionSummary) -> Result<(), RecorderError> {
        self.writer.write_record(["=== SESSION SUMMARY ==="])?;
        self.pair("session_id", &summary.session_id)?;
        self.pair("start_time", &summary.start_time)?;
        self.pair("end_time", &summary.end_time)?;
        self.pair("duration_s", &format!("{:.3}", summary.duration_s))?;
        self.pair("slowdown_enabled", &summary.slowdown_enabled.to_string())?;

        self.writer.write_record(["- CONFIG -"])?;
        for (key, value) in summary.config_entries() {
            self.pair(&key, &value)?;
        }

        self.writer.write_record(["- STATS -"])?;
        for (key, value) in summary.stats.entries() {
            self.pair(key, &value)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;
    use pedguard_kernel::{Stats, TxOutcome};
    use pedguard_types::GuardConfig;

    use super::*;

    fn rendered(recorder: CsvRecorder<Vec<u8>>) -> String {
        String::from_utf8(recorder.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn header_is_written_up_front() {
        let recorder = CsvRecorder::from_writer(Vec::new()).unwrap();
        let text = rendered(recorder);
        assert_eq!(
            text.trim_end(),
            "timestamp,speed_kmh,pedestrian,distance_m,decision,fault,latency_s,delay_s,reason_type,reason_detail,outcome"
        );
    }

    #[test]
    fn cycle_rows_follow_header_order() {
        let mut recorder = CsvRecorder::from_writer(Vec::new()).unwrap();
        let record = CycleRecord::stale(
            "2026-01-01 00:00:00.000".to_string(),
            "no data reached (> 0.50s)",
            TxOutcome::RateLimited,
        );
        recorder.record_cycle(&record).unwrap();
        let text = rendered(recorder);
        let row = text.lines().nth(1).unwrap();
        assert_eq!(
            row,
            "2026-01-01 00:00:00.000,-1.0,false,,brake,None,0.0,0.0,No data reached,> 0.50s,rate_limited"
        );
    }

    #[test]
    fn summary_is_appended_as_key_value_rows() {
        let mut recorder = CsvRecorder::from_writer(Vec::new()).unwrap();
        let now = Local::now();
        let stats = Stats {
            brakes_sent: 3,
            ..Stats::default()
        };
        let summary = SessionSummary::new("session_x", now, now, &GuardConfig::default(), &stats);
        recorder.record_summary(&summary).unwrap();
        let text = rendered(recorder);
        assert!(text.contains("=== SESSION SUMMARY ==="));
        assert!(text.contains("session_id,session_x"));
        assert!(text.contains("- CONFIG -"));
        assert!(text.contains("brake_range_m,6.0"));
        assert!(text.contains("brakes_sent,3"));
    }

    #[test]
    fn create_writes_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let recorder = CsvRecorder::create(&path).unwrap();
        assert_eq!(recorder.path(), Some(path.as_path()));
        drop(recorder);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("timestamp,"));
    }
}
