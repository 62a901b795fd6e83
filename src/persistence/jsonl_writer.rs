//! JSONL export: one line per tag, appended on each export

use super::writer_backend::{SnapshotWriterBackend, SnapshotWriterError};
use crate::export::ExportRow;
use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct SnapshotLine<'a> {
    exported_at: &'a str,
    #[serde(flatten)]
    row: &'a ExportRow,
}

pub struct JsonlSnapshotWriter {
    file: BufWriter<File>,
    lines_written: u64,
}

impl JsonlSnapshotWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SnapshotWriterError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("📝 Appending tag exports to: {}", path.display());

        Ok(Self {
            file: BufWriter::new(file),
            lines_written: 0,
        })
    }

    pub fn write_rows(&mut self, rows: &[ExportRow]) -> Result<(), SnapshotWriterError> {
        let exported_at = chrono::Utc::now().to_rfc3339();
        for row in rows {
            let line = SnapshotLine {
                exported_at: &exported_at,
                row,
            };
            let json = serde_json::to_string(&line)?;
            writeln!(self.file, "{}", json)?;
            self.lines_written += 1;
        }
        self.file.flush()?;
        Ok(())
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }
}

impl Drop for JsonlSnapshotWriter {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}

#[async_trait]
impl SnapshotWriterBackend for JsonlSnapshotWriter {
    async fn write_snapshot(&mut self, rows: &[ExportRow]) -> Result<(), SnapshotWriterError> {
        self.write_rows(rows)
    }

    async fn flush(&mut self) -> Result<(), SnapshotWriterError> {
        self.file.flush()?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSONL"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TagLifecycle;

    fn row(epc: &str, reads: u64) -> ExportRow {
        ExportRow {
            epc: epc.to_string(),
            lifecycle: TagLifecycle::Stale,
            identity: None,
            antenna: 2,
            first_channel: 1,
            last_channel: 1,
            mode: "FM0".to_string(),
            first_seen_secs: 0.0,
            last_seen_secs: 1.0,
            read_count: reads,
            reads_per_sec: 0.0,
            best_rssi: -60.0,
            rssi: Some(-61.0),
            phase: None,
            phase_delta: None,
            corrected_phase: None,
            doppler_hz: Some(1.5),
        }
    }

    #[tokio::test]
    async fn test_jsonl_appends_across_exports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.jsonl");

        let mut writer = JsonlSnapshotWriter::new(&path).unwrap();
        writer.write_snapshot(&[row("E200", 1), row("E201", 2)]).await.unwrap();
        writer.write_snapshot(&[row("E200", 3)]).await.unwrap();
        writer.flush().await.unwrap();
        assert_eq!(writer.lines_written(), 3);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2]["epc"], "E200");
        assert_eq!(lines[2]["read_count"], 3);
        assert_eq!(lines[0]["lifecycle"], "Stale");
        assert!(lines[0]["exported_at"].is_string());
    }
}
