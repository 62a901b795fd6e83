//! Unified export writer
//!
//! Routes snapshots to either the JSON or JSONL backend based on configuration.

use super::json_writer::JsonSnapshotWriter;
use super::jsonl_writer::JsonlSnapshotWriter;
use super::writer_backend::{SnapshotWriterBackend, SnapshotWriterError};
use crate::config::ExportFormat;
use crate::export::ExportRow;
use std::path::Path;

/// Export writer that routes to either the JSON or JSONL backend
pub enum SnapshotWriter {
    Json(JsonSnapshotWriter),
    Jsonl(JsonlSnapshotWriter),
}

impl SnapshotWriter {
    /// Create a new export writer based on format
    pub fn new(format: ExportFormat, path: impl AsRef<Path>) -> Result<Self, SnapshotWriterError> {
        match format {
            ExportFormat::Json => Ok(SnapshotWriter::Json(JsonSnapshotWriter::new(path)?)),
            ExportFormat::Jsonl => Ok(SnapshotWriter::Jsonl(JsonlSnapshotWriter::new(path)?)),
        }
    }

    pub async fn write_snapshot(&mut self, rows: &[ExportRow]) -> Result<(), SnapshotWriterError> {
        match self {
            SnapshotWriter::Json(w) => w.write_snapshot(rows).await,
            SnapshotWriter::Jsonl(w) => w.write_snapshot(rows).await,
        }
    }

    pub async fn flush(&mut self) -> Result<(), SnapshotWriterError> {
        match self {
            SnapshotWriter::Json(w) => w.flush().await,
            SnapshotWriter::Jsonl(w) => w.flush().await,
        }
    }

    /// Get backend type for logging
    pub fn backend_type(&self) -> &'static str {
        match self {
            SnapshotWriter::Json(w) => w.backend_type(),
            SnapshotWriter::Jsonl(w) => w.backend_type(),
        }
    }
}
