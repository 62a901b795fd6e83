use crate::export::ExportRow;
use async_trait::async_trait;

#[derive(Debug)]
pub enum SnapshotWriterError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for SnapshotWriterError {
    fn from(err: std::io::Error) -> Self {
        SnapshotWriterError::Io(err)
    }
}

impl From<serde_json::Error> for SnapshotWriterError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotWriterError::Serialization(err)
    }
}

impl std::fmt::Display for SnapshotWriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotWriterError::Io(e) => write!(f, "IO error: {}", e),
            SnapshotWriterError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for SnapshotWriterError {}

#[async_trait]
pub trait SnapshotWriterBackend: Send {
    /// Persist one export snapshot
    async fn write_snapshot(&mut self, rows: &[ExportRow]) -> Result<(), SnapshotWriterError>;

    /// Flush pending writes to storage
    async fn flush(&mut self) -> Result<(), SnapshotWriterError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
