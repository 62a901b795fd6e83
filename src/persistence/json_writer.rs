//! Whole-snapshot JSON export, rewritten on every export

use {
    super::writer_backend::{SnapshotWriterBackend, SnapshotWriterError},
    crate::export::ExportRow,
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
    },
};

/// On-disk document for the JSON backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub exported_at: String,
    pub tag_count: usize,
    pub tags: Vec<ExportRow>,
}

pub struct JsonSnapshotWriter {
    path: PathBuf,
}

impl JsonSnapshotWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SnapshotWriterError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, rows: &[ExportRow]) -> Result<(), SnapshotWriterError> {
        let document = SnapshotDocument {
            exported_at: chrono::Utc::now().to_rfc3339(),
            tag_count: rows.len(),
            tags: rows.to_vec(),
        };

        let json = serde_json::to_string_pretty(&document)?;
        fs::write(&self.path, json)?;

        log::debug!("Saved {} tags to {}", rows.len(), self.path.display());
        Ok(())
    }
}

/// Load a JSON snapshot; a missing file yields an empty document
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<SnapshotDocument, SnapshotWriterError> {
    let path = path.as_ref();
    if !path.exists() {
        log::info!("No existing snapshot file found: {}", path.display());
        return Ok(SnapshotDocument {
            exported_at: String::new(),
            tag_count: 0,
            tags: Vec::new(),
        });
    }

    let json = fs::read_to_string(path)?;
    let document: SnapshotDocument = serde_json::from_str(&json)?;
    Ok(document)
}

#[async_trait]
impl SnapshotWriterBackend for JsonSnapshotWriter {
    async fn write_snapshot(&mut self, rows: &[ExportRow]) -> Result<(), SnapshotWriterError> {
        self.save(rows)
    }

    async fn flush(&mut self) -> Result<(), SnapshotWriterError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TagLifecycle;

    fn row(epc: &str) -> ExportRow {
        ExportRow {
            epc: epc.to_string(),
            lifecycle: TagLifecycle::Live,
            identity: Some(0),
            antenna: 1,
            first_channel: 3,
            last_channel: 7,
            mode: "M4".to_string(),
            first_seen_secs: 0.5,
            last_seen_secs: 2.0,
            read_count: 12,
            reads_per_sec: 8.0,
            best_rssi: -47.5,
            rssi: Some(-49.0),
            phase: Some(1.25),
            phase_delta: Some(0.1),
            corrected_phase: Some(1.1),
            doppler_hz: None,
        }
    }

    #[tokio::test]
    async fn test_json_snapshot_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tags.json");
        let mut writer = JsonSnapshotWriter::new(&path).unwrap();

        writer.write_snapshot(&[row("E200"), row("E201")]).await.unwrap();
        writer.write_snapshot(&[row("E202")]).await.unwrap();

        let document = load_snapshot(&path).unwrap();
        assert_eq!(document.tag_count, 1);
        assert_eq!(document.tags, vec![row("E202")]);
        assert!(!document.exported_at.is_empty());
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let document = load_snapshot(dir.path().join("absent.json")).unwrap();
        assert!(document.tags.is_empty());
    }
}
