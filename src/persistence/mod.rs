//! Export persistence
//!
//! ```text
//! InventorySession::export() → Vec<ExportRow>
//!     ↓
//! SnapshotWriter → JSON (whole snapshot) or JSONL (appended rows)
//! ```

pub mod json_writer;
pub mod jsonl_writer;
pub mod writer;
pub mod writer_backend;

pub use json_writer::{load_snapshot, JsonSnapshotWriter, SnapshotDocument};
pub use jsonl_writer::JsonlSnapshotWriter;
pub use writer::SnapshotWriter;
pub use writer_backend::{SnapshotWriterBackend, SnapshotWriterError};
