//! tagscope: real-time RFID tag report processing
//!
//! Reader reports enter through a bounded ingest queue, are turned into
//! per-tag rolling time series on each session tick, and are retired once
//! the tag leaves the field. A terminal console and JSON/JSONL export sit
//! on top of the session.

pub mod aggregator;
pub mod config;
pub mod event;
pub mod export;
pub mod ingest;
pub mod palette;
pub mod persistence;
pub mod registry;
pub mod session;
pub mod signal;
pub mod simulator;
pub mod ui;
pub mod window;

pub use config::MonitorConfig;
pub use event::{ModulationMode, TagId, TagReportEvent};
pub use ingest::{IngestHandle, SubmitOutcome};
pub use registry::{Metric, TagLifecycle};
pub use session::{InventorySession, SessionStats, TagSnapshot};
