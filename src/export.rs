//! Tabular snapshot of registry state for persistence

use crate::{
    aggregator::ReadRateAggregator,
    registry::{TagLifecycle, TagRegistry},
};
use serde::{Deserialize, Serialize};

/// One row per Live or Stale tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub epc: String,
    pub lifecycle: TagLifecycle,
    pub identity: Option<usize>,
    pub antenna: u16,
    pub first_channel: u16,
    pub last_channel: u16,
    pub mode: String,
    pub first_seen_secs: f64,
    pub last_seen_secs: f64,
    pub read_count: u64,
    pub reads_per_sec: f64,
    pub best_rssi: f64,
    pub rssi: Option<f64>,
    pub phase: Option<f64>,
    pub phase_delta: Option<f64>,
    pub corrected_phase: Option<f64>,
    pub doppler_hz: Option<f64>,
}

/// Build rows ordered by first-seen timestamp; reads state only
pub fn export(registry: &TagRegistry, rates: &ReadRateAggregator) -> Vec<ExportRow> {
    registry
        .ordered()
        .into_iter()
        .map(|state| ExportRow {
            epc: state.id.to_hex(),
            lifecycle: state.lifecycle,
            identity: state.identity.map(|i| i.index()),
            antenna: state.last_antenna,
            first_channel: state.first_channel,
            last_channel: state.last_channel,
            mode: state.last_mode.as_str(),
            first_seen_secs: state.first_seen.as_secs_f64(),
            last_seen_secs: state.last_seen.as_secs_f64(),
            read_count: state.read_count,
            reads_per_sec: rates.rate_for(&state.id),
            best_rssi: state.best_rssi,
            rssi: state.rssi.latest().map(|s| s.value),
            phase: state.phase.latest().map(|s| s.value),
            phase_delta: state.phase_delta.latest().map(|s| s.value),
            corrected_phase: state.corrected_phase.latest().map(|s| s.value),
            doppler_hz: state.doppler.latest().map(|s| s.value),
        })
        .collect()
}
