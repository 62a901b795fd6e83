//! Tag report events as delivered by the reader-protocol client

use serde::{Deserialize, Serialize};
use std::{f64::consts::PI, fmt, time::Duration};

/// Phase counts per full turn in Impinj low-level reports (12-bit)
pub const IMPINJ_PHASE_UNITS: f64 = 4096.0;

/// Opaque tag identifier (EPC bytes)
///
/// Compared byte-for-byte; displayed as uppercase hex the way reader
/// consoles print EPCs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TagId(Vec<u8>);

impl TagId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse an EPC written as hex (case-insensitive)
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(s.trim()).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Uppercase hex form, used for display and export
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.0)
    }
}

impl fmt::Display for TagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<&str> for TagId {
    /// Raw bytes of the string, not hex-decoded
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Tag-side encoding scheme for the backscatter link
///
/// Phase values reported under different modes are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModulationMode {
    Fm0,
    Miller2,
    Miller4,
    Miller8,
    /// Reader-specific mode identifier
    Other(u32),
}

impl ModulationMode {
    pub fn as_str(&self) -> String {
        match self {
            ModulationMode::Fm0 => "FM0".to_string(),
            ModulationMode::Miller2 => "M2".to_string(),
            ModulationMode::Miller4 => "M4".to_string(),
            ModulationMode::Miller8 => "M8".to_string(),
            ModulationMode::Other(id) => format!("mode{}", id),
        }
    }

    /// Subcarrier cycles per symbol (1 for FM0)
    pub fn subcarrier_cycles(&self) -> Option<u32> {
        match self {
            ModulationMode::Fm0 => Some(1),
            ModulationMode::Miller2 => Some(2),
            ModulationMode::Miller4 => Some(4),
            ModulationMode::Miller8 => Some(8),
            ModulationMode::Other(_) => None,
        }
    }
}

/// A single tag detection, immutable once constructed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagReportEvent {
    pub tag: TagId,
    /// Monotonic offset from session start
    pub timestamp: Duration,
    /// Peak RSSI in dBm
    pub rssi: f64,
    /// Raw phase angle in radians, [-π, π)
    pub phase: f64,
    pub mode: ModulationMode,
    pub antenna: u16,
    pub channel: u16,
    /// Doppler shift in Hz, only from readers with low-level extensions
    pub doppler_hz: Option<f64>,
    /// Reads the reader folded into this report
    #[serde(default = "default_seen_count")]
    pub seen_count: u32,
}

fn default_seen_count() -> u32 {
    1
}

impl TagReportEvent {
    pub fn new(
        tag: TagId,
        timestamp: Duration,
        rssi: f64,
        phase: f64,
        mode: ModulationMode,
        antenna: u16,
        channel: u16,
    ) -> Self {
        Self {
            tag,
            timestamp,
            rssi,
            phase,
            mode,
            antenna,
            channel,
            doppler_hz: None,
            seen_count: 1,
        }
    }

    pub fn with_doppler(mut self, doppler_hz: f64) -> Self {
        self.doppler_hz = Some(doppler_hz);
        self
    }

    /// Report standing for `count` reads; zero is treated as one
    pub fn with_seen_count(mut self, count: u32) -> Self {
        self.seen_count = count.max(1);
        self
    }

    /// Convert a 12-bit Impinj phase count into radians in [-π, π)
    pub fn phase_from_impinj(units: u16) -> f64 {
        let turns = (units as f64 % IMPINJ_PHASE_UNITS) / IMPINJ_PHASE_UNITS;
        wrap_to_pi(turns * 2.0 * PI)
    }

    /// Events without a tag identifier or with non-finite readings are
    /// dropped at ingest
    pub fn is_well_formed(&self) -> bool {
        !self.tag.is_empty()
            && self.rssi.is_finite()
            && self.phase.is_finite()
            && self.doppler_hz.map_or(true, f64::is_finite)
    }
}

/// Wrap an angle into [-π, π)
pub fn wrap_to_pi(angle: f64) -> f64 {
    (angle + PI).rem_euclid(2.0 * PI) - PI
}
