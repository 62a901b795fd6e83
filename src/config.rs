use {
    crate::{
        palette::IdentityAllocator,
        registry::RetentionPolicy,
        signal::{RssiSmoothing, SignalParams},
        window::WindowBounds,
    },
    std::{env, f64::consts::PI, path::PathBuf, str::FromStr, time::Duration},
};

/// Largest palette the console can render distinctly
pub const MAX_PALETTE_SIZE: u16 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Jsonl,
}

/// RSSI smoothing filter selected by `TAGSCOPE_RSSI_SMOOTHING`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingKind {
    Ema,
    Sma,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Session and console configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub window_max_samples: usize,
    pub window_max_age: Duration,
    pub stale_after: Duration,
    pub destroy_after: Duration,
    pub sweep_interval: Duration,
    pub palette_size: u16,
    pub channel_capacity: usize,
    pub rssi_window: usize,
    pub rssi_smoothing: SmoothingKind,
    /// Largest same-mode phase step treated as continuous (radians)
    pub phase_tolerance: f64,
    pub rate_window: Duration,
    pub tick_interval: Duration,
    pub export_path: PathBuf,
    pub export_format: ExportFormat,
    pub headless: bool,
    pub sim_tags: usize,
    pub sim_reads_per_sec: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_max_samples: 512,
            window_max_age: Duration::from_millis(30_000),
            stale_after: Duration::from_millis(3_000),
            destroy_after: Duration::from_millis(10_000),
            sweep_interval: Duration::from_millis(500),
            palette_size: 16,
            channel_capacity: 4096,
            rssi_window: 4,
            rssi_smoothing: SmoothingKind::Ema,
            phase_tolerance: PI,
            rate_window: Duration::from_millis(5_000),
            tick_interval: Duration::from_millis(100),
            export_path: PathBuf::from("exports/tags.json"),
            export_format: ExportFormat::Json,
            headless: false,
            sim_tags: 24,
            sim_reads_per_sec: 200,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional:
    /// - `TAGSCOPE_WINDOW_MAX_SAMPLES` (default: 512)
    /// - `TAGSCOPE_WINDOW_MAX_AGE_MS` (default: 30000)
    /// - `TAGSCOPE_STALE_AFTER_MS` (default: 3000)
    /// - `TAGSCOPE_DESTROY_AFTER_MS` (default: 10000)
    /// - `TAGSCOPE_SWEEP_INTERVAL_MS` (default: 500)
    /// - `TAGSCOPE_PALETTE_SIZE` (default: 16)
    /// - `TAGSCOPE_CHANNEL_CAPACITY` (default: 4096)
    /// - `TAGSCOPE_RSSI_WINDOW` (default: 4)
    /// - `TAGSCOPE_RSSI_SMOOTHING` (`ema` or `sma`, default: ema)
    /// - `TAGSCOPE_PHASE_TOLERANCE` (radians, default: π)
    /// - `TAGSCOPE_RATE_WINDOW_MS` (default: 5000)
    /// - `TAGSCOPE_TICK_INTERVAL_MS` (default: 100)
    /// - `TAGSCOPE_EXPORT_PATH` (default: exports/tags.json)
    /// - `TAGSCOPE_EXPORT_FORMAT` (`json` or `jsonl`, default: json)
    /// - `TAGSCOPE_HEADLESS` (default: false)
    /// - `TAGSCOPE_SIM_TAGS` (default: 24)
    /// - `TAGSCOPE_SIM_READS_PER_SEC` (default: 200)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary variable source
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            Duration::from_millis(parse_or(&lookup, key, default.as_millis() as u64))
        };

        let export_format = match lookup("TAGSCOPE_EXPORT_FORMAT")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("json") => ExportFormat::Json,
            Some("jsonl") => ExportFormat::Jsonl,
            Some(other) => {
                log::warn!("Invalid TAGSCOPE_EXPORT_FORMAT '{}', defaulting to json", other);
                ExportFormat::Json
            }
        };

        let rssi_smoothing = match lookup("TAGSCOPE_RSSI_SMOOTHING")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None => defaults.rssi_smoothing,
            Some("ema") => SmoothingKind::Ema,
            Some("sma") => SmoothingKind::Sma,
            Some(other) => {
                log::warn!("Invalid TAGSCOPE_RSSI_SMOOTHING '{}', defaulting to ema", other);
                defaults.rssi_smoothing
            }
        };

        let config = Self {
            window_max_samples: parse_or(&lookup, "TAGSCOPE_WINDOW_MAX_SAMPLES", defaults.window_max_samples),
            window_max_age: millis("TAGSCOPE_WINDOW_MAX_AGE_MS", defaults.window_max_age),
            stale_after: millis("TAGSCOPE_STALE_AFTER_MS", defaults.stale_after),
            destroy_after: millis("TAGSCOPE_DESTROY_AFTER_MS", defaults.destroy_after),
            sweep_interval: millis("TAGSCOPE_SWEEP_INTERVAL_MS", defaults.sweep_interval),
            palette_size: parse_or(&lookup, "TAGSCOPE_PALETTE_SIZE", defaults.palette_size),
            channel_capacity: parse_or(&lookup, "TAGSCOPE_CHANNEL_CAPACITY", defaults.channel_capacity),
            rssi_window: parse_or(&lookup, "TAGSCOPE_RSSI_WINDOW", defaults.rssi_window),
            rssi_smoothing,
            phase_tolerance: parse_or(&lookup, "TAGSCOPE_PHASE_TOLERANCE", defaults.phase_tolerance),
            rate_window: millis("TAGSCOPE_RATE_WINDOW_MS", defaults.rate_window),
            tick_interval: millis("TAGSCOPE_TICK_INTERVAL_MS", defaults.tick_interval),
            export_path: lookup("TAGSCOPE_EXPORT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_path),
            export_format,
            headless: parse_or(&lookup, "TAGSCOPE_HEADLESS", defaults.headless),
            sim_tags: parse_or(&lookup, "TAGSCOPE_SIM_TAGS", defaults.sim_tags),
            sim_reads_per_sec: parse_or(&lookup, "TAGSCOPE_SIM_READS_PER_SEC", defaults.sim_reads_per_sec),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_max_samples == 0 {
            return Err(ConfigError::InvalidValue(
                "window max samples must be at least 1".to_string(),
            ));
        }

        if self.destroy_after <= self.stale_after {
            return Err(ConfigError::InvalidValue(format!(
                "destroy threshold ({}ms) must exceed stale threshold ({}ms)",
                self.destroy_after.as_millis(),
                self.stale_after.as_millis()
            )));
        }

        if self.palette_size == 0 || self.palette_size > MAX_PALETTE_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "palette size must be 1..={}, got {}",
                MAX_PALETTE_SIZE, self.palette_size
            )));
        }

        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "ingest channel capacity must be at least 1".to_string(),
            ));
        }

        if self.rssi_window == 0 {
            return Err(ConfigError::InvalidValue(
                "RSSI smoothing window must be at least 1".to_string(),
            ));
        }

        if !(self.phase_tolerance > 0.0 && self.phase_tolerance <= PI) {
            return Err(ConfigError::InvalidValue(format!(
                "phase tolerance must be in (0, π], got {}",
                self.phase_tolerance
            )));
        }

        if self.sweep_interval.is_zero() || self.tick_interval.is_zero() || self.rate_window.is_zero() {
            return Err(ConfigError::InvalidValue(
                "sweep, tick and rate intervals must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn window_bounds(&self) -> WindowBounds {
        WindowBounds::new(self.window_max_samples, self.window_max_age)
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            stale_after: self.stale_after,
            destroy_after: self.destroy_after,
        }
    }

    pub fn signal_params(&self) -> SignalParams {
        let smoothing = match self.rssi_smoothing {
            SmoothingKind::Sma => RssiSmoothing::MovingAverage { window: self.rssi_window },
            SmoothingKind::Ema => RssiSmoothing::Exponential { window: self.rssi_window },
        };
        SignalParams {
            smoothing,
            phase_tolerance: self.phase_tolerance,
        }
    }

    pub fn allocator(&self) -> IdentityAllocator {
        IdentityAllocator::new(self.palette_size)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Invalid {} '{}', using default", key, raw);
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> Result<MonitorConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = from_map(&[]).unwrap();

        assert_eq!(config.window_max_samples, 512);
        assert_eq!(config.stale_after, Duration::from_secs(3));
        assert_eq!(config.destroy_after, Duration::from_secs(10));
        assert_eq!(config.palette_size, 16);
        assert_eq!(config.channel_capacity, 4096);
        assert_eq!(config.export_format, ExportFormat::Json);
        assert_eq!(config.phase_tolerance, PI);
        assert!(!config.headless);
    }

    #[test]
    fn test_custom_config() {
        let config = from_map(&[
            ("TAGSCOPE_PALETTE_SIZE", "8"),
            ("TAGSCOPE_STALE_AFTER_MS", "1000"),
            ("TAGSCOPE_DESTROY_AFTER_MS", "2500"),
            ("TAGSCOPE_RSSI_SMOOTHING", "SMA"),
            ("TAGSCOPE_RSSI_WINDOW", "6"),
            ("TAGSCOPE_EXPORT_FORMAT", "jsonl"),
            ("TAGSCOPE_HEADLESS", "true"),
        ])
        .unwrap();

        assert_eq!(config.palette_size, 8);
        assert_eq!(config.destroy_after, Duration::from_millis(2500));
        assert_eq!(config.export_format, ExportFormat::Jsonl);
        assert!(config.headless);
        assert_eq!(
            config.signal_params().smoothing,
            RssiSmoothing::MovingAverage { window: 6 }
        );
    }

    #[test]
    fn test_unparseable_value_falls_back() {
        let config = from_map(&[("TAGSCOPE_CHANNEL_CAPACITY", "lots")]).unwrap();
        assert_eq!(config.channel_capacity, 4096);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = from_map(&[
            ("TAGSCOPE_STALE_AFTER_MS", "5000"),
            ("TAGSCOPE_DESTROY_AFTER_MS", "5000"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));

        assert!(from_map(&[("TAGSCOPE_PALETTE_SIZE", "0")]).is_err());
        assert!(from_map(&[("TAGSCOPE_PALETTE_SIZE", "65")]).is_err());
        assert!(from_map(&[("TAGSCOPE_PHASE_TOLERANCE", "4.0")]).is_err());
    }

    #[test]
    fn test_unknown_smoothing_falls_back_to_ema() {
        // Test: an unknown filter name warns and keeps the default
        let config = from_map(&[("TAGSCOPE_RSSI_SMOOTHING", "kalman")]).unwrap();
        assert_eq!(config.rssi_smoothing, SmoothingKind::Ema);
        assert_eq!(
            config.signal_params().smoothing,
            RssiSmoothing::Exponential { window: 4 }
        );
    }
}
