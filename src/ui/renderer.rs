// Renderer module - formatting utilities
// Layout and widgets live in layout.rs; this module turns session data
// into display strings, colors and chart points

use {
    crate::{palette::VisualIdentity, registry::Metric, session::SessionStats, window::Sample},
    ratatui::style::Color,
    std::time::Duration,
};

/// Colors backing the visual identities, cycled when the palette is larger
pub const IDENTITY_COLORS: [Color; 16] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::LightRed,
    Color::LightGreen,
    Color::LightYellow,
    Color::LightBlue,
    Color::LightMagenta,
    Color::LightCyan,
    Color::Rgb(255, 165, 0),
    Color::Rgb(160, 32, 240),
    Color::Rgb(0, 128, 128),
    Color::Rgb(255, 105, 180),
];

/// Tags without an identity render in the fallback color
pub const FALLBACK_COLOR: Color = Color::DarkGray;

pub fn identity_color(identity: Option<VisualIdentity>) -> Color {
    match identity {
        Some(id) => IDENTITY_COLORS[id.index() % IDENTITY_COLORS.len()],
        None => FALLBACK_COLOR,
    }
}

pub fn identity_marker(identity: Option<VisualIdentity>) -> String {
    match identity {
        Some(id) => format!("● {:>2}", id.index()),
        None => "○  -".to_string(),
    }
}

/// "N reads/s - M reads (K tags) | RUNNING"
pub fn format_status_line(stats: &SessionStats) -> String {
    format!(
        "{:.0} reads/s - {} reads ({} tags) | {}",
        stats.global_rate,
        stats.total_reads,
        stats.tags_created,
        if stats.running { "RUNNING" } else { "STOPPED" }
    )
}

/// Degraded-data counters for the footer
pub fn format_counters(stats: &SessionStats) -> String {
    format!(
        "overflow {} | malformed {} | rejected {} | palette {}/{} (exhausted {}) | mode resets {} | ambiguous {}",
        stats.ingest.overflow_drops,
        stats.ingest.malformed_drops,
        stats.ingest.rejected_closed,
        stats.identities_in_use,
        stats.palette_size,
        stats.palette_exhaustions,
        stats.mode_resets,
        stats.phase_ambiguities,
    )
}

pub fn format_value(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

/// Shorten long EPCs to their last `keep` hex digits
pub fn format_epc(epc: &str, keep: usize) -> String {
    if epc.len() <= keep {
        epc.to_string()
    } else {
        format!("…{}", &epc[epc.len() - keep..])
    }
}

pub fn metric_unit(metric: Metric) -> &'static str {
    match metric {
        Metric::Rssi => "dBm",
        Metric::Phase | Metric::PhaseDelta | Metric::CorrectedPhase => "rad",
        Metric::Doppler => "Hz",
    }
}

/// Samples as (seconds relative to `now`, value) chart points
pub fn chart_points(samples: &[Sample], now: Duration) -> Vec<(f64, f64)> {
    samples
        .iter()
        .map(|s| (s.timestamp.as_secs_f64() - now.as_secs_f64(), s.value))
        .collect()
}

/// Y-axis bounds over every series, padded; a fixed range when empty
pub fn value_bounds<'a>(series: impl IntoIterator<Item = &'a [(f64, f64)]>, metric: Metric) -> [f64; 2] {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for points in series {
        for &(_, v) in points {
            min = min.min(v);
            max = max.max(v);
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return match metric {
            Metric::Rssi => [-90.0, -20.0],
            Metric::Phase | Metric::PhaseDelta | Metric::CorrectedPhase => [-std::f64::consts::PI, std::f64::consts::PI],
            Metric::Doppler => [-5.0, 5.0],
        };
    }

    let pad = ((max - min) * 0.1).max(0.5);
    [min - pad, max + pad]
}
