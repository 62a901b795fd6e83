//! Signal derivation: phase unwrapping, phase delta and RSSI smoothing
//!
//! `process` is a pure function of the incoming event and the previous
//! per-tag [`SignalState`]. The registry persists the result and advances
//! the state with [`SignalState::record`].
//!
//! Unwrap continuity only holds within one modulation mode. When the mode
//! changes between two consecutive reads the unwrap offset is cleared and
//! the phase delta is reported as absent.
//!
//! Frequency hopping adds a per-channel offset to the reported phase. The
//! corrected phase track removes it: on a channel hop the shift is re-based
//! so the corrected value continues from the previous one, and every later
//! read on that channel subtracts the same shift.

use crate::event::{wrap_to_pi, ModulationMode, TagReportEvent};
use std::{
    collections::VecDeque,
    f64::consts::{PI, TAU},
    time::Duration,
};

/// RSSI smoothing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RssiSmoothing {
    /// EMA with alpha = 2 / (window + 1)
    Exponential { window: usize },
    /// Mean of the last `window` raw readings
    MovingAverage { window: usize },
}

impl RssiSmoothing {
    pub fn window(&self) -> usize {
        match *self {
            RssiSmoothing::Exponential { window } | RssiSmoothing::MovingAverage { window } => {
                window.max(1)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalParams {
    pub smoothing: RssiSmoothing,
    /// Largest same-mode phase step treated as continuous, in (0, π]
    pub phase_tolerance: f64,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            smoothing: RssiSmoothing::Exponential { window: 4 },
            phase_tolerance: PI,
        }
    }
}

/// Metrics derived from one event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedSample {
    pub timestamp: Duration,
    pub unwrapped_phase: f64,
    /// Absent on the first read of a tag and on a modulation mode change
    pub phase_delta: Option<f64>,
    pub smoothed_rssi: f64,
    /// Unwrap offset was cleared by a mode change
    pub mode_reset: bool,
    /// Same-mode step larger than the configured tolerance
    pub phase_ambiguous: bool,
    /// Raw phase minus the current channel shift, in [-π, π)
    pub corrected_phase: f64,
    /// Shift in effect for this read's channel
    pub phase_shift: f64,
    /// Channel differs from the previous read
    pub channel_hop: bool,
}

/// Per-tag continuity state carried between reads
#[derive(Debug, Clone)]
pub struct SignalState {
    mode: ModulationMode,
    unwrapped_phase: f64,
    smoothed_rssi: f64,
    recent_rssi: VecDeque<f64>,
    channel: u16,
    phase_shift: f64,
    corrected_phase: f64,
}

impl SignalState {
    /// State after the first read of a tag
    pub fn seed(event: &TagReportEvent, derived: &DerivedSample, params: &SignalParams) -> Self {
        let mut state = Self {
            mode: event.mode,
            unwrapped_phase: derived.unwrapped_phase,
            smoothed_rssi: derived.smoothed_rssi,
            recent_rssi: VecDeque::with_capacity(params.smoothing.window()),
            channel: event.channel,
            phase_shift: derived.phase_shift,
            corrected_phase: derived.corrected_phase,
        };
        state.push_rssi(event.rssi, params);
        state
    }

    /// Advance the state past `event`
    pub fn record(&mut self, event: &TagReportEvent, derived: &DerivedSample, params: &SignalParams) {
        self.mode = event.mode;
        self.unwrapped_phase = derived.unwrapped_phase;
        self.smoothed_rssi = derived.smoothed_rssi;
        self.channel = event.channel;
        self.phase_shift = derived.phase_shift;
        self.corrected_phase = derived.corrected_phase;
        self.push_rssi(event.rssi, params);
    }

    pub fn mode(&self) -> ModulationMode {
        self.mode
    }

    pub fn unwrapped_phase(&self) -> f64 {
        self.unwrapped_phase
    }

    pub fn corrected_phase(&self) -> f64 {
        self.corrected_phase
    }

    fn push_rssi(&mut self, rssi: f64, params: &SignalParams) {
        let window = params.smoothing.window();
        self.recent_rssi.push_back(rssi);
        while self.recent_rssi.len() > window {
            self.recent_rssi.pop_front();
        }
    }
}

/// Derive stable metrics for `event` given the tag's previous state
pub fn process(
    event: &TagReportEvent,
    previous: Option<&SignalState>,
    params: &SignalParams,
) -> DerivedSample {
    let Some(prev) = previous else {
        return DerivedSample {
            timestamp: event.timestamp,
            unwrapped_phase: event.phase,
            phase_delta: None,
            smoothed_rssi: event.rssi,
            mode_reset: false,
            phase_ambiguous: false,
            corrected_phase: wrap_to_pi(event.phase),
            phase_shift: 0.0,
            channel_hop: false,
        };
    };

    let smoothed_rssi = smooth_rssi(event.rssi, prev, params);
    let (corrected_phase, phase_shift, channel_hop) = correct_phase(event, prev);

    if prev.mode != event.mode {
        return DerivedSample {
            timestamp: event.timestamp,
            unwrapped_phase: event.phase,
            phase_delta: None,
            smoothed_rssi,
            mode_reset: true,
            phase_ambiguous: false,
            corrected_phase,
            phase_shift,
            channel_hop,
        };
    }

    let unwrapped_phase = unwrap_phase(prev.unwrapped_phase, event.phase);
    let delta = unwrapped_phase - prev.unwrapped_phase;

    DerivedSample {
        timestamp: event.timestamp,
        unwrapped_phase,
        phase_delta: Some(delta),
        smoothed_rssi,
        mode_reset: false,
        phase_ambiguous: delta.abs() > params.phase_tolerance,
        corrected_phase,
        phase_shift,
        channel_hop,
    }
}

/// Corrected phase, shift and hop flag for `event`
fn correct_phase(event: &TagReportEvent, prev: &SignalState) -> (f64, f64, bool) {
    if event.channel != prev.channel {
        let shift = event.phase - prev.corrected_phase;
        (prev.corrected_phase, shift, true)
    } else {
        (wrap_to_pi(event.phase - prev.phase_shift), prev.phase_shift, false)
    }
}

/// Shift `raw` by the multiple of 2π that lands closest to `previous`
pub fn unwrap_phase(previous: f64, raw: f64) -> f64 {
    let turns = ((previous - raw) / TAU).round();
    raw + turns * TAU
}

fn smooth_rssi(rssi: f64, prev: &SignalState, params: &SignalParams) -> f64 {
    match params.smoothing {
        RssiSmoothing::Exponential { window } => {
            let alpha = 2.0 / (window.max(1) as f64 + 1.0);
            alpha * rssi + (1.0 - alpha) * prev.smoothed_rssi
        }
        RssiSmoothing::MovingAverage { window } => {
            let keep = window.max(1) - 1;
            let history: Vec<f64> = prev.recent_rssi.iter().rev().take(keep).copied().collect();
            (history.iter().sum::<f64>() + rssi) / (history.len() + 1) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{wrap_to_pi, TagId};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn event(t_ms: u64, rssi: f64, phase: f64, mode: ModulationMode) -> TagReportEvent {
        TagReportEvent::new(TagId::from("A1"), Duration::from_millis(t_ms), rssi, phase, mode, 1, 1)
    }

    /// Run a stream through process/record like the registry does
    fn run(events: &[TagReportEvent], params: &SignalParams) -> Vec<DerivedSample> {
        let mut state: Option<SignalState> = None;
        let mut out = Vec::new();
        for e in events {
            let derived = process(e, state.as_ref(), params);
            match state.as_mut() {
                Some(s) => s.record(e, &derived, params),
                None => state = Some(SignalState::seed(e, &derived, params)),
            }
            out.push(derived);
        }
        out
    }

    #[test]
    fn test_first_sample_passes_through() {
        let params = SignalParams::default();
        let d = process(&event(0, -50.0, 1.0, ModulationMode::Fm0), None, &params);
        assert_eq!(d.unwrapped_phase, 1.0);
        assert_eq!(d.smoothed_rssi, -50.0);
        assert!(d.phase_delta.is_none());
        assert!(!d.mode_reset);
    }

    #[test]
    fn test_unwrap_across_boundary() {
        let params = SignalParams::default();
        let events = [
            event(0, -50.0, 3.0, ModulationMode::Fm0),
            event(10, -50.0, -3.0, ModulationMode::Fm0),
        ];
        let out = run(&events, &params);

        // -3.0 + 2π ≈ 3.283
        assert!((out[1].unwrapped_phase - (-3.0 + TAU)).abs() < 1e-12);
        let delta = out[1].phase_delta.unwrap();
        assert!((delta - (TAU - 6.0)).abs() < 1e-12);
    }

    #[test]
    fn test_mode_change_resets_unwrap() {
        let params = SignalParams::default();
        let events = [
            event(0, -50.0, 3.0, ModulationMode::Miller4),
            event(10, -50.0, -3.0, ModulationMode::Miller4),
            event(20, -50.0, -2.9, ModulationMode::Miller8),
            event(30, -50.0, -2.8, ModulationMode::Miller8),
        ];
        let out = run(&events, &params);

        assert!(out[1].unwrapped_phase > PI);
        assert!(out[2].mode_reset);
        assert!(out[2].phase_delta.is_none());
        assert_eq!(out[2].unwrapped_phase, -2.9, "offset cleared, raw phase restarts the track");
        assert!((out[3].phase_delta.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_channel_hop_offset_removed() {
        // Test: a hop re-bases the shift so the corrected track stays continuous
        let params = SignalParams::default();
        let on = |t_ms: u64, phase: f64, channel: u16| {
            TagReportEvent::new(TagId::from("A1"), Duration::from_millis(t_ms), -50.0, phase, ModulationMode::Fm0, 1, channel)
        };
        let events = [
            on(0, 0.2, 5),
            on(10, 0.3, 5),
            // Channel 9 adds 1.5 rad to the reported phase
            on(20, 0.3 + 1.5 + 0.1, 9),
            on(30, 0.5 + 1.5, 9),
            on(40, wrap_to_pi(0.6 + 3.0), 9),
        ];
        let out = run(&events, &params);

        assert!((out[0].corrected_phase - 0.2).abs() < 1e-12);
        assert_eq!(out[0].phase_shift, 0.0);
        assert!(!out[1].channel_hop);
        assert!((out[1].corrected_phase - 0.3).abs() < 1e-12);

        // Hop read holds the previous corrected value
        assert!(out[2].channel_hop);
        assert!((out[2].corrected_phase - 0.3).abs() < 1e-12);
        assert!((out[2].phase_shift - 1.6).abs() < 1e-12);

        assert!(!out[3].channel_hop);
        assert!((out[3].corrected_phase - 0.4).abs() < 1e-12);
        // Result wraps into [-π, π)
        assert!((out[4].corrected_phase - wrap_to_pi(3.6 - 1.6)).abs() < 1e-9);
        assert!(out.iter().all(|d| d.corrected_phase >= -PI && d.corrected_phase < PI));
    }

    #[test]
    fn test_ema_smoothing() {
        let params = SignalParams {
            smoothing: RssiSmoothing::Exponential { window: 3 },
            ..SignalParams::default()
        };
        let events = [
            event(0, -50.0, 0.0, ModulationMode::Fm0),
            event(10, -40.0, 0.0, ModulationMode::Fm0),
        ];
        let out = run(&events, &params);
        // alpha = 0.5
        assert!((out[1].smoothed_rssi + 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_smoothing() {
        let params = SignalParams {
            smoothing: RssiSmoothing::MovingAverage { window: 2 },
            ..SignalParams::default()
        };
        let events = [
            event(0, -50.0, 0.0, ModulationMode::Fm0),
            event(10, -40.0, 0.0, ModulationMode::Fm0),
            event(20, -60.0, 0.0, ModulationMode::Fm0),
        ];
        let out = run(&events, &params);
        assert_eq!(out[0].smoothed_rssi, -50.0);
        assert!((out[1].smoothed_rssi + 45.0).abs() < 1e-12);
        assert!((out[2].smoothed_rssi + 50.0).abs() < 1e-12);
    }

    #[test]
    fn test_window_of_one_disables_smoothing() {
        for smoothing in [
            RssiSmoothing::Exponential { window: 1 },
            RssiSmoothing::MovingAverage { window: 1 },
        ] {
            let params = SignalParams { smoothing, ..SignalParams::default() };
            let events = [
                event(0, -50.0, 0.0, ModulationMode::Fm0),
                event(10, -42.0, 0.0, ModulationMode::Fm0),
            ];
            let out = run(&events, &params);
            assert!((out[1].smoothed_rssi + 42.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_ambiguous_step_flagged() {
        let params = SignalParams {
            phase_tolerance: 1.0,
            ..SignalParams::default()
        };
        let events = [
            event(0, -50.0, 0.0, ModulationMode::Fm0),
            event(10, -50.0, 0.5, ModulationMode::Fm0),
            event(20, -50.0, 2.0, ModulationMode::Fm0),
        ];
        let out = run(&events, &params);
        assert!(!out[1].phase_ambiguous);
        assert!(out[2].phase_ambiguous);
        assert!(out[2].phase_delta.is_some(), "ambiguous steps are still reported");
    }

    #[test]
    fn test_delta_presence_and_continuity_on_random_stream() {
        let params = SignalParams::default();
        let mut rng = StdRng::seed_from_u64(42);
        let modes = [ModulationMode::Fm0, ModulationMode::Miller2, ModulationMode::Miller8];

        let mut events = Vec::new();
        let mut mode = modes[0];
        let mut true_phase = 0.0f64;
        for i in 0..2000u64 {
            if rng.gen_bool(0.05) {
                mode = modes[rng.gen_range(0..modes.len())];
            }
            true_phase += rng.gen_range(-2.5..2.5);
            events.push(event(i * 5, -55.0, wrap_to_pi(true_phase), mode));
        }

        let out = run(&events, &params);
        assert!(out[0].phase_delta.is_none());

        for i in 1..events.len() {
            let same_mode = events[i].mode == events[i - 1].mode;
            assert_eq!(out[i].phase_delta.is_some(), same_mode, "sample {}", i);

            if let Some(delta) = out[i].phase_delta {
                let expected = out[i].unwrapped_phase - out[i - 1].unwrapped_phase;
                assert!((delta - expected).abs() < 1e-9);
                assert!(delta.abs() <= PI + 1e-9);
                // Unwrapped value is congruent with the raw phase
                assert!(wrap_to_pi(out[i].unwrapped_phase - events[i].phase).abs() < 1e-6);
            }
        }
    }
}
