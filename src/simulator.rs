//! Simulated reader for running the console without hardware
//!
//! Emits random-walk RSSI and phase streams for a fixed tag population.
//! Tags occasionally switch modulation mode or leave the field for a
//! while, so the stale/destroy path gets exercised.
//!
//! The reader hops channel after a fixed dwell. Each channel adds its own
//! constant offset to the reported phase, as real hopping readers do.

use crate::{
    event::{ModulationMode, TagId, TagReportEvent, IMPINJ_PHASE_UNITS},
    ingest::{IngestHandle, SubmitOutcome},
    session::SessionClock,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{f64::consts::TAU, time::Duration};
use tokio::{sync::watch, time::interval};

const BATCH_INTERVAL: Duration = Duration::from_millis(10);
const LEAVE_PROBABILITY: f64 = 0.0005;
const MODE_SWITCH_PROBABILITY: f64 = 0.002;
const CHANNELS: u16 = 50;
const CHANNEL_DWELL: Duration = Duration::from_millis(400);
const MODES: [ModulationMode; 4] = [
    ModulationMode::Fm0,
    ModulationMode::Miller2,
    ModulationMode::Miller4,
    ModulationMode::Miller8,
];

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub tags: usize,
    pub reads_per_sec: u32,
    pub seed: Option<u64>,
}

struct SimTag {
    id: TagId,
    rssi: f64,
    phase: f64,
    phase_step: f64,
    mode: ModulationMode,
    antenna: u16,
    absent_until: Option<Duration>,
}

pub struct SimulatedReader {
    rng: StdRng,
    tags: Vec<SimTag>,
    reads_per_sec: u32,
    channel: u16,
    hop_at: Duration,
    /// Phase offset per channel, indexed by channel - 1
    channel_offsets: Vec<f64>,
}

impl SimulatedReader {
    pub fn new(config: &SimulatorConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let tags = (0..config.tags.max(1))
            .map(|i| {
                let mut epc = vec![0xE2, 0x80, 0x11, 0x60];
                epc.extend_from_slice(&(i as u32).to_be_bytes());
                SimTag {
                    id: TagId::new(epc),
                    rssi: rng.gen_range(-70.0..-40.0),
                    phase: rng.gen_range(0.0..TAU),
                    phase_step: rng.gen_range(-0.3..0.3),
                    mode: MODES[rng.gen_range(0..MODES.len())],
                    antenna: rng.gen_range(1..=4),
                    absent_until: None,
                }
            })
            .collect();

        let channel_offsets = (0..CHANNELS).map(|_| rng.gen_range(0.0..TAU)).collect();
        let channel = rng.gen_range(1..=CHANNELS);

        Self {
            rng,
            tags,
            reads_per_sec: config.reads_per_sec,
            channel,
            hop_at: CHANNEL_DWELL,
            channel_offsets,
        }
    }

    pub fn tag_ids(&self) -> Vec<TagId> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    fn hop_if_due(&mut self, now: Duration) {
        if now < self.hop_at {
            return;
        }
        let next = self.rng.gen_range(1..CHANNELS);
        // Skip the current channel
        self.channel = if next >= self.channel { next + 1 } else { next };
        self.hop_at = now + CHANNEL_DWELL;
    }

    /// One read from a random tag currently in the field
    pub fn next_event(&mut self, now: Duration) -> Option<TagReportEvent> {
        self.hop_if_due(now);
        let channel = self.channel;
        let offset = self.channel_offsets[usize::from(channel - 1)];

        let present: Vec<usize> = self
            .tags
            .iter()
            .enumerate()
            .filter(|(_, t)| t.absent_until.map_or(true, |until| now >= until))
            .map(|(i, _)| i)
            .collect();
        if present.is_empty() {
            return None;
        }

        let idx = present[self.rng.gen_range(0..present.len())];
        let rng = &mut self.rng;
        let tag = &mut self.tags[idx];
        tag.absent_until = None;

        if rng.gen_bool(LEAVE_PROBABILITY) {
            tag.absent_until = Some(now + Duration::from_millis(rng.gen_range(4_000..15_000)));
        }
        if rng.gen_bool(MODE_SWITCH_PROBABILITY) {
            tag.mode = MODES[rng.gen_range(0..MODES.len())];
        }

        tag.rssi = (tag.rssi + rng.gen_range(-0.8..0.8)).clamp(-80.0, -30.0);
        tag.phase = (tag.phase + tag.phase_step + rng.gen_range(-0.05..0.05)).rem_euclid(TAU);

        // Reader reports phase as a 12-bit count
        let reported = (tag.phase + offset).rem_euclid(TAU);
        let units = ((reported / TAU) * IMPINJ_PHASE_UNITS) as u16 % IMPINJ_PHASE_UNITS as u16;
        let doppler = tag.phase_step * 10.0 + rng.gen_range(-0.5..0.5);

        let event = TagReportEvent::new(
            tag.id.clone(),
            now,
            (tag.rssi * 2.0).round() / 2.0,
            TagReportEvent::phase_from_impinj(units),
            tag.mode,
            tag.antenna,
            channel,
        )
        .with_doppler(doppler);
        Some(event)
    }

    /// Submit reads at the configured rate until `shutdown` flips to true
    ///
    /// A stopped session rejects reads; the simulator keeps running so a
    /// later `start` resumes the stream.
    pub async fn run(
        mut self,
        handle: IngestHandle,
        clock: SessionClock,
        mut shutdown: watch::Receiver<bool>,
    ) {
        log::info!(
            "🛰  Simulated reader: {} tags at {} reads/s",
            self.tags.len(),
            self.reads_per_sec
        );

        let mut ticker = interval(BATCH_INTERVAL);
        let per_batch = self.reads_per_sec as f64 * BATCH_INTERVAL.as_secs_f64();
        let mut carry = 0.0;
        let mut submitted: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    carry += per_batch;
                    let count = carry.floor() as usize;
                    carry -= count as f64;

                    let now = clock();
                    for _ in 0..count {
                        let Some(event) = self.next_event(now) else { break };
                        if handle.submit(event) != SubmitOutcome::Closed {
                            submitted += 1;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        log::info!("Simulated reader stopped after {} reads", submitted);
    }
}
