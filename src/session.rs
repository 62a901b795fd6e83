//! Inventory session: the explicit context that owns every core component
//!
//! ```text
//! reader client ──submit──▶ IngestQueue
//!                               │ drain (once per tick)
//!                               ▼
//!                  signal::process → RollingBuffer → TagRegistry
//!                               │                       │ sweep
//!                               ▼                       ▼
//!                       ReadRateAggregator      IdentityAllocator
//!                               │
//!            render: snapshot_for / snapshot_all / stats / export
//! ```
//!
//! Only the ingest queue is shared with producer threads. Everything else
//! is mutated inside `tick` on the processing context, so render reads
//! between ticks need no locking.

use crate::{
    aggregator::ReadRateAggregator,
    config::MonitorConfig,
    event::TagId,
    export::{self, ExportRow},
    ingest::{IngestCounters, IngestHandle, IngestQueue},
    palette::{IdentityAllocator, VisualIdentity},
    registry::{Metric, ObserveOutcome, TagLifecycle, TagRegistry, TagState},
    window::Sample,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Monotonic session clock, offset from session start
pub type SessionClock = Arc<dyn Fn() -> Duration + Send + Sync>;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub processed: usize,
    pub created: usize,
    pub revived: usize,
    pub swept: bool,
    pub newly_stale: usize,
    pub destroyed: usize,
}

/// Aggregate statistics and degraded-data counters for the render layer
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub running: bool,
    pub global_rate: f64,
    pub total_reads: u64,
    pub live_tags: usize,
    pub stale_tags: usize,
    pub tags_created: u64,
    pub palette_size: usize,
    pub identities_in_use: usize,
    pub palette_exhaustions: u64,
    pub mode_resets: u64,
    pub phase_ambiguities: u64,
    pub ingest: IngestCounters,
}

/// Buffer contents of one tag, copied out for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct TagSnapshot {
    pub id: TagId,
    pub lifecycle: TagLifecycle,
    pub identity: Option<VisualIdentity>,
    pub read_count: u64,
    pub rssi: Vec<Sample>,
    pub phase: Vec<Sample>,
    pub phase_delta: Vec<Sample>,
    pub corrected_phase: Vec<Sample>,
    pub doppler: Vec<Sample>,
}

impl TagSnapshot {
    fn from_state(state: &TagState) -> Self {
        Self {
            id: state.id.clone(),
            lifecycle: state.lifecycle,
            identity: state.identity,
            read_count: state.read_count,
            rssi: state.rssi.snapshot(),
            phase: state.phase.snapshot(),
            phase_delta: state.phase_delta.snapshot(),
            corrected_phase: state.corrected_phase.snapshot(),
            doppler: state.doppler.snapshot(),
        }
    }

    pub fn series(&self, metric: Metric) -> &[Sample] {
        match metric {
            Metric::Rssi => &self.rssi,
            Metric::Phase => &self.phase,
            Metric::PhaseDelta => &self.phase_delta,
            Metric::CorrectedPhase => &self.corrected_phase,
            Metric::Doppler => &self.doppler,
        }
    }
}

pub struct InventorySession {
    config: MonitorConfig,
    queue: IngestQueue,
    registry: TagRegistry,
    allocator: IdentityAllocator,
    rates: ReadRateAggregator,
    clock: SessionClock,
    last_sweep: Option<Duration>,
    ticks: u64,
}

impl InventorySession {
    /// Create a session whose clock starts now
    pub fn new(config: MonitorConfig) -> Self {
        let start = Instant::now();
        Self::with_clock(config, Arc::new(move || start.elapsed()))
    }

    /// Create a session driven by a custom clock (tests, replay)
    pub fn with_clock(config: MonitorConfig, clock: SessionClock) -> Self {
        log::info!(
            "Inventory session: palette={} window={} samples/{}ms stale={}ms destroy={}ms sweep={}ms channel={}",
            config.palette_size,
            config.window_max_samples,
            config.window_max_age.as_millis(),
            config.stale_after.as_millis(),
            config.destroy_after.as_millis(),
            config.sweep_interval.as_millis(),
            config.channel_capacity,
        );

        Self {
            queue: IngestQueue::new(config.channel_capacity),
            registry: TagRegistry::new(config.window_bounds(), config.signal_params(), config.retention()),
            allocator: config.allocator(),
            rates: ReadRateAggregator::new(config.rate_window),
            clock,
            last_sweep: None,
            ticks: 0,
            config,
        }
    }

    /// Producer handle for the reader client; may be moved to any thread
    pub fn ingest_handle(&self) -> IngestHandle {
        self.queue.handle()
    }

    /// Shared clock so producers stamp events on the session time base
    pub fn clock(&self) -> SessionClock {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> Duration {
        (self.clock)()
    }

    pub fn tick(&mut self) -> TickReport {
        let now = self.now();
        self.tick_at(now)
    }

    /// Process every queued event, then run the retirement sweep if due
    pub fn tick_at(&mut self, now: Duration) -> TickReport {
        let mut report = TickReport::default();

        for event in self.queue.drain() {
            let (outcome, _) = self.registry.observe(&event, &mut self.allocator);
            self.rates.record_seen(&event.tag, event.timestamp, event.seen_count);
            report.processed += 1;
            match outcome {
                ObserveOutcome::Created { .. } => report.created += 1,
                ObserveOutcome::Revived => report.revived += 1,
                ObserveOutcome::Updated => {}
            }
        }

        self.rates.expire(now);

        let sweep_due = match self.last_sweep {
            Some(last) => now.saturating_sub(last) >= self.config.sweep_interval,
            None => true,
        };
        if sweep_due {
            let sweep = self.registry.sweep(now, &mut self.allocator);
            for id in &sweep.destroyed {
                self.rates.forget(id);
            }
            report.swept = true;
            report.newly_stale = sweep.newly_stale.len();
            report.destroyed = sweep.destroyed.len();
            self.last_sweep = Some(now);
        }

        self.ticks += 1;
        report
    }

    pub fn snapshot_for(&self, tag: &TagId) -> Option<TagSnapshot> {
        self.registry.get(tag).map(TagSnapshot::from_state)
    }

    /// Every tracked tag, first-seen order
    pub fn snapshot_all(&self) -> Vec<TagSnapshot> {
        self.registry
            .ordered()
            .into_iter()
            .map(TagSnapshot::from_state)
            .collect()
    }

    /// Tag → identity mapping; `None` marks a tag rendered with the fallback marker
    pub fn allocated_identities(&self) -> Vec<(TagId, Option<VisualIdentity>)> {
        self.registry
            .ordered()
            .into_iter()
            .map(|s| (s.id.clone(), s.identity))
            .collect()
    }

    pub fn free_identities(&self) -> Vec<VisualIdentity> {
        self.allocator.free_slots()
    }

    pub fn lifecycle(&self, tag: &TagId) -> Option<TagLifecycle> {
        self.registry.lifecycle(tag)
    }

    pub fn rate_for(&self, tag: &TagId) -> f64 {
        self.rates.rate_for(tag)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            running: !self.queue.is_closed(),
            global_rate: self.rates.global_rate(),
            total_reads: self.rates.total_reads(),
            live_tags: self.registry.count(TagLifecycle::Live),
            stale_tags: self.registry.count(TagLifecycle::Stale),
            tags_created: self.registry.created_total(),
            palette_size: self.allocator.size(),
            identities_in_use: self.allocator.size() - self.allocator.available(),
            palette_exhaustions: self.allocator.exhausted_count(),
            mode_resets: self.registry.mode_resets(),
            phase_ambiguities: self.registry.phase_ambiguities(),
            ingest: self.queue.counters(),
        }
    }

    pub fn export(&self) -> Vec<ExportRow> {
        export::export(&self.registry, &self.rates)
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Forget every tag and counter while staying open for new reads
    pub fn clear(&mut self) {
        let discarded = self.queue.discard();
        self.reset_state();
        self.queue.reset_counters();
        log::info!("Inventory cleared ({} queued events discarded)", discarded);
    }

    /// Close the ingest channel and tear down all tag state synchronously
    pub fn stop(&mut self) {
        self.queue.close();
        let discarded = self.queue.discard();
        let tags = self.registry.len();
        self.reset_state();
        log::info!(
            "Inventory stopped: {} tags destroyed, {} queued events discarded",
            tags,
            discarded
        );
    }

    /// Reopen the ingest channel after `stop`
    pub fn start(&mut self) {
        self.queue.reopen();
        log::info!("Inventory started");
    }

    fn reset_state(&mut self) {
        self.registry.clear();
        self.allocator.reset();
        self.rates.reset();
        self.last_sweep = None;
    }
}
