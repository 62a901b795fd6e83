//! Tag registry and per-tag lifecycle
//!
//! Lifecycle per tag identifier: Unseen → Live → Stale → Destroyed.
//!
//! - First event creates the [`TagState`] (Live) and requests an identity.
//! - Further events update it; a Stale tag hearing a new event is Live again.
//! - A sweep marks Live tags Stale once `now - last_seen` passes the stale
//!   threshold. Buffers and identity are kept so the fading trend stays
//!   visible.
//! - A later sweep destroys Stale tags past the destroy threshold, releasing
//!   their identity and dropping their buffers.
//!
//! Unseen and Destroyed have no representation: the tag is simply absent.

use crate::{
    event::{ModulationMode, TagId, TagReportEvent},
    palette::{IdentityAllocator, VisualIdentity},
    signal::{self, DerivedSample, SignalParams, SignalState},
    window::{RollingBuffer, WindowBounds},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagLifecycle {
    Live,
    Stale,
}

impl TagLifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagLifecycle::Live => "LIVE",
            TagLifecycle::Stale => "STALE",
        }
    }
}

/// Retirement thresholds, both measured from a tag's last read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub stale_after: Duration,
    pub destroy_after: Duration,
}

/// Rolling metric buffers a tag carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Rssi,
    Phase,
    PhaseDelta,
    CorrectedPhase,
    Doppler,
}

impl Metric {
    pub fn all() -> [Metric; 5] {
        [
            Metric::Rssi,
            Metric::Phase,
            Metric::PhaseDelta,
            Metric::CorrectedPhase,
            Metric::Doppler,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Rssi => "RSSI (dBm, smoothed)",
            Metric::Phase => "Unwrapped phase (rad)",
            Metric::PhaseDelta => "Phase delta (rad)",
            Metric::CorrectedPhase => "Corrected phase (rad)",
            Metric::Doppler => "Doppler (Hz)",
        }
    }

    pub fn next(&self) -> Metric {
        match self {
            Metric::Rssi => Metric::Phase,
            Metric::Phase => Metric::PhaseDelta,
            Metric::PhaseDelta => Metric::CorrectedPhase,
            Metric::CorrectedPhase => Metric::Doppler,
            Metric::Doppler => Metric::Rssi,
        }
    }
}

/// Everything tracked for one live tag identifier
#[derive(Debug, Clone)]
pub struct TagState {
    pub id: TagId,
    pub lifecycle: TagLifecycle,
    pub first_seen: Duration,
    pub last_seen: Duration,
    pub read_count: u64,
    pub identity: Option<VisualIdentity>,
    pub best_rssi: f64,
    pub last_raw_phase: f64,
    pub last_mode: ModulationMode,
    pub last_antenna: u16,
    pub first_channel: u16,
    pub last_channel: u16,
    pub rssi: RollingBuffer,
    pub phase: RollingBuffer,
    pub phase_delta: RollingBuffer,
    /// Phase with the per-channel offset removed
    pub corrected_phase: RollingBuffer,
    pub doppler: RollingBuffer,
    /// Creation order, breaks first-seen ties
    sequence: u64,
    signal: SignalState,
}

impl TagState {
    fn new(
        event: &TagReportEvent,
        derived: &DerivedSample,
        bounds: WindowBounds,
        params: &SignalParams,
        sequence: u64,
    ) -> Self {
        let mut state = Self {
            id: event.tag.clone(),
            lifecycle: TagLifecycle::Live,
            first_seen: event.timestamp,
            last_seen: event.timestamp,
            read_count: 0,
            identity: None,
            best_rssi: event.rssi,
            last_raw_phase: event.phase,
            last_mode: event.mode,
            last_antenna: event.antenna,
            first_channel: event.channel,
            last_channel: event.channel,
            rssi: RollingBuffer::new(bounds),
            phase: RollingBuffer::new(bounds),
            phase_delta: RollingBuffer::new(bounds),
            corrected_phase: RollingBuffer::new(bounds),
            doppler: RollingBuffer::new(bounds),
            sequence,
            signal: SignalState::seed(event, derived, params),
        };
        state.push_samples(event, derived);
        state
    }

    fn update(&mut self, event: &TagReportEvent, derived: &DerivedSample, params: &SignalParams) {
        self.lifecycle = TagLifecycle::Live;
        self.last_seen = self.last_seen.max(event.timestamp);
        self.best_rssi = self.best_rssi.max(event.rssi);
        self.last_raw_phase = event.phase;
        self.last_mode = event.mode;
        self.last_antenna = event.antenna;
        self.last_channel = event.channel;
        self.signal.record(event, derived, params);
        self.push_samples(event, derived);
    }

    fn push_samples(&mut self, event: &TagReportEvent, derived: &DerivedSample) {
        self.read_count += u64::from(event.seen_count.max(1));
        self.rssi.append(derived.timestamp, derived.smoothed_rssi);
        self.phase.append(derived.timestamp, derived.unwrapped_phase);
        if let Some(delta) = derived.phase_delta {
            self.phase_delta.append(derived.timestamp, delta);
        }
        self.corrected_phase.append(derived.timestamp, derived.corrected_phase);
        if let Some(doppler) = event.doppler_hz {
            self.doppler.append(derived.timestamp, doppler);
        }
    }

    pub fn buffer(&self, metric: Metric) -> &RollingBuffer {
        match metric {
            Metric::Rssi => &self.rssi,
            Metric::Phase => &self.phase,
            Metric::PhaseDelta => &self.phase_delta,
            Metric::CorrectedPhase => &self.corrected_phase,
            Metric::Doppler => &self.doppler,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// What an event did to the registry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObserveOutcome {
    Created { identity: Option<VisualIdentity> },
    Updated,
    /// Stale tag heard again before being destroyed
    Revived,
}

/// Result of one retirement sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub newly_stale: Vec<TagId>,
    pub destroyed: Vec<TagId>,
    pub released: Vec<VisualIdentity>,
    /// Unassigned tags that received a freed identity
    pub backfilled: Vec<(TagId, VisualIdentity)>,
}

/// Owner of every [`TagState`]
pub struct TagRegistry {
    tags: HashMap<TagId, TagState>,
    bounds: WindowBounds,
    params: SignalParams,
    retention: RetentionPolicy,
    next_sequence: u64,
    created_total: u64,
    mode_resets: u64,
    phase_ambiguities: u64,
}

impl TagRegistry {
    pub fn new(bounds: WindowBounds, params: SignalParams, retention: RetentionPolicy) -> Self {
        Self {
            tags: HashMap::new(),
            bounds,
            params,
            retention,
            next_sequence: 0,
            created_total: 0,
            mode_resets: 0,
            phase_ambiguities: 0,
        }
    }

    /// Apply one event: create, update or revive the tag
    ///
    /// Palette exhaustion never blocks: the tag is tracked without an
    /// identity and retried on later reads.
    pub fn observe(
        &mut self,
        event: &TagReportEvent,
        allocator: &mut IdentityAllocator,
    ) -> (ObserveOutcome, DerivedSample) {
        let params = self.params;

        if let Some(state) = self.tags.get_mut(&event.tag) {
            let derived = signal::process(event, Some(&state.signal), &params);
            let was_stale = state.lifecycle == TagLifecycle::Stale;
            state.update(event, &derived, &params);

            if state.identity.is_none() && allocator.available() > 0 {
                state.identity = allocator.allocate();
            }

            if derived.mode_reset {
                self.mode_resets += 1;
            }
            if derived.phase_ambiguous {
                self.phase_ambiguities += 1;
            }

            let outcome = if was_stale {
                log::debug!("Tag {} revived", event.tag);
                ObserveOutcome::Revived
            } else {
                ObserveOutcome::Updated
            };
            return (outcome, derived);
        }

        let derived = signal::process(event, None, &params);
        let mut state = TagState::new(event, &derived, self.bounds, &params, self.next_sequence);
        self.next_sequence += 1;
        self.created_total += 1;

        state.identity = allocator.allocate();
        match state.identity {
            Some(identity) => log::debug!("Tag {} live with identity {}", event.tag, identity.index()),
            None => log::warn!(
                "Palette exhausted ({} slots), tag {} tracked without identity",
                allocator.size(),
                event.tag
            ),
        }

        let identity = state.identity;
        self.tags.insert(event.tag.clone(), state);
        (ObserveOutcome::Created { identity }, derived)
    }

    /// Retirement sweep; idempotent for a given `now`
    ///
    /// A tag is destroyed only if it was already Stale when the sweep began,
    /// so Live → Destroyed always takes at least two sweeps.
    pub fn sweep(&mut self, now: Duration, allocator: &mut IdentityAllocator) -> SweepReport {
        let mut report = SweepReport::default();

        let doomed: Vec<TagId> = self
            .tags
            .values()
            .filter(|s| s.lifecycle == TagLifecycle::Stale)
            .filter(|s| now.saturating_sub(s.last_seen) > self.retention.destroy_after)
            .map(|s| s.id.clone())
            .collect();

        for id in doomed {
            if let Some(state) = self.tags.remove(&id) {
                if let Some(identity) = state.identity {
                    if allocator.release(identity) {
                        report.released.push(identity);
                    }
                }
                log::debug!("Tag {} destroyed after {} reads", id, state.read_count);
                report.destroyed.push(id);
            }
        }

        for state in self.tags.values_mut() {
            if state.lifecycle == TagLifecycle::Live
                && now.saturating_sub(state.last_seen) > self.retention.stale_after
            {
                state.lifecycle = TagLifecycle::Stale;
                report.newly_stale.push(state.id.clone());
            }
        }

        if allocator.available() > 0 {
            report.backfilled = self.backfill(allocator);
        }

        report
    }

    /// Hand free identities to unassigned tags, oldest first
    fn backfill(&mut self, allocator: &mut IdentityAllocator) -> Vec<(TagId, VisualIdentity)> {
        let mut waiting: Vec<&mut TagState> =
            self.tags.values_mut().filter(|s| s.identity.is_none()).collect();
        waiting.sort_by_key(|s| (s.first_seen, s.sequence));

        let mut assigned = Vec::new();
        for state in waiting {
            if allocator.available() == 0 {
                break;
            }
            if let Some(identity) = allocator.allocate() {
                state.identity = Some(identity);
                assigned.push((state.id.clone(), identity));
            }
        }
        assigned
    }

    pub fn get(&self, id: &TagId) -> Option<&TagState> {
        self.tags.get(id)
    }

    /// `None` means Unseen (or already Destroyed)
    pub fn lifecycle(&self, id: &TagId) -> Option<TagLifecycle> {
        self.tags.get(id).map(|s| s.lifecycle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagState> + '_ {
        self.tags.values()
    }

    /// Tags ordered by first-seen timestamp, then creation order
    pub fn ordered(&self) -> Vec<&TagState> {
        let mut tags: Vec<&TagState> = self.tags.values().collect();
        tags.sort_by_key(|s| (s.first_seen, s.sequence));
        tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn count(&self, lifecycle: TagLifecycle) -> usize {
        self.tags.values().filter(|s| s.lifecycle == lifecycle).count()
    }

    /// Distinct tags created since the registry was built or cleared
    pub fn created_total(&self) -> u64 {
        self.created_total
    }

    pub fn mode_resets(&self) -> u64 {
        self.mode_resets
    }

    pub fn phase_ambiguities(&self) -> u64 {
        self.phase_ambiguities
    }

    /// Drop every tag without releasing identities one by one; the caller
    /// resets the allocator
    pub fn clear(&mut self) {
        self.tags.clear();
        self.next_sequence = 0;
        self.created_total = 0;
        self.mode_resets = 0;
        self.phase_ambiguities = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn secs(v: u64) -> Duration {
        Duration::from_secs(v)
    }

    fn registry() -> TagRegistry {
        TagRegistry::new(
            WindowBounds::new(100, secs(60)),
            SignalParams::default(),
            RetentionPolicy {
                stale_after: secs(3),
                destroy_after: secs(10),
            },
        )
    }

    fn read(tag: &str, t: u64, rssi: f64) -> TagReportEvent {
        TagReportEvent::new(TagId::from(tag), secs(t), rssi, 0.5, ModulationMode::Fm0, 1, 7)
    }

    #[test]
    fn test_first_read_creates_live_tag() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(4);

        assert_eq!(reg.lifecycle(&TagId::from("A1")), None);
        let (outcome, _) = reg.observe(&read("A1", 0, -50.0), &mut alloc);

        assert!(matches!(outcome, ObserveOutcome::Created { identity: Some(_) }));
        assert_eq!(reg.lifecycle(&TagId::from("A1")), Some(TagLifecycle::Live));
        assert_eq!(reg.created_total(), 1);
    }

    #[test]
    fn test_updates_accumulate() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(4);
        reg.observe(&read("A1", 0, -50.0), &mut alloc);
        reg.observe(&read("A1", 1, -45.0).with_doppler(12.0), &mut alloc);

        let state = reg.get(&TagId::from("A1")).unwrap();
        assert_eq!(state.read_count, 2);
        assert_eq!(state.best_rssi, -45.0);
        assert_eq!(state.last_seen, secs(1));
        assert_eq!(state.rssi.len(), 2);
        assert_eq!(state.phase_delta.len(), 1);
        assert_eq!(state.doppler.latest().map(|s| s.value), Some(12.0));
    }

    #[test]
    fn test_seen_count_and_corrected_phase_recorded() {
        // Test: folded reads count toward read_count and hops fill the corrected buffer
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(4);
        reg.observe(&read("A1", 0, -50.0).with_seen_count(3), &mut alloc);
        let mut hop = read("A1", 1, -50.0);
        hop.channel = 12;
        hop.phase = 2.0;
        reg.observe(&hop, &mut alloc);

        let state = reg.get(&TagId::from("A1")).unwrap();
        assert_eq!(state.read_count, 4);
        assert_eq!(state.buffer(Metric::CorrectedPhase).len(), 2);
        let corrected: Vec<f64> = state.corrected_phase.snapshot().iter().map(|s| s.value).collect();
        assert!((corrected[0] - 0.5).abs() < 1e-12);
        assert!((corrected[1] - 0.5).abs() < 1e-12, "hop holds the previous corrected value");
    }

    #[test]
    fn test_stale_then_revived() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(4);
        reg.observe(&read("A1", 0, -50.0), &mut alloc);

        let report = reg.sweep(secs(4), &mut alloc);
        assert_eq!(report.newly_stale, vec![TagId::from("A1")]);
        let identity = reg.get(&TagId::from("A1")).unwrap().identity;

        let (outcome, _) = reg.observe(&read("A1", 5, -50.0), &mut alloc);
        assert_eq!(outcome, ObserveOutcome::Revived);
        assert_eq!(reg.lifecycle(&TagId::from("A1")), Some(TagLifecycle::Live));
        assert_eq!(reg.get(&TagId::from("A1")).unwrap().identity, identity);
    }

    #[test]
    fn test_destroy_requires_prior_stale() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(4);
        reg.observe(&read("A1", 0, -50.0), &mut alloc);

        // Far past both thresholds but never swept: first sweep only marks stale
        let report = reg.sweep(secs(20), &mut alloc);
        assert!(report.destroyed.is_empty());
        assert_eq!(reg.lifecycle(&TagId::from("A1")), Some(TagLifecycle::Stale));
        assert_eq!(alloc.available(), 3, "identity held while stale");

        let report = reg.sweep(secs(21), &mut alloc);
        assert_eq!(report.destroyed, vec![TagId::from("A1")]);
        assert_eq!(report.released.len(), 1);
        assert!(reg.get(&TagId::from("A1")).is_none());
        assert_eq!(alloc.available(), 4);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(4);
        reg.observe(&read("A1", 0, -50.0), &mut alloc);

        let first = reg.sweep(secs(5), &mut alloc);
        let second = reg.sweep(secs(5), &mut alloc);
        assert_eq!(first.newly_stale.len(), 1);
        assert_eq!(second, SweepReport::default());
    }

    #[test]
    fn test_exhausted_palette_backfills_in_first_seen_order() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(1);

        reg.observe(&read("A1", 0, -50.0), &mut alloc);
        let (b_outcome, _) = reg.observe(&read("B2", 1, -50.0), &mut alloc);
        reg.observe(&read("C3", 2, -50.0), &mut alloc);
        assert_eq!(b_outcome, ObserveOutcome::Created { identity: None });
        assert_eq!(alloc.exhausted_count(), 2);

        // Keep B2 and C3 fresh while A1 retires
        reg.sweep(secs(4), &mut alloc);
        reg.observe(&read("B2", 11, -50.0), &mut alloc);
        reg.observe(&read("C3", 11, -50.0), &mut alloc);
        let report = reg.sweep(secs(12), &mut alloc);

        assert_eq!(report.destroyed, vec![TagId::from("A1")]);
        assert_eq!(report.backfilled.len(), 1);
        assert_eq!(report.backfilled[0].0, TagId::from("B2"));
        assert!(reg.get(&TagId::from("C3")).unwrap().identity.is_none());
    }

    #[test]
    fn test_no_identity_shared_between_tracked_tags() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(3);

        for t in 0..40u64 {
            let tag = format!("T{}", t % 7);
            reg.observe(&read(&tag, t, -60.0), &mut alloc);
            if t % 3 == 0 {
                reg.sweep(secs(t), &mut alloc);
            }

            let held: Vec<VisualIdentity> = reg.iter().filter_map(|s| s.identity).collect();
            let unique: HashSet<VisualIdentity> = held.iter().copied().collect();
            assert_eq!(held.len(), unique.len(), "identity collision at t={}", t);
            assert!(held.iter().all(|id| !alloc.is_free(*id)));
        }
    }

    #[test]
    fn test_ordered_by_first_seen() {
        let mut reg = registry();
        let mut alloc = IdentityAllocator::new(8);
        reg.observe(&read("Z9", 0, -50.0), &mut alloc);
        reg.observe(&read("A1", 0, -50.0), &mut alloc);
        reg.observe(&read("M5", 1, -50.0), &mut alloc);

        let order: Vec<String> = reg.ordered().iter().map(|s| s.id.to_string()).collect();
        assert_eq!(
            order,
            vec![TagId::from("Z9").to_string(), TagId::from("A1").to_string(), TagId::from("M5").to_string()]
        );
    }
}
