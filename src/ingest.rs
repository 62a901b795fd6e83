//! Bounded hand-off queue between the reader client and the tick loop
//!
//! Producers may run on any thread and never wait beyond the queue mutex.
//! When the queue is full the oldest queued event is dropped: for a live
//! monitor a fresh read is worth more than a complete history.

use crate::event::TagReportEvent;
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

/// Result of a `submit` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Accepted after evicting the oldest queued event
    AcceptedDroppedOldest,
    /// Missing tag identifier or non-finite readings
    Malformed,
    /// Session stopped
    Closed,
}

/// Read-only counter snapshot for the render layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestCounters {
    pub accepted: u64,
    pub overflow_drops: u64,
    pub malformed_drops: u64,
    pub rejected_closed: u64,
    pub queued: usize,
}

struct Shared {
    queue: Mutex<VecDeque<TagReportEvent>>,
    capacity: usize,
    closed: AtomicBool,
    accepted: AtomicU64,
    overflow_drops: AtomicU64,
    malformed_drops: AtomicU64,
    rejected_closed: AtomicU64,
}

/// Consumer side, owned by the session
pub struct IngestQueue {
    shared: Arc<Shared>,
}

/// Producer side; cheap to clone and `Send + Sync`
#[derive(Clone)]
pub struct IngestHandle {
    shared: Arc<Shared>,
}

impl IngestQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                closed: AtomicBool::new(false),
                accepted: AtomicU64::new(0),
                overflow_drops: AtomicU64::new(0),
                malformed_drops: AtomicU64::new(0),
                rejected_closed: AtomicU64::new(0),
            }),
        }
    }

    pub fn handle(&self) -> IngestHandle {
        IngestHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take every queued event in arrival order
    ///
    /// The swap happens under the queue lock, so each event goes to
    /// exactly one drain.
    pub fn drain(&self) -> Vec<TagReportEvent> {
        let drained = std::mem::take(&mut *self.shared.queue.lock());
        drained.into()
    }

    /// Drain and drop everything queued; returns how many were discarded
    pub fn discard(&self) -> usize {
        let mut queue = self.shared.queue.lock();
        let count = queue.len();
        queue.clear();
        count
    }

    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.shared.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn len(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> IngestCounters {
        let shared = &self.shared;
        IngestCounters {
            accepted: shared.accepted.load(Ordering::Relaxed),
            overflow_drops: shared.overflow_drops.load(Ordering::Relaxed),
            malformed_drops: shared.malformed_drops.load(Ordering::Relaxed),
            rejected_closed: shared.rejected_closed.load(Ordering::Relaxed),
            queued: self.len(),
        }
    }

    pub fn reset_counters(&self) {
        let shared = &self.shared;
        shared.accepted.store(0, Ordering::Relaxed);
        shared.overflow_drops.store(0, Ordering::Relaxed);
        shared.malformed_drops.store(0, Ordering::Relaxed);
        shared.rejected_closed.store(0, Ordering::Relaxed);
    }
}

impl IngestHandle {
    /// Queue an event without blocking on the consumer
    pub fn submit(&self, event: TagReportEvent) -> SubmitOutcome {
        let shared = &self.shared;

        if shared.closed.load(Ordering::SeqCst) {
            shared.rejected_closed.fetch_add(1, Ordering::Relaxed);
            return SubmitOutcome::Closed;
        }

        if !event.is_well_formed() {
            if shared.malformed_drops.fetch_add(1, Ordering::Relaxed) == 0 {
                log::warn!("Dropping malformed tag report (further drops are only counted)");
            }
            return SubmitOutcome::Malformed;
        }

        let mut queue = shared.queue.lock();
        let dropped = if queue.len() >= shared.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(event);
        drop(queue);

        shared.accepted.fetch_add(1, Ordering::Relaxed);
        if dropped {
            if shared.overflow_drops.fetch_add(1, Ordering::Relaxed) == 0 {
                log::warn!("Ingest queue full ({}), dropping oldest events", shared.capacity);
            }
            SubmitOutcome::AcceptedDroppedOldest
        } else {
            SubmitOutcome::Accepted
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}
