//! Rolling window buffers for per-tag time series
//!
//! Every buffer is bounded twice: by sample count and by age. Eviction
//! happens on insertion only, from the head, so a buffer that stops
//! receiving samples keeps its last contents unchanged.

use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};

/// Count and age limits shared by every buffer of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub max_samples: usize,
    pub max_age: Duration,
}

impl WindowBounds {
    pub fn new(max_samples: usize, max_age: Duration) -> Self {
        Self {
            max_samples: max_samples.max(1),
            max_age,
        }
    }
}

/// A single `(timestamp, value)` point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Duration,
    pub value: f64,
}

/// Time-ordered sample buffer
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    samples: VecDeque<Sample>,
    bounds: WindowBounds,
}

impl RollingBuffer {
    pub fn new(bounds: WindowBounds) -> Self {
        Self {
            // Do not preallocate the full bound: most tags never fill it
            samples: VecDeque::with_capacity(bounds.max_samples.min(64)),
            bounds,
        }
    }

    /// Append at the tail, then evict from the head until both bounds hold
    ///
    /// A timestamp older than the current tail is clamped to the tail so
    /// the buffer stays non-decreasing under out-of-order delivery.
    pub fn append(&mut self, timestamp: Duration, value: f64) {
        let timestamp = match self.samples.back() {
            Some(tail) if tail.timestamp > timestamp => tail.timestamp,
            _ => timestamp,
        };

        self.samples.push_back(Sample { timestamp, value });

        while self.samples.len() > self.bounds.max_samples {
            self.samples.pop_front();
        }

        let cutoff = timestamp.saturating_sub(self.bounds.max_age);
        while let Some(head) = self.samples.front() {
            if head.timestamp >= cutoff {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    pub fn oldest(&self) -> Option<Sample> {
        self.samples.front().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Span between oldest and newest retained samples
    pub fn span(&self) -> Duration {
        match (self.samples.front(), self.samples.back()) {
            (Some(head), Some(tail)) => tail.timestamp.saturating_sub(head.timestamp),
            _ => Duration::ZERO,
        }
    }

    pub fn bounds(&self) -> WindowBounds {
        self.bounds
    }
}
