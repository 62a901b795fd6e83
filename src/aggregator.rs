use {
    crate::event::TagId,
    std::{
        collections::{HashMap, VecDeque},
        time::Duration,
    },
};

/// Read counts inside a trailing interval
///
/// Same head/tail discipline as the rolling buffers; each entry carries the
/// number of reads the reader folded into one report.
#[derive(Debug, Clone, Default)]
pub struct ReadWindow {
    reads: VecDeque<(Duration, u64)>,
    count: u64,
    first_read: Option<Duration>,
}

impl ReadWindow {
    fn record(&mut self, timestamp: Duration, count: u64, interval: Duration) {
        let timestamp = match self.reads.back() {
            Some(&(tail, _)) if tail > timestamp => tail,
            _ => timestamp,
        };
        self.first_read.get_or_insert(timestamp);
        self.reads.push_back((timestamp, count));
        self.count += count;
        if let Some(cutoff) = timestamp.checked_sub(interval) {
            self.evict_through(cutoff);
        }
    }

    /// Drop entries at or before `cutoff`; the interval is half-open
    fn evict_through(&mut self, cutoff: Duration) {
        while let Some(&(head, count)) = self.reads.front() {
            if head > cutoff {
                break;
            }
            self.reads.pop_front();
            self.count -= count;
        }
    }

    /// Reads per second over the interval ending at `now`; zero below two reads
    ///
    /// Until a full interval has passed since the first read, the rate is
    /// measured from that first read instead.
    pub fn rate(&self, now: Duration, interval: Duration) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let Some(first) = self.first_read else {
            return 0.0;
        };

        let elapsed = now.saturating_sub(first);
        if elapsed >= interval {
            return self.count as f64 / interval.as_secs_f64();
        }
        if elapsed.is_zero() {
            return 0.0;
        }
        (self.count - 1) as f64 / elapsed.as_secs_f64()
    }

    /// Reads currently inside the interval
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }
}

/// Global and per-tag read-rate aggregator
///
/// Holds read counts only within the aggregation interval, never events.
/// Rates are measured against the latest time seen by `record` or
/// `expire`, so they fall off as reads age out once a tag goes quiet.
pub struct ReadRateAggregator {
    interval: Duration,
    now: Duration,
    global: ReadWindow,
    per_tag: HashMap<TagId, ReadWindow>,
    total_reads: u64,
}

impl ReadRateAggregator {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            now: Duration::ZERO,
            global: ReadWindow::default(),
            per_tag: HashMap::new(),
            total_reads: 0,
        }
    }

    pub fn record(&mut self, tag: &TagId, timestamp: Duration) {
        self.record_seen(tag, timestamp, 1);
    }

    /// Record one report standing for `seen_count` reads
    pub fn record_seen(&mut self, tag: &TagId, timestamp: Duration, seen_count: u32) {
        let count = seen_count.max(1) as u64;
        self.now = self.now.max(timestamp);
        self.global.record(timestamp, count, self.interval);
        self.per_tag
            .entry(tag.clone())
            .or_default()
            .record(timestamp, count, self.interval);
        self.total_reads += count;
    }

    /// Advance the clock to `now` and drop reads that left the interval
    pub fn expire(&mut self, now: Duration) {
        self.now = self.now.max(now);
        let Some(cutoff) = self.now.checked_sub(self.interval) else {
            return;
        };
        self.global.evict_through(cutoff);
        for window in self.per_tag.values_mut() {
            window.evict_through(cutoff);
        }
    }

    pub fn global_rate(&self) -> f64 {
        self.global.rate(self.now, self.interval)
    }

    pub fn rate_for(&self, tag: &TagId) -> f64 {
        self.per_tag
            .get(tag)
            .map(|w| w.rate(self.now, self.interval))
            .unwrap_or(0.0)
    }

    /// Stop tracking a destroyed tag
    pub fn forget(&mut self, tag: &TagId) {
        self.per_tag.remove(tag);
    }

    pub fn total_reads(&self) -> u64 {
        self.total_reads
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn reset(&mut self) {
        self.now = Duration::ZERO;
        self.global = ReadWindow::default();
        self.per_tag.clear();
        self.total_reads = 0;
    }
}
