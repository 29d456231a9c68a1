//! # Server Metrics
//!
//! Count requests, error replies and in-flight work, and keep a latency
//! histogram, so `INFO` can report how the front end is doing.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events cheaply.
//! 2. **Fixed Buckets**: Histogram buckets live in a contiguous array.
//! 3. **Snapshots**: Readers get plain structs, never live counters.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default latency bucket boundaries in microseconds.
pub const DEFAULT_LATENCY_BUCKETS_US: [u64; 12] =
    [1, 2, 5, 10, 20, 50, 100, 200, 500, 1_000, 2_000, 5_000];

/// Point-in-time copy of all server metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub requests_total: u64,
    pub errors_total: u64,
    pub inflight: u64,
    pub latency: LatencySnapshot,
}

/// Point-in-time copy of the latency histogram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Bucket boundaries in microseconds.
    pub bounds_us: Vec<u64>,
    /// Bucket counts; the last entry is the overflow bucket.
    pub buckets: Vec<u64>,
    pub samples: u64,
    pub sum_us: u64,
}

impl LatencySnapshot {
    /// Mean latency in microseconds, zero when empty.
    pub fn mean_us(&self) -> u64 {
        self.sum_us.checked_div(self.samples).unwrap_or(0)
    }

    /// Upper bound of the bucket holding the `q` quantile (`0.0..=1.0`).
    ///
    /// Samples in the overflow bucket report `u64::MAX`.
    pub fn quantile_us(&self, q: f64) -> u64 {
        if self.samples == 0 {
            return 0;
        }
        let rank = ((self.samples as f64) * q.clamp(0.0, 1.0)).ceil().max(1.0) as u64;
        let mut seen = 0;
        for (idx, count) in self.buckets.iter().enumerate() {
            seen += count;
            if seen >= rank {
                return self.bounds_us.get(idx).copied().unwrap_or(u64::MAX);
            }
        }
        u64::MAX
    }
}

/// Thread-safe metrics aggregator shared by all connection tasks.
///
/// `Ordering::Relaxed` is enough: fields are read independently.
#[derive(Debug)]
pub struct Metrics {
    connections_total: AtomicU64,
    requests_total: AtomicU64,
    errors_total: AtomicU64,
    inflight: AtomicU64,
    latency: LatencyHistogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::with_latency_buckets(DEFAULT_LATENCY_BUCKETS_US.to_vec())
    }

    /// Creates an aggregator with custom bucket bounds (ascending microseconds).
    pub fn with_latency_buckets(bounds_us: Vec<u64>) -> Self {
        Metrics {
            connections_total: AtomicU64::new(0),
            requests_total: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            inflight: AtomicU64::new(0),
            latency: LatencyHistogram::new(bounds_us),
        }
    }

    pub fn record_connection(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the start of a request.
    pub fn record_request_start(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the end of a request and its latency.
    pub fn record_request_end(&self, latency: Duration) {
        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.latency.record(latency);
    }

    /// Records an error reply.
    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            requests_total: self.requests_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            inflight: self.inflight.load(Ordering::Relaxed),
            latency: self.latency.snapshot(),
        }
    }

    /// Renders the `# Stats` section of `INFO`.
    pub fn render_info(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::from("# Stats\r\n");
        let _ = write!(
            out,
            "total_connections_received:{}\r\n\
             total_commands_processed:{}\r\n\
             total_error_replies:{}\r\n\
             inflight_commands:{}\r\n\
             latency_mean_us:{}\r\n\
             latency_p99_us:{}\r\n",
            snapshot.connections_total,
            snapshot.requests_total,
            snapshot.errors_total,
            snapshot.inflight,
            snapshot.latency.mean_us(),
            snapshot.latency.quantile_us(0.99),
        );
        out
    }
}

/// Fixed-bucket latency histogram.
///
/// Bucket selection is a linear scan; the list is short.
#[derive(Debug)]
pub struct LatencyHistogram {
    bounds_us: Vec<u64>,
    buckets: Vec<AtomicU64>,
    sum_us: AtomicU64,
    samples: AtomicU64,
}

impl LatencyHistogram {
    /// Creates `bounds_us.len() + 1` buckets; the last one is overflow.
    pub fn new(bounds_us: Vec<u64>) -> Self {
        let buckets = (0..=bounds_us.len()).map(|_| AtomicU64::new(0)).collect();
        LatencyHistogram {
            bounds_us,
            buckets,
            sum_us: AtomicU64::new(0),
            samples: AtomicU64::new(0),
        }
    }

    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.sum_us.fetch_add(micros, Ordering::Relaxed);

        let idx = self
            .bounds_us
            .iter()
            .position(|&bound| micros <= bound)
            .unwrap_or(self.bounds_us.len());
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            bounds_us: self.bounds_us.clone(),
            buckets: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            samples: self.samples.load(Ordering::Relaxed),
            sum_us: self.sum_us.load(Ordering::Relaxed),
        }
    }
}
