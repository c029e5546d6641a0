//! In-process pipeline metrics.
//!
//! Lock-free counters updated by the producer and enrichment workers, read
//! once at the end of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Monotonic event count.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Current level of something that fills and drains, such as the hand-off
/// queue. Never goes below zero.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Request latencies in milliseconds.
///
/// Bucket bounds are tuned for remote HTTP calls, from a fast cached
/// response up to the client timeout.
#[derive(Debug, Default)]
pub struct Latency {
    buckets: [AtomicU64; 8],
    total_ms: AtomicU64,
    max_ms: AtomicU64,
    count: AtomicU64,
}

impl Latency {
    const BOUNDS_MS: [u64; 8] = [50, 100, 250, 500, 1_000, 2_500, 10_000, 30_000];

    pub fn observe(&self, ms: u64) {
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let slot = Self::BOUNDS_MS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BOUNDS_MS.len() - 1);
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn max_ms(&self) -> u64 {
        self.max_ms.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.total_ms.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// `(upper bound, count)` pairs; the last bucket also holds overflows.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BOUNDS_MS
            .iter()
            .zip(&self.buckets)
            .map(|(&bound, n)| (bound, n.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Counters for one invoice run.
#[derive(Debug, Default)]
pub struct Metrics {
    // Producer
    pub pages_fetched: Counter,
    pub sessions_seen: Counter,
    pub sessions_inserted: Counter,
    pub sessions_skipped: Counter,
    pub students_created: Counter,

    // Enrichment
    pub students_enqueued: Counter,
    pub students_enriched: Counter,
    pub enrichment_failures: Counter,
    pub queue_depth: Gauge,

    // Platform client
    pub http_requests: Counter,
    pub rate_limit_retries: Counter,

    pub page_fetch_latency_ms: Latency,
    pub profile_fetch_latency_ms: Latency,
}

/// Point-in-time copy of [`Metrics`], logged at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pages_fetched: u64,
    pub sessions_seen: u64,
    pub sessions_inserted: u64,
    pub sessions_skipped: u64,
    pub students_created: u64,
    pub students_enqueued: u64,
    pub students_enriched: u64,
    pub enrichment_failures: u64,
    pub queue_depth: u64,
    pub http_requests: u64,
    pub rate_limit_retries: u64,
    pub page_fetch_mean_ms: f64,
    pub page_fetch_max_ms: u64,
    pub profile_fetch_mean_ms: f64,
    pub profile_fetch_max_ms: u64,
}

impl Metrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            pages_fetched: self.pages_fetched.get(),
            sessions_seen: self.sessions_seen.get(),
            sessions_inserted: self.sessions_inserted.get(),
            sessions_skipped: self.sessions_skipped.get(),
            students_created: self.students_created.get(),
            students_enqueued: self.students_enqueued.get(),
            students_enriched: self.students_enriched.get(),
            enrichment_failures: self.enrichment_failures.get(),
            queue_depth: self.queue_depth.get(),
            http_requests: self.http_requests.get(),
            rate_limit_retries: self.rate_limit_retries.get(),
            page_fetch_mean_ms: self.page_fetch_latency_ms.mean_ms(),
            page_fetch_max_ms: self.page_fetch_latency_ms.max_ms(),
            profile_fetch_mean_ms: self.profile_fetch_latency_ms.mean_ms(),
            profile_fetch_max_ms: self.profile_fetch_latency_ms.max_ms(),
        }
    }
}

static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::default);

/// Process-wide metrics.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
