//! Resolution metrics
//!
//! Advisory counters only; nothing reads them to make decisions.

use super::resolver::Strategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide resolution counters
#[derive(Debug, Default)]
pub struct Metrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    failures: AtomicU64,

    // Successes per strategy
    structural: AtomicU64,
    synthesized: AtomicU64,
    full_script: AtomicU64,
    heuristic: AtomicU64,

    throttle_requests: AtomicU64,
    throttle_passthrough: AtomicU64,

    // Latency of non-cached resolutions (in microseconds)
    latency_total_us: AtomicU64,
    latency_samples: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature resolution served from the cache
    pub fn record_hit(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a signature resolution that missed the cache
    pub fn record_miss(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the strategy that produced a result and how long it took
    pub fn record_success(&self, strategy: Strategy, latency: Duration) {
        let counter = match strategy {
            Strategy::Cache => return,
            Strategy::Structural => &self.structural,
            Strategy::Synthesized => &self.synthesized,
            Strategy::FullScript => &self.full_script,
            Strategy::Heuristic => &self.heuristic,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// Record a throttle decode; `passthrough` when the input came back unchanged
    pub fn record_throttle(&self, passthrough: bool) {
        self.throttle_requests.fetch_add(1, Ordering::Relaxed);
        if passthrough {
            self.throttle_passthrough.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_latency(&self, latency: Duration) {
        self.latency_total_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            structural: self.structural.load(Ordering::Relaxed),
            synthesized: self.synthesized.load(Ordering::Relaxed),
            full_script: self.full_script.load(Ordering::Relaxed),
            heuristic: self.heuristic.load(Ordering::Relaxed),
            throttle_requests: self.throttle_requests.load(Ordering::Relaxed),
            throttle_passthrough: self.throttle_passthrough.load(Ordering::Relaxed),
            latency_total_us: self.latency_total_us.load(Ordering::Relaxed),
            latency_samples: self.latency_samples.load(Ordering::Relaxed),
            taken_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of [`Metrics`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
    pub structural: u64,
    pub synthesized: u64,
    pub full_script: u64,
    pub heuristic: u64,
    pub throttle_requests: u64,
    pub throttle_passthrough: u64,
    pub latency_total_us: u64,
    pub latency_samples: u64,
    pub taken_at: DateTime<Utc>,
}

impl MetricsSnapshot {
    /// Cache hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.requests as f64
        }
    }

    /// Mean latency of non-cached resolutions
    pub fn average_latency(&self) -> Duration {
        if self.latency_samples == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(self.latency_total_us / self.latency_samples)
        }
    }

    pub fn total_latency(&self) -> Duration {
        Duration::from_micros(self.latency_total_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_ratio() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().hit_ratio(), 0.0);

        metrics.record_miss();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 4);
        assert_eq!(snapshot.cache_misses, 1);
        assert_eq!(snapshot.hit_ratio(), 0.75);
    }

    #[test]
    fn test_average_latency_excludes_cache_hits() {
        let metrics = Metrics::new();
        metrics.record_success(Strategy::Structural, Duration::from_millis(2));
        metrics.record_success(Strategy::Heuristic, Duration::from_millis(4));
        metrics.record_success(Strategy::Cache, Duration::from_secs(100));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.structural, 1);
        assert_eq!(snapshot.heuristic, 1);
        assert_eq!(snapshot.latency_samples, 2);
        assert_eq!(snapshot.average_latency(), Duration::from_millis(3));
        assert_eq!(snapshot.total_latency(), Duration::from_millis(6));
    }

    #[test]
    fn test_throttle_counters() {
        let metrics = Metrics::new();
        metrics.record_throttle(false);
        metrics.record_throttle(true);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.throttle_requests, 2);
        assert_eq!(snapshot.throttle_passthrough, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let json = serde_json::to_value(Metrics::new().snapshot()).unwrap();
        assert_eq!(json["requests"], 0);
        assert!(json["taken_at"].is_string());
    }
}
