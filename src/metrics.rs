//! Serving metrics and periodic summaries for the scoring service.

use crate::types::RiskTier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the scoring service
pub struct ServingMetrics {
    /// Requests received, including malformed ones
    pub requests: AtomicU64,
    /// Records that produced a decision
    pub records_scored: AtomicU64,
    /// Records rejected
    pub records_rejected: AtomicU64,
    /// Unknown categories replaced by a known one
    pub category_fallbacks: AtomicU64,
    /// Bundle reloads applied
    pub reloads: AtomicU64,
    decisions_by_tier: RwLock<HashMap<RiskTier, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    /// Probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServingMetrics {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            records_scored: AtomicU64::new(0),
            records_rejected: AtomicU64::new(0),
            category_fallbacks: AtomicU64::new(0),
            reloads: AtomicU64::new(0),
            decisions_by_tier: RwLock::new(HashMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a handled request
    pub fn record_request(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            // Keep only the most recent window
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    /// Record a decision
    pub fn record_decision(&self, tier: RiskTier, probability: f64, fallbacks: usize) {
        self.records_scored.fetch_add(1, Ordering::Relaxed);
        self.category_fallbacks.fetch_add(fallbacks as u64, Ordering::Relaxed);

        if let Ok(mut by_tier) = self.decisions_by_tier.write() {
            *by_tier.entry(tier).or_insert(0) += 1;
        }

        let bucket = (probability * 10.0).clamp(0.0, 9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_rejection(&self) {
        self.records_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    /// Latency statistics over the recent window
    pub fn latency_stats(&self) -> LatencyStats {
        let times = match self.latencies.read() {
            Ok(times) => times,
            Err(poisoned) => poisoned.into_inner(),
        };
        if times.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: at(0.5),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Records per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.records_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn score_distribution(&self) -> [u64; 10] {
        match self.score_buckets.read() {
            Ok(b) => *b,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn decisions_by_tier(&self) -> HashMap<RiskTier, u64> {
        match self.decisions_by_tier.read() {
            Ok(m) => m.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Log summary statistics
    pub fn log_summary(&self) {
        let scored = self.records_scored.load(Ordering::Relaxed);
        let rejected = self.records_rejected.load(Ordering::Relaxed);
        let latency = self.latency_stats();

        info!(
            requests = self.requests.load(Ordering::Relaxed),
            scored,
            rejected,
            fallbacks = self.category_fallbacks.load(Ordering::Relaxed),
            reloads = self.reloads.load(Ordering::Relaxed),
            throughput = %format!("{:.1}", self.throughput()),
            "Serving summary"
        );
        info!(
            mean_us = latency.mean_us,
            p50_us = latency.p50_us,
            p95_us = latency.p95_us,
            p99_us = latency.p99_us,
            max_us = latency.max_us,
            "Request latency"
        );

        let by_tier = self.decisions_by_tier();
        for tier in RiskTier::ALL {
            let count = by_tier.get(&tier).copied().unwrap_or(0);
            let pct = if scored > 0 {
                count as f64 / scored as f64 * 100.0
            } else {
                0.0
            };
            info!(tier = tier.as_str(), count, pct = %format!("{pct:.1}"), "Decisions by tier");
        }

        let dist = self.score_distribution();
        let total: u64 = dist.iter().sum();
        if total > 0 {
            let shape: Vec<String> = dist
                .iter()
                .map(|&c| format!("{:.1}", c as f64 / total as f64 * 100.0))
                .collect();
            info!(buckets = %shape.join(" "), "Probability distribution (% per 0.1 bucket)");
        }
    }
}

impl Default for ServingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Request latency statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Logs a metrics summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServingMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServingMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        loop {
            interval.tick().await;
            self.metrics.log_summary();
        }
    }
}
