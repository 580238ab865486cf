//! Per-signal operational counters.
//!
//! Counting is lock-free; snapshots are taken with relaxed loads because
//! counters are monotone and independent. Buffer overflow and subscriber
//! overflow are counted here, never raised as errors.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters attached to one signal.
#[derive(Debug, Default)]
pub struct SignalMetrics {
    samples_accepted: AtomicU64,
    samples_dropped: AtomicU64,
    analyses_completed: AtomicU64,
    anomalies_detected: AtomicU64,
    loop_overruns: AtomicU64,
}

impl SignalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sample_accepted(&self) {
        self.samples_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_dropped(&self) {
        self.samples_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_analysis_completed(&self) {
        self.analyses_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anomalies(&self, count: u64) {
        if count > 0 {
            self.anomalies_detected.fetch_add(count, Ordering::Relaxed);
        }
    }

    pub fn record_loop_overrun(&self) {
        self.loop_overruns.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            analyses_completed: self.analyses_completed.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            loop_overruns: self.loop_overruns.load(Ordering::Relaxed),
        }
    }
}

/// Serializable counter snapshot, published on the metrics topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub samples_accepted: u64,
    pub samples_dropped: u64,
    pub analyses_completed: u64,
    pub anomalies_detected: u64,
    pub loop_overruns: u64,
}

/// Counters not attributable to a single signal.
#[derive(Debug, Default)]
pub struct CoreMetrics {
    /// Samples addressed to ids the registry does not know.
    pub unknown_signal_drops: AtomicU64,
    /// Events dropped across all subscriber queues.
    pub subscribers_dropped: AtomicU64,
    /// Aggregation runs dropped by timeout.
    pub aggregation_timeouts: AtomicU64,
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
