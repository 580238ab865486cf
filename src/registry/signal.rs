//! Per-signal state: buffer, config, analysis cache, status flags.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::buffer::RingBuffer;
use crate::core::types::{AnalysisMode, Sample, SignalConfig};
use crate::detect::types::AnalysisRecord;
use crate::metrics::{MetricsSnapshot, SignalMetrics};

/// State owned by the registry for one signal.
///
/// Lock order, where multiple are taken: config before buffer before
/// cache. Most paths touch exactly one.
pub struct SignalEntry {
    id: String,
    config: RwLock<SignalConfig>,
    buffer: RwLock<RingBuffer>,
    cache: RwLock<HashMap<AnalysisMode, AnalysisRecord>>,
    metrics: SignalMetrics,
    /// Output of an aggregation pipeline; external ingest is refused.
    derived: AtomicBool,
    /// Set by a fatal per-signal failure; cleared by reconfigure.
    error: AtomicBool,
    /// Per-signal analysis lease: at most one worker at a time.
    lease: AtomicBool,
    /// Cleared when the registry drops this entry; in-flight work checks
    /// it before publishing.
    current: AtomicBool,
}

impl SignalEntry {
    pub fn new(id: String, config: SignalConfig) -> Self {
        let capacity = config.buffer_capacity;
        Self {
            id,
            config: RwLock::new(config),
            buffer: RwLock::new(RingBuffer::new(capacity)),
            cache: RwLock::new(HashMap::new()),
            metrics: SignalMetrics::new(),
            derived: AtomicBool::new(false),
            error: AtomicBool::new(false),
            lease: AtomicBool::new(false),
            current: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Copy of the current configuration.
    pub fn config(&self) -> SignalConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replaces config, resizes the buffer in place and clears the error
    /// flag. Called by the registry under its write lock.
    pub(crate) fn replace_config(&self, config: SignalConfig) {
        let capacity = config.buffer_capacity;
        {
            let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
            *guard = config;
        }
        {
            let mut guard = self.buffer.write().unwrap_or_else(|e| e.into_inner());
            guard.resize(capacity);
        }
        self.error.store(false, Ordering::Release);
    }

    /// Appends a sample under a brief exclusive write.
    pub fn push_sample(&self, sample: Sample) {
        let mut guard = self.buffer.write().unwrap_or_else(|e| e.into_inner());
        guard.push(sample);
    }

    /// Ordered independent copy of the buffer contents.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot()
    }

    /// Timestamp of the most recent sample.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last_timestamp()
    }

    /// Most recent sample, if any.
    pub fn last_sample(&self) -> Option<Sample> {
        self.buffer
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Stores an analysis record in the per-mode cache.
    pub fn store_analysis(&self, record: AnalysisRecord) {
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        guard.insert(record.mode, record);
    }

    /// Most recent analysis for a mode.
    pub fn cached_analysis(&self, mode: AnalysisMode) -> Option<AnalysisRecord> {
        self.cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&mode)
            .cloned()
    }

    pub fn metrics(&self) -> &SignalMetrics {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn is_derived(&self) -> bool {
        self.derived.load(Ordering::Acquire)
    }

    pub(crate) fn mark_derived(&self) {
        self.derived.store(true, Ordering::Release);
    }

    pub fn is_errored(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    /// Marks the signal failed; the loop excludes it until reconfigured.
    pub fn mark_errored(&self) {
        self.error.store(true, Ordering::Release);
    }

    /// Tries to take the per-signal analysis lease.
    pub fn try_lease(&self) -> bool {
        self.lease
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn release_lease(&self) {
        self.lease.store(false, Ordering::Release);
    }

    pub fn is_leased(&self) -> bool {
        self.lease.load(Ordering::Acquire)
    }

    /// Invalidate on unregister: in-flight work abandons its results.
    pub(crate) fn invalidate(&self) {
        self.current.store(false, Ordering::Release);
    }

    pub fn is_invalidated(&self) -> bool {
        !self.current.load(Ordering::Acquire)
    }

    /// Compact description for `list()`.
    pub fn summary(&self) -> SignalSummary {
        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        let buffer = self.buffer.read().unwrap_or_else(|e| e.into_inner());
        SignalSummary {
            id: self.id.clone(),
            buffer_len: buffer.len(),
            buffer_capacity: buffer.capacity(),
            first_timestamp_us: buffer.first_timestamp(),
            last_timestamp_us: buffer.last_timestamp(),
            analysis_modes: config.analysis_modes.iter().copied().collect(),
            derived: self.is_derived(),
            errored: self.is_errored(),
        }
    }
}

impl std::fmt::Debug for SignalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEntry")
            .field("id", &self.id)
            .field("len", &self.buffer_len())
            .field("derived", &self.is_derived())
            .field("errored", &self.is_errored())
            .finish()
    }
}

/// One row of `SignalRegistry::list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub id: String,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
    pub first_timestamp_us: Option<u64>,
    pub last_timestamp_us: Option<u64>,
    pub analysis_modes: Vec<AnalysisMode>,
    pub derived: bool,
    pub errored: bool,
}
