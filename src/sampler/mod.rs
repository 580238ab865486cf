//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Sampler
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-11
//! Version: 1.1.0
//! Description: Thread-safe, non-blocking ingestion of samples into
//! per-signal ring buffers. No filtering happens at ingest; raw samples
//! are preserved verbatim. Unknown ids and stale timestamps are counted
//! and reported as non-fatal outcomes, never as errors.
//! Layer: Core
//! Dependencies: registry, metrics, core/clock
//! Affected Components: aggregate, system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-11 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-25 - Carlos Eduardo Favini - Derived-ingest guard (v1.1.0)
//! --------------------------

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::clock::monotonic_us;
use crate::core::types::Sample;
use crate::metrics::CoreMetrics;
use crate::registry::SignalRegistry;

/// Non-fatal outcome of one ingest attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOutcome {
    /// Pushed to the ring buffer.
    Accepted,
    /// The id is not registered; counted, nothing stored.
    DroppedUnknownSignal,
    /// The timestamp precedes the newest buffered sample.
    DroppedOutOfOrder,
    /// The signal is pipeline-derived; external ingest is refused to
    /// prevent feedback loops.
    DroppedDerived,
}

impl SampleOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, SampleOutcome::Accepted)
    }
}

/// Ingest front door. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Sampler {
    registry: Arc<SignalRegistry>,
    metrics: Arc<CoreMetrics>,
}

impl Sampler {
    pub fn new(registry: Arc<SignalRegistry>, metrics: Arc<CoreMetrics>) -> Self {
        Self { registry, metrics }
    }

    /// Ingests a value with the monotonic ingest timestamp.
    pub fn sample(
        &self,
        id: &str,
        value: f64,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SampleOutcome {
        self.sample_at(id, value, None, metadata)
    }

    /// Ingests a value with an explicit timestamp (microseconds). The
    /// ingest timestamp is assigned when absent.
    pub fn sample_at(
        &self,
        id: &str,
        value: f64,
        timestamp_us: Option<u64>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SampleOutcome {
        let entry = match self.registry.get(id) {
            Some(entry) => entry,
            None => {
                self.metrics
                    .unknown_signal_drops
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!("sample for unknown signal '{}' dropped", id);
                return SampleOutcome::DroppedUnknownSignal;
            }
        };

        if entry.is_derived() {
            entry.metrics().record_sample_dropped();
            return SampleOutcome::DroppedDerived;
        }

        self.ingest(&entry, value, timestamp_us, metadata)
    }

    /// Pipeline-output ingest path: bypasses the derived guard but only
    /// feeds signals that ARE derived, so a pipeline can never push into
    /// an externally fed signal.
    pub(crate) fn sample_derived(
        &self,
        id: &str,
        value: f64,
        timestamp_us: Option<u64>,
    ) -> SampleOutcome {
        let entry = match self.registry.get(id) {
            Some(entry) => entry,
            None => {
                self.metrics
                    .unknown_signal_drops
                    .fetch_add(1, Ordering::Relaxed);
                return SampleOutcome::DroppedUnknownSignal;
            }
        };
        if !entry.is_derived() {
            entry.metrics().record_sample_dropped();
            return SampleOutcome::DroppedDerived;
        }
        self.ingest(&entry, value, timestamp_us, None)
    }

    fn ingest(
        &self,
        entry: &Arc<crate::registry::SignalEntry>,
        value: f64,
        timestamp_us: Option<u64>,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SampleOutcome {
        let ts = timestamp_us.unwrap_or_else(monotonic_us);

        // Timestamps are nondecreasing per signal.
        if let Some(last) = entry.last_timestamp() {
            if ts < last {
                entry.metrics().record_sample_dropped();
                return SampleOutcome::DroppedOutOfOrder;
            }
        }

        let sample = match metadata {
            Some(map) => Sample::with_metadata(value, ts, map),
            None => Sample::new(value, ts),
        };
        entry.push_sample(sample);
        entry.metrics().record_sample_accepted();
        SampleOutcome::Accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SignalConfig;

    fn sampler() -> (Sampler, Arc<SignalRegistry>) {
        let registry = Arc::new(SignalRegistry::new());
        let metrics = Arc::new(CoreMetrics::new());
        (Sampler::new(Arc::clone(&registry), metrics), registry)
    }

    #[test]
    fn test_unknown_signal_is_nonfatal() {
        let (sampler, _registry) = sampler();
        assert_eq!(
            sampler.sample("ghost", 1.0, None),
            SampleOutcome::DroppedUnknownSignal
        );
    }

    #[test]
    fn test_accepted_sample_lands_in_buffer() {
        let (sampler, registry) = sampler();
        registry.register("cpu", SignalConfig::default()).unwrap();
        assert_eq!(sampler.sample("cpu", 0.7, None), SampleOutcome::Accepted);

        let entry = registry.get("cpu").unwrap();
        let snap = entry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].value, 0.7);
        assert_eq!(entry.metrics_snapshot().samples_accepted, 1);
    }

    #[test]
    fn test_ingest_timestamp_assigned_when_absent() {
        let (sampler, registry) = sampler();
        registry.register("cpu", SignalConfig::default()).unwrap();
        sampler.sample("cpu", 1.0, None);
        let snap = registry.get("cpu").unwrap().snapshot();
        assert!(snap[0].timestamp_us > 0);
    }

    #[test]
    fn test_out_of_order_rejected_and_counted() {
        let (sampler, registry) = sampler();
        registry.register("cpu", SignalConfig::default()).unwrap();
        assert!(sampler.sample_at("cpu", 1.0, Some(2000), None).accepted());
        assert_eq!(
            sampler.sample_at("cpu", 2.0, Some(1000), None),
            SampleOutcome::DroppedOutOfOrder
        );

        let entry = registry.get("cpu").unwrap();
        assert_eq!(entry.buffer_len(), 1);
        assert_eq!(entry.metrics_snapshot().samples_dropped, 1);
    }

    #[test]
    fn test_equal_timestamp_accepted() {
        let (sampler, registry) = sampler();
        registry.register("cpu", SignalConfig::default()).unwrap();
        assert!(sampler.sample_at("cpu", 1.0, Some(1000), None).accepted());
        assert!(sampler.sample_at("cpu", 2.0, Some(1000), None).accepted());
    }

    #[test]
    fn test_external_ingest_into_derived_refused() {
        let (sampler, registry) = sampler();
        registry
            .register_derived("composite", SignalConfig::default())
            .unwrap();
        assert_eq!(
            sampler.sample("composite", 1.0, None),
            SampleOutcome::DroppedDerived
        );
        assert_eq!(
            sampler.sample_derived("composite", 1.0, Some(10)),
            SampleOutcome::Accepted
        );
    }

    #[test]
    fn test_derived_path_cannot_feed_plain_signal() {
        let (sampler, registry) = sampler();
        registry.register("plain", SignalConfig::default()).unwrap();
        assert_eq!(
            sampler.sample_derived("plain", 1.0, Some(10)),
            SampleOutcome::DroppedDerived
        );
    }

    #[test]
    fn test_metadata_preserved_verbatim() {
        let (sampler, registry) = sampler();
        registry.register("cpu", SignalConfig::default()).unwrap();
        let mut meta = HashMap::new();
        meta.insert("host".to_string(), serde_json::json!("node-7"));
        sampler.sample("cpu", 1.0, Some(meta));

        let snap = registry.get("cpu").unwrap().snapshot();
        let stored = snap[0].metadata.as_ref().unwrap();
        assert_eq!(stored.get("host").unwrap(), &serde_json::json!("node-7"));
    }
}
