//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Telemetry Core Facade
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-21
//! Version: 1.1.0
//! Description: The public in-process contract: registration, sampling,
//! queries, filtering, correlation, aggregation, adaptive control and
//! subscriptions, wired over one shared registry/bus/engine.
//! Layer: Core
//! Dependencies: all components
//! Affected Components: external consumers
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-21 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-03-01 - Carlos Eduardo Favini - Config snapshot/restore (v1.1.0)
//! --------------------------

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::aggregate::{
    bucket_aggregate, AggregateOutput, AggregateRequest, AggregationError, Aggregator, Bucket,
    BucketReducer, PipelineSpec,
};
use crate::bus::{topics, Event, EventBus, EventPayload, LifecycleAction, Subscription};
use crate::control::{
    ControlError, ControlOutcome, ControllerBank, ScaleOutcome, ScalerConfig, ThresholdConfig,
};
use crate::core::clock::wall_clock_us;
use crate::core::identifiers::{PipelineId, SubscriptionId};
use crate::core::types::{AnalysisMode, FilterSpec, Sample, SignalConfig};
use crate::detect::types::AnalysisRecord;
use crate::detect::{apply_filter, run_analysis};
use crate::dsp::correlation::cross_correlation;
use crate::engine::{Engine, EngineConfig, ProcessingLoop};
use crate::metrics::{CoreMetrics, MetricsSnapshot};
use crate::registry::{RegistryError, SignalRegistry, SignalSummary};
use crate::sampler::{SampleOutcome, Sampler};

/// Options for `get_signal_data`. Bounds are inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Keep only the newest `limit` samples after time filtering.
    pub limit: Option<usize>,
    pub since_us: Option<u64>,
    pub until_us: Option<u64>,
}

/// Query result: samples plus summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    pub samples: Vec<Sample>,
    pub count: usize,
    /// (first, last) timestamps of the returned window.
    pub time_range: Option<(u64, u64)>,
}

/// Output of `apply_filter`: the filtered series on the original grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredSeries {
    pub timestamps_us: Vec<u64>,
    pub values: Vec<f64>,
    pub filter: FilterSpec,
}

/// Output of `correlate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Pearson correlation at zero lag over the aligned overlap.
    pub pearson: f64,
    /// Lag (samples on the aligned grid) maximizing cross-correlation.
    /// Positive means the second signal trails the first.
    pub best_lag: i64,
    /// Cross-correlation coefficient at the best lag.
    pub best_correlation: f64,
    /// Aligned grid points the correlation was computed over.
    pub overlap_len: usize,
}

/// The real-time telemetry processing core.
///
/// One instance owns the registry, event bus, controller bank, aggregator
/// and processing loop. All operations are safe to call from any thread.
pub struct TelemetryCore {
    registry: Arc<SignalRegistry>,
    sampler: Sampler,
    bus: Arc<EventBus>,
    aggregator: Arc<Aggregator>,
    controllers: Arc<ControllerBank>,
    engine: Arc<Engine>,
    engine_config: EngineConfig,
    processing: Mutex<Option<ProcessingLoop>>,
}

impl Default for TelemetryCore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryCore {
    pub fn new() -> Self {
        Self::with_engine_config(EngineConfig::default())
    }

    pub fn with_engine_config(engine_config: EngineConfig) -> Self {
        let registry = Arc::new(SignalRegistry::new());
        let metrics = Arc::new(CoreMetrics::new());
        let bus = Arc::new(EventBus::new(Arc::clone(&metrics)));
        let sampler = Sampler::new(Arc::clone(&registry), Arc::clone(&metrics));
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&registry),
            sampler.clone(),
            Arc::clone(&metrics),
        ));
        let controllers = Arc::new(ControllerBank::new());
        let engine = Arc::new(Engine::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            Arc::clone(&aggregator),
            Arc::clone(&controllers),
            Arc::clone(&metrics),
        ));
        Self {
            registry,
            sampler,
            bus,
            aggregator,
            controllers,
            engine,
            engine_config,
            processing: Mutex::new(None),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Starts the periodic processing loop. Idempotent.
    pub fn start(&self) {
        let mut guard = self.processing.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(ProcessingLoop::start(
                Arc::clone(&self.engine),
                self.engine_config.clone(),
            ));
        }
    }

    /// Stops the processing loop and joins its threads. Idempotent.
    pub fn stop(&self) {
        let mut guard = self.processing.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut processing) = guard.take() {
            processing.stop();
        }
    }

    /// Runs one processing tick synchronously: every enabled analysis,
    /// due pipelines, metrics. Useful for deterministic consumers.
    pub fn tick_once(&self) {
        self.engine.tick_once();
    }

    // =========================================================================
    // REGISTRATION & SAMPLING
    // =========================================================================

    pub fn register_signal(&self, id: &str, config: SignalConfig) -> Result<(), RegistryError> {
        self.registry.register(id, config)?;
        self.publish_lifecycle(id, LifecycleAction::Registered);
        Ok(())
    }

    /// Unregisters a signal, releasing its buffer, cache and controllers
    /// atomically. In-flight analyses for it are abandoned unpublished.
    pub fn unregister_signal(&self, id: &str) -> Result<(), RegistryError> {
        self.registry.unregister(id)?;
        self.controllers.remove(id);
        self.publish_lifecycle(id, LifecycleAction::Unregistered);
        Ok(())
    }

    pub fn reconfigure_signal(&self, id: &str, config: SignalConfig) -> Result<(), RegistryError> {
        self.registry.reconfigure(id, config)?;
        self.publish_lifecycle(id, LifecycleAction::Reconfigured);
        Ok(())
    }

    /// Non-blocking sample ingest with the monotonic ingest timestamp.
    pub fn sample_signal(
        &self,
        id: &str,
        value: f64,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SampleOutcome {
        self.sampler.sample(id, value, metadata)
    }

    /// Non-blocking ingest with an explicit timestamp.
    pub fn sample_signal_at(
        &self,
        id: &str,
        value: f64,
        timestamp_us: u64,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> SampleOutcome {
        self.sampler.sample_at(id, value, Some(timestamp_us), metadata)
    }

    pub fn list_signals(&self) -> Vec<SignalSummary> {
        self.registry.list()
    }

    pub fn signal_metrics(&self, id: &str) -> Option<MetricsSnapshot> {
        self.registry.get(id).map(|e| e.metrics_snapshot())
    }

    // =========================================================================
    // QUERIES & ON-DEMAND ANALYSIS
    // =========================================================================

    pub fn get_signal_data(&self, id: &str, options: QueryOptions) -> Result<SignalData, RegistryError> {
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let mut samples = entry.snapshot();

        if let Some(since) = options.since_us {
            samples.retain(|s| s.timestamp_us >= since);
        }
        if let Some(until) = options.until_us {
            samples.retain(|s| s.timestamp_us <= until);
        }
        if let Some(limit) = options.limit {
            let skip = samples.len().saturating_sub(limit);
            samples.drain(..skip);
        }

        let time_range = match (samples.first(), samples.last()) {
            (Some(first), Some(last)) => Some((first.timestamp_us, last.timestamp_us)),
            _ => None,
        };
        Ok(SignalData {
            count: samples.len(),
            time_range,
            samples,
        })
    }

    /// Computes one analysis mode over a fresh snapshot, caches it, and
    /// returns the record. `InsufficientData` arrives inside the record.
    pub fn analyze_waveform(
        &self,
        id: &str,
        mode: AnalysisMode,
    ) -> Result<AnalysisRecord, RegistryError> {
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let samples = entry.snapshot();
        let record = run_analysis(id, mode, &samples, &entry.config());
        entry.store_analysis(record.clone());
        Ok(record)
    }

    /// Most recent loop-produced analysis for a mode, if any.
    pub fn cached_analysis(&self, id: &str, mode: AnalysisMode) -> Option<AnalysisRecord> {
        self.registry.get(id).and_then(|e| e.cached_analysis(mode))
    }

    /// Applies one filter to a fresh snapshot, without touching buffered
    /// samples or the configured chain.
    pub fn apply_filter(&self, id: &str, filter: FilterSpec) -> Result<FilteredSeries, RegistryError> {
        filter
            .validate()
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let samples = entry.snapshot();
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        Ok(FilteredSeries {
            timestamps_us: samples.iter().map(|s| s.timestamp_us).collect(),
            values: apply_filter(&values, &filter),
            filter,
        })
    }

    /// Correlates two signals over their aligned overlap.
    pub fn correlate(&self, id_a: &str, id_b: &str) -> Result<CorrelationResult, AggregationError> {
        let output = self.aggregator.aggregate(
            &[id_a.to_string(), id_b.to_string()],
            &AggregateRequest::Statistical,
        )?;
        let (pearson, overlap_len) = match &output {
            AggregateOutput::Statistical(stats) => {
                (stats.correlation[0][1], stats.observation_count)
            }
            _ => unreachable!("statistical request yields statistical output"),
        };

        // Cross-correlation over the aligned values for the lag search.
        let entry_a = self
            .registry
            .get(id_a)
            .ok_or_else(|| AggregationError::NotFound(id_a.to_string()))?;
        let entry_b = self
            .registry
            .get(id_b)
            .ok_or_else(|| AggregationError::NotFound(id_b.to_string()))?;
        let aligned = crate::aggregate::align(&[entry_a.snapshot(), entry_b.snapshot()])
            .ok_or(AggregationError::InsufficientOverlap)?;
        let max_lag = (aligned.len() / 4).min(100);
        let xc = cross_correlation(&aligned.values[0], &aligned.values[1], max_lag, true);
        let (best_lag, best_correlation) = xc
            .into_iter()
            .max_by(|a, b| {
                a.1.abs()
                    .partial_cmp(&b.1.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or((0, 0.0));

        Ok(CorrelationResult {
            pearson,
            best_lag,
            best_correlation,
            overlap_len,
        })
    }

    /// Time-bucketed aggregation of one signal's history.
    pub fn bucketed(
        &self,
        id: &str,
        window_us: u64,
        reducer: BucketReducer,
    ) -> Result<Vec<Bucket>, RegistryError> {
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let (buckets, _degraded) = bucket_aggregate(&entry.snapshot(), window_us, reducer);
        Ok(buckets)
    }

    // =========================================================================
    // AGGREGATION
    // =========================================================================

    pub fn aggregate(
        &self,
        signal_ids: &[String],
        request: &AggregateRequest,
    ) -> Result<AggregateOutput, AggregationError> {
        self.aggregator.aggregate(signal_ids, request)
    }

    /// Creates an aggregation pipeline and its derived output signal.
    pub fn create_aggregation(&self, spec: PipelineSpec) -> Result<PipelineId, AggregationError> {
        let output = spec.output.clone();
        let id = self.aggregator.create_pipeline(spec)?;
        self.publish_lifecycle(&output, LifecycleAction::Registered);
        Ok(id)
    }

    pub fn remove_aggregation(&self, id: PipelineId) -> Result<(), AggregationError> {
        self.aggregator.remove_pipeline(id)
    }

    // =========================================================================
    // ADAPTIVE CONTROL
    // =========================================================================

    pub fn create_threshold(&self, id: &str, config: ThresholdConfig) -> Result<(), ControlError> {
        if !self.registry.contains(id) {
            return Err(ControlError::UnknownSignal(id.to_string()));
        }
        self.controllers.create_threshold(id, config)
    }

    pub fn create_scaler(&self, id: &str, config: ScalerConfig) -> Result<(), ControlError> {
        if !self.registry.contains(id) {
            return Err(ControlError::UnknownSignal(id.to_string()));
        }
        self.controllers.create_scaler(id, config)
    }

    pub fn apply_control(&self, id: &str, value: f64) -> Result<ControlOutcome, ControlError> {
        self.controllers.apply_control(id, value)
    }

    pub fn update_adaptation(&self, id: &str, feedback: f64) -> Result<(), ControlError> {
        self.controllers.update_adaptation(id, feedback)
    }

    pub fn apply_scaling(&self, id: &str, value: f64) -> Result<ScaleOutcome, ControlError> {
        self.controllers.apply_scaling(id, value)
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Subscribes to a topic (exact, or trailing-`*` prefix).
    pub fn subscribe(&self, topic: &str) -> Subscription {
        self.bus.subscribe(topic)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.bus.unsubscribe(id);
    }

    // =========================================================================
    // CONFIG SNAPSHOT / RESTORE
    // =========================================================================

    /// Exports every signal's configuration. Derived signals are skipped:
    /// they are re-created by their pipelines.
    pub fn export_configs(&self) -> HashMap<String, SignalConfig> {
        self.registry
            .entries()
            .iter()
            .filter(|e| !e.is_derived())
            .map(|e| (e.id().to_string(), e.config()))
            .collect()
    }

    /// Registers every exported configuration. Fails on the first
    /// conflict, leaving earlier registrations in place.
    pub fn import_configs(
        &self,
        configs: HashMap<String, SignalConfig>,
    ) -> Result<(), RegistryError> {
        for (id, config) in configs {
            self.register_signal(&id, config)?;
        }
        Ok(())
    }

    fn publish_lifecycle(&self, id: &str, action: LifecycleAction) {
        self.bus.publish(Event {
            topic: topics::signal(id),
            timestamp_us: wall_clock_us(),
            signal_id: Some(id.to_string()),
            payload: EventPayload::Lifecycle { action },
        });
    }
}

impl Drop for TelemetryCore {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SamplingRate;

    fn core() -> TelemetryCore {
        TelemetryCore::new()
    }

    fn feed(core: &TelemetryCore, id: &str, values: &[f64]) {
        for (i, &v) in values.iter().enumerate() {
            core.sample_signal_at(id, v, (i as u64 + 1) * 1000, None);
        }
    }

    #[test]
    fn test_register_sample_query_roundtrip() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        feed(&core, "cpu", &[1.0, 2.0, 3.0]);

        let data = core.get_signal_data("cpu", QueryOptions::default()).unwrap();
        assert_eq!(data.count, 3);
        assert_eq!(data.time_range, Some((1000, 3000)));
    }

    #[test]
    fn test_query_options_limit_and_window() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        feed(&core, "cpu", &[1.0, 2.0, 3.0, 4.0, 5.0]);

        let limited = core
            .get_signal_data(
                "cpu",
                QueryOptions {
                    limit: Some(2),
                    ..QueryOptions::default()
                },
            )
            .unwrap();
        assert_eq!(limited.count, 2);
        assert_eq!(limited.samples[0].value, 4.0);

        let windowed = core
            .get_signal_data(
                "cpu",
                QueryOptions {
                    since_us: Some(2000),
                    until_us: Some(4000),
                    limit: None,
                },
            )
            .unwrap();
        assert_eq!(windowed.count, 3);
    }

    #[test]
    fn test_unknown_signal_queries() {
        let core = core();
        assert!(core.get_signal_data("ghost", QueryOptions::default()).is_err());
        assert!(core.analyze_waveform("ghost", AnalysisMode::Basic).is_err());
        assert!(core
            .apply_filter("ghost", FilterSpec::MovingAverage { window: 3 })
            .is_err());
    }

    #[test]
    fn test_analyze_waveform_populates_cache() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        feed(&core, "cpu", &[1.0, 2.0, 3.0, 4.0]);

        assert!(core.cached_analysis("cpu", AnalysisMode::Basic).is_none());
        let record = core.analyze_waveform("cpu", AnalysisMode::Basic).unwrap();
        assert!(!record.result.is_insufficient());
        assert!(core.cached_analysis("cpu", AnalysisMode::Basic).is_some());
    }

    #[test]
    fn test_apply_filter_rejects_bad_params() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        assert!(core
            .apply_filter("cpu", FilterSpec::LowPass { cutoff_hz: -2.0 })
            .is_err());
    }

    #[test]
    fn test_lifecycle_events_published() {
        let core = core();
        let sub = core.subscribe("signal:cpu");
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        core.unregister_signal("cpu").unwrap();

        let actions: Vec<LifecycleAction> = sub
            .drain()
            .into_iter()
            .map(|e| match e.payload {
                EventPayload::Lifecycle { action } => action,
                other => panic!("expected lifecycle, got {:?}", other),
            })
            .collect();
        assert_eq!(
            actions,
            vec![LifecycleAction::Registered, LifecycleAction::Unregistered]
        );
    }

    #[test]
    fn test_unregister_destroys_controllers() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        core.create_threshold("cpu", ThresholdConfig::default()).unwrap();
        assert!(core.apply_control("cpu", 1.0).is_ok());

        core.unregister_signal("cpu").unwrap();
        assert!(matches!(
            core.apply_control("cpu", 1.0),
            Err(ControlError::NoController(_))
        ));
    }

    #[test]
    fn test_threshold_requires_registered_signal() {
        let core = core();
        assert_eq!(
            core.create_threshold("ghost", ThresholdConfig::default()),
            Err(ControlError::UnknownSignal("ghost".to_string()))
        );
    }

    #[test]
    fn test_register_unregister_register_is_idempotent() {
        let core = core();
        let config = SignalConfig::new()
            .with_capacity(10)
            .with_rate(SamplingRate::High);
        core.register_signal("cpu", config.clone()).unwrap();
        feed(&core, "cpu", &[1.0, 2.0]);
        core.unregister_signal("cpu").unwrap();
        core.register_signal("cpu", config.clone()).unwrap();

        let data = core.get_signal_data("cpu", QueryOptions::default()).unwrap();
        assert_eq!(data.count, 0);
        let summaries = core.list_signals();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].buffer_capacity, 10);
    }

    #[test]
    fn test_correlate_detects_anticorrelation() {
        let core = core();
        core.register_signal("a", SignalConfig::default()).unwrap();
        core.register_signal("b", SignalConfig::default()).unwrap();
        feed(&core, "a", &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        feed(&core, "b", &[8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0]);

        let result = core.correlate("a", "b").unwrap();
        assert!(result.pearson < -0.99);
        assert_eq!(result.overlap_len, 8);
    }

    #[test]
    fn test_bucketed_query() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        // Timestamps 1000..5000 in steps of 1000.
        feed(&core, "cpu", &[2.0, 4.0, 6.0, 8.0]);

        let buckets = core.bucketed("cpu", 2000, BucketReducer::Mean).unwrap();
        // floor(1000/2000) = 0, floor(2000/2000) = 1 ...
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].value, 2.0);
        assert_eq!(buckets[1].value, 5.0);
        assert_eq!(buckets[2].value, 8.0);
    }

    #[test]
    fn test_export_import_configs() {
        let core = core();
        core.register_signal(
            "cpu",
            SignalConfig::new().with_mode(AnalysisMode::Basic).with_capacity(64),
        )
        .unwrap();
        let exported = core.export_configs();
        assert_eq!(exported.len(), 1);

        let fresh = TelemetryCore::new();
        fresh.import_configs(exported).unwrap();
        let summaries = fresh.list_signals();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].buffer_capacity, 64);
    }

    #[test]
    fn test_metrics_accessor() {
        let core = core();
        core.register_signal("cpu", SignalConfig::default()).unwrap();
        feed(&core, "cpu", &[1.0]);
        core.sample_signal("ghost", 1.0, None);

        let snap = core.signal_metrics("cpu").unwrap();
        assert_eq!(snap.samples_accepted, 1);
        assert!(core.signal_metrics("ghost").is_none());
    }
}
