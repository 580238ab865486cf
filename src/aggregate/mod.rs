//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Aggregator
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-19
//! Version: 1.1.0
//! Description: Multi-signal aggregation: on-demand statistical and
//! fusion queries over aligned snapshots, plus registered pipelines that
//! feed composite (derived) signals through the sampler.
//! Layer: Core
//! Dependencies: align, statistical, fusion, buckets, pipeline
//! Affected Components: engine, system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-19 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-28 - Carlos Eduardo Favini - Per-run pipeline timeout (v1.1.0)
//! --------------------------

pub mod align;
pub mod buckets;
pub mod fusion;
pub mod pipeline;
pub mod statistical;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::identifiers::PipelineId;
use crate::core::types::{Sample, SignalConfig};
use crate::metrics::CoreMetrics;
use crate::registry::SignalRegistry;
use crate::sampler::Sampler;

pub use align::{align, AlignedSeries};
pub use buckets::{bucket_aggregate, Bucket, BucketReducer};
pub use fusion::{fuse, weighted_sum, FusionMethod, FusionResult};
pub use pipeline::{
    find_cycle, CombineOp, FilterOp, MapOp, PipelineSpec, PipelineStage, ReduceOp, TransformOp,
    Trigger,
};
pub use statistical::{statistical, StatisticalAggregation};

/// Errors from aggregation operations.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// An input signal (or pipeline) does not exist.
    NotFound(String),
    /// The request or pipeline spec is malformed.
    InvalidSpec(String),
    /// Pipeline creation would introduce a cycle; the ids on the cycle.
    Cycle(Vec<String>),
    /// Input time ranges do not overlap.
    InsufficientOverlap,
}

impl std::fmt::Display for AggregationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "unknown signal or pipeline '{}'", id),
            Self::InvalidSpec(msg) => write!(f, "invalid aggregation spec: {}", msg),
            Self::Cycle(path) => write!(f, "pipeline cycle: {}", path.join(" -> ")),
            Self::InsufficientOverlap => write!(f, "input time ranges do not overlap"),
        }
    }
}

impl std::error::Error for AggregationError {}

/// On-demand aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregateRequest {
    Statistical,
    Weighted { weights: Vec<f64> },
    Fusion { method: FusionMethod },
    CorrelationMatrix,
}

/// On-demand aggregation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregateOutput {
    Statistical(StatisticalAggregation),
    Weighted {
        timestamps_us: Vec<u64>,
        values: Vec<f64>,
    },
    Fusion(FusionResult),
    CorrelationMatrix {
        correlation: Vec<Vec<f64>>,
        synchrony: f64,
    },
}

struct PipelineState {
    spec: PipelineSpec,
    /// Newest output timestamp already emitted.
    watermark_us: Option<u64>,
    /// Monotonic time of the last run, for interval triggers.
    last_run: Option<Instant>,
}

/// Owns all aggregation pipelines and serves on-demand queries.
pub struct Aggregator {
    registry: Arc<SignalRegistry>,
    sampler: Sampler,
    metrics: Arc<CoreMetrics>,
    pipelines: Mutex<HashMap<PipelineId, PipelineState>>,
}

impl Aggregator {
    pub fn new(registry: Arc<SignalRegistry>, sampler: Sampler, metrics: Arc<CoreMetrics>) -> Self {
        Self {
            registry,
            sampler,
            metrics,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshots the inputs, aligns them, and serves the request.
    /// Deterministic: a pure function of the aligned inputs.
    pub fn aggregate(
        &self,
        signal_ids: &[String],
        request: &AggregateRequest,
    ) -> Result<AggregateOutput, AggregationError> {
        if signal_ids.is_empty() {
            return Err(AggregationError::InvalidSpec("no input signals".into()));
        }
        let mut snapshots = Vec::with_capacity(signal_ids.len());
        for id in signal_ids {
            let entry = self
                .registry
                .get(id)
                .ok_or_else(|| AggregationError::NotFound(id.clone()))?;
            snapshots.push(entry.snapshot());
        }
        let aligned = align(&snapshots).ok_or(AggregationError::InsufficientOverlap)?;

        match request {
            AggregateRequest::Statistical => {
                Ok(AggregateOutput::Statistical(statistical(&aligned)))
            }
            AggregateRequest::Weighted { weights } => {
                let (timestamps_us, values) =
                    weighted_sum(&aligned, weights).ok_or_else(|| {
                        AggregationError::InvalidSpec(format!(
                            "{} weights for {} signals",
                            weights.len(),
                            aligned.signal_count()
                        ))
                    })?;
                Ok(AggregateOutput::Weighted {
                    timestamps_us,
                    values,
                })
            }
            AggregateRequest::Fusion { method } => {
                Ok(AggregateOutput::Fusion(fuse(&aligned, *method)))
            }
            AggregateRequest::CorrelationMatrix => {
                let stats = statistical(&aligned);
                Ok(AggregateOutput::CorrelationMatrix {
                    correlation: stats.correlation,
                    synchrony: stats.synchrony,
                })
            }
        }
    }

    /// Creates a pipeline and its derived output signal. Rejection makes
    /// no state change.
    pub fn create_pipeline(&self, spec: PipelineSpec) -> Result<PipelineId, AggregationError> {
        if spec.inputs.is_empty() {
            return Err(AggregationError::InvalidSpec("pipeline needs inputs".into()));
        }
        if spec.output.is_empty() {
            return Err(AggregationError::InvalidSpec("pipeline needs an output id".into()));
        }
        // A pipeline that feeds itself is the degenerate cycle; reject it
        // before the existence checks can mask it.
        if spec.inputs.iter().any(|input| input == &spec.output) {
            return Err(AggregationError::Cycle(vec![
                spec.output.clone(),
                spec.output.clone(),
            ]));
        }
        for input in &spec.inputs {
            if !self.registry.contains(input) {
                return Err(AggregationError::NotFound(input.clone()));
            }
        }
        if self.registry.contains(&spec.output) {
            return Err(AggregationError::InvalidSpec(format!(
                "output id '{}' already registered",
                spec.output
            )));
        }

        let guard = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
        let existing = guard
            .values()
            .map(|p| (p.spec.inputs.clone(), p.spec.output.clone()))
            .collect::<Vec<_>>();
        if let Some(cycle) = find_cycle(existing.into_iter(), &spec.inputs, &spec.output) {
            return Err(AggregationError::Cycle(cycle));
        }
        drop(guard);

        // All checks passed; create the derived output, then commit.
        self.registry
            .register_derived(&spec.output, SignalConfig::default())
            .map_err(|e| AggregationError::InvalidSpec(e.to_string()))?;

        let id = PipelineId::generate();
        self.pipelines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                PipelineState {
                    spec,
                    watermark_us: None,
                    last_run: None,
                },
            );
        Ok(id)
    }

    /// Removes a pipeline. The derived output signal stays registered;
    /// its history remains queryable.
    pub fn remove_pipeline(&self, id: PipelineId) -> Result<(), AggregationError> {
        self.pipelines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AggregationError::NotFound(id.to_string()))
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Runs every pipeline whose trigger is due. Called by the
    /// processing loop each tick; single-threaded per loop.
    pub fn run_due_pipelines(&self) {
        let due: Vec<PipelineId> = {
            let guard = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
            guard
                .iter()
                .filter(|(_, p)| match p.spec.trigger {
                    Trigger::Continuous => true,
                    Trigger::Interval { ms } => p
                        .last_run
                        .map(|t| t.elapsed().as_millis() as u64 >= ms)
                        .unwrap_or(true),
                })
                .map(|(id, _)| *id)
                .collect()
        };

        for id in due {
            self.run_pipeline(id);
        }
    }

    /// Executes one pipeline run: align, combine, stages, emit frames
    /// newer than the watermark into the derived output.
    pub fn run_pipeline(&self, id: PipelineId) {
        let (spec, watermark) = {
            let mut guard = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
            let state = match guard.get_mut(&id) {
                Some(state) => state,
                None => return,
            };
            state.last_run = Some(Instant::now());
            (state.spec.clone(), state.watermark_us)
        };

        let started = Instant::now();

        let mut snapshots = Vec::with_capacity(spec.inputs.len());
        for input in &spec.inputs {
            match self.registry.get(input) {
                Some(entry) => snapshots.push(entry.snapshot()),
                // A missing input skips this run; the pipeline survives
                // in case the signal is re-registered.
                None => return,
            }
        }
        let aligned = match align(&snapshots) {
            Some(aligned) => aligned,
            None => return,
        };

        let combined = pipeline::combine(&aligned, spec.combine);
        let (output, _degraded) = pipeline::run_stages(combined, &spec.stages);

        // A run that blew its budget is dropped, not emitted.
        if let Some(timeout_ms) = spec.timeout_ms {
            if started.elapsed().as_millis() as u64 > timeout_ms {
                self.metrics
                    .aggregation_timeouts
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!("pipeline {} run dropped by timeout", id);
                return;
            }
        }

        let fresh: Vec<&Sample> = output
            .iter()
            .filter(|s| watermark.map_or(true, |w| s.timestamp_us > w))
            .collect();
        let newest = fresh.iter().map(|s| s.timestamp_us).max();
        for sample in &fresh {
            self.sampler
                .sample_derived(&spec.output, sample.value, Some(sample.timestamp_us));
        }

        if let Some(newest) = newest {
            let mut guard = self.pipelines.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(state) = guard.get_mut(&id) {
                state.watermark_us = Some(newest.max(state.watermark_us.unwrap_or(0)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SignalConfig;

    fn harness() -> (Aggregator, Arc<SignalRegistry>, Sampler) {
        let registry = Arc::new(SignalRegistry::new());
        let metrics = Arc::new(CoreMetrics::new());
        let sampler = Sampler::new(Arc::clone(&registry), Arc::clone(&metrics));
        let aggregator = Aggregator::new(Arc::clone(&registry), sampler.clone(), metrics);
        (aggregator, registry, sampler)
    }

    fn feed(sampler: &Sampler, id: &str, values: &[f64]) {
        for (i, &v) in values.iter().enumerate() {
            sampler.sample_at(id, v, Some((i as u64 + 1) * 1000), None);
        }
    }

    #[test]
    fn test_aggregate_unknown_signal() {
        let (aggregator, _registry, _sampler) = harness();
        let err = aggregator
            .aggregate(&["ghost".to_string()], &AggregateRequest::Statistical)
            .unwrap_err();
        assert_eq!(err, AggregationError::NotFound("ghost".to_string()));
    }

    #[test]
    fn test_aggregate_statistical() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        registry.register("b", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0, 2.0, 3.0]);
        feed(&sampler, "b", &[3.0, 2.0, 1.0]);

        let out = aggregator
            .aggregate(
                &["a".to_string(), "b".to_string()],
                &AggregateRequest::Statistical,
            )
            .unwrap();
        match out {
            AggregateOutput::Statistical(stats) => {
                assert_eq!(stats.means, vec![2.0, 2.0]);
                assert!(stats.correlation[0][1] < -0.99);
            }
            other => panic!("expected statistical, got {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_is_deterministic() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        registry.register("b", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0, 4.0, 2.0, 8.0]);
        feed(&sampler, "b", &[2.0, 3.0, 5.0, 7.0]);

        let ids = vec!["a".to_string(), "b".to_string()];
        let first = aggregator.aggregate(&ids, &AggregateRequest::Statistical).unwrap();
        let second = aggregator.aggregate(&ids, &AggregateRequest::Statistical).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_pipeline_composite_mean() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        registry.register("b", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0, 2.0, 3.0]);
        feed(&sampler, "b", &[3.0, 2.0, 1.0]);

        let id = aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["a".to_string(), "b".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap();

        aggregator.run_pipeline(id);

        let entry = registry.get("c").unwrap();
        assert!(entry.is_derived());
        let values: Vec<f64> = entry.snapshot().iter().map(|s| s.value).collect();
        assert_eq!(values, vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_pipeline_watermark_prevents_duplicates() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0, 2.0]);

        let id = aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["a".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap();

        aggregator.run_pipeline(id);
        aggregator.run_pipeline(id);
        assert_eq!(registry.get("c").unwrap().buffer_len(), 2);

        // New input frames flow through on the next run.
        sampler.sample_at("a", 5.0, Some(10_000), None);
        aggregator.run_pipeline(id);
        assert_eq!(registry.get("c").unwrap().buffer_len(), 3);
    }

    #[test]
    fn test_self_cycle_rejected_without_state_change() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0]);

        // a → c exists; c → a would loop back through a's consumer.
        aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["a".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap();

        let before = aggregator.pipeline_count();
        let err = aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["c".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "a".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap_err();
        // Rejected as a cycle or as a collision with the registered "a";
        // either way no pipeline was created.
        assert!(matches!(
            err,
            AggregationError::Cycle(_) | AggregationError::InvalidSpec(_)
        ));
        assert_eq!(aggregator.pipeline_count(), before);
    }

    #[test]
    fn test_output_in_inputs_is_cycle() {
        let (aggregator, _registry, _sampler) = harness();
        let err = aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["c".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap_err();
        assert!(matches!(err, AggregationError::Cycle(_)));
        assert_eq!(aggregator.pipeline_count(), 0);
    }

    #[test]
    fn test_unknown_input_rejected() {
        let (aggregator, _registry, _sampler) = harness();
        let err = aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["ghost".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap_err();
        assert_eq!(err, AggregationError::NotFound("ghost".to_string()));
    }

    #[test]
    fn test_derived_output_rejects_external_ingest() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0]);
        aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["a".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap();

        assert_eq!(
            sampler.sample("c", 99.0, None),
            crate::sampler::SampleOutcome::DroppedDerived
        );
    }

    #[test]
    fn test_remove_pipeline() {
        let (aggregator, registry, sampler) = harness();
        registry.register("a", SignalConfig::default()).unwrap();
        feed(&sampler, "a", &[1.0]);
        let id = aggregator
            .create_pipeline(PipelineSpec {
                inputs: vec!["a".to_string()],
                combine: CombineOp::Mean,
                stages: vec![],
                output: "c".to_string(),
                trigger: Trigger::Continuous,
                timeout_ms: None,
            })
            .unwrap();
        aggregator.remove_pipeline(id).unwrap();
        assert!(aggregator.remove_pipeline(id).is_err());
        // The derived output signal survives removal.
        assert!(registry.get("c").is_some());
    }
}
