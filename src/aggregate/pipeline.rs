//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Aggregation Pipelines
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-19
//! Version: 1.1.0
//! Description: Composite-signal pipelines: aligned inputs are combined
//! into one series, pushed through pure stages, and emitted into a
//! derived output signal. Pipeline graphs are checked for cycles at
//! creation; rejection makes no state change.
//! Layer: Core
//! Dependencies: aggregate/align, dsp
//! Affected Components: engine, system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-19 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-28 - Carlos Eduardo Favini - Output watermark (v1.1.0)
//! --------------------------

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::aggregate::align::AlignedSeries;
use crate::core::types::Sample;
use crate::dsp::filters::moving_average;
use crate::dsp::statistics::{mean, percentile, rms};

/// How aligned input rows collapse into one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOp {
    Mean,
    Sum,
    Min,
    Max,
}

impl Default for CombineOp {
    fn default() -> Self {
        CombineOp::Mean
    }
}

/// Per-sample value transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MapOp {
    Scale { factor: f64 },
    Offset { amount: f64 },
    Abs,
    Clamp { min: f64, max: f64 },
    /// Natural log; non-positive inputs fall back to 0 and degrade.
    Log,
    Sqrt,
}

/// Sample predicates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOp {
    Above { threshold: f64 },
    Below { threshold: f64 },
    Finite,
}

/// Series-to-scalar reductions. The reduced sample carries the last
/// input timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReduceOp {
    Mean,
    Sum,
    Min,
    Max,
    Rms,
    Percentile { p: f64 },
}

/// Series-to-series transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    /// Min-max normalization onto [0, 1]; degenerate range degrades.
    Normalize,
    /// First differences; output is one shorter.
    Differentiate,
    /// Cumulative sum.
    Integrate,
    Smooth { window: usize },
}

/// One pipeline stage: a pure function over a sequence of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    Map(MapOp),
    Filter(FilterOp),
    Reduce(ReduceOp),
    Window { size: usize },
    Transform(TransformOp),
}

/// When a pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    /// Every processing tick.
    Continuous,
    /// At most once per interval.
    Interval { ms: u64 },
}

/// Pipeline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Input signal ids; must be registered and non-empty.
    pub inputs: Vec<String>,
    /// Row combiner applied after alignment.
    #[serde(default)]
    pub combine: CombineOp,
    /// Ordered stages applied to the combined series.
    #[serde(default)]
    pub stages: Vec<PipelineStage>,
    /// Derived output signal id; created at pipeline creation.
    pub output: String,
    pub trigger: Trigger,
    /// Per-run timeout; on expiry the run's output is dropped and a
    /// counter incremented.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Collapses aligned rows with the combine op.
pub fn combine(aligned: &AlignedSeries, op: CombineOp) -> Vec<Sample> {
    (0..aligned.len())
        .map(|t| {
            let row: Vec<f64> = aligned.values.iter().map(|s| s[t]).collect();
            let value = match op {
                CombineOp::Mean => mean(&row),
                CombineOp::Sum => row.iter().sum(),
                CombineOp::Min => row.iter().cloned().fold(f64::INFINITY, f64::min),
                CombineOp::Max => row.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            };
            Sample::new(value, aligned.timestamps_us[t])
        })
        .collect()
}

/// Applies one stage. The bool reports a safe-default fallback.
pub fn apply_stage(samples: Vec<Sample>, stage: &PipelineStage) -> (Vec<Sample>, bool) {
    match stage {
        PipelineStage::Map(op) => {
            let mut degraded = false;
            let out = samples
                .into_iter()
                .map(|mut s| {
                    s.value = match op {
                        MapOp::Scale { factor } => s.value * factor,
                        MapOp::Offset { amount } => s.value + amount,
                        MapOp::Abs => s.value.abs(),
                        MapOp::Clamp { min, max } => s.value.clamp(*min, *max),
                        MapOp::Log => {
                            if s.value <= 0.0 {
                                degraded = true;
                                0.0
                            } else {
                                s.value.ln()
                            }
                        }
                        MapOp::Sqrt => {
                            if s.value < 0.0 {
                                degraded = true;
                                0.0
                            } else {
                                s.value.sqrt()
                            }
                        }
                    };
                    s
                })
                .collect();
            (out, degraded)
        }
        PipelineStage::Filter(op) => {
            let out = samples
                .into_iter()
                .filter(|s| match op {
                    FilterOp::Above { threshold } => s.value > *threshold,
                    FilterOp::Below { threshold } => s.value < *threshold,
                    FilterOp::Finite => s.value.is_finite(),
                })
                .collect();
            (out, false)
        }
        PipelineStage::Reduce(op) => {
            if samples.is_empty() {
                return (Vec::new(), false);
            }
            let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
            let value = match op {
                ReduceOp::Mean => mean(&values),
                ReduceOp::Sum => values.iter().sum(),
                ReduceOp::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
                ReduceOp::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                ReduceOp::Rms => rms(&values),
                ReduceOp::Percentile { p } => percentile(&values, *p),
            };
            let ts = samples.last().map(|s| s.timestamp_us).unwrap_or(0);
            (vec![Sample::new(value, ts)], false)
        }
        PipelineStage::Window { size } => {
            let size = (*size).max(1);
            let skip = samples.len().saturating_sub(size);
            (samples.into_iter().skip(skip).collect(), false)
        }
        PipelineStage::Transform(op) => match op {
            TransformOp::Normalize => {
                let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
                let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                let range = max - min;
                if range < f64::EPSILON {
                    let out = samples
                        .into_iter()
                        .map(|mut s| {
                            s.value = 0.0;
                            s
                        })
                        .collect();
                    return (out, true);
                }
                let out = samples
                    .into_iter()
                    .map(|mut s| {
                        s.value = (s.value - min) / range;
                        s
                    })
                    .collect();
                (out, false)
            }
            TransformOp::Differentiate => {
                let out = samples
                    .windows(2)
                    .map(|w| Sample::new(w[1].value - w[0].value, w[1].timestamp_us))
                    .collect();
                (out, false)
            }
            TransformOp::Integrate => {
                let mut acc = 0.0;
                let out = samples
                    .into_iter()
                    .map(|mut s| {
                        acc += s.value;
                        s.value = acc;
                        s
                    })
                    .collect();
                (out, false)
            }
            TransformOp::Smooth { window } => {
                let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
                let smoothed = moving_average(&values, (*window).max(1));
                let out = samples
                    .into_iter()
                    .zip(smoothed)
                    .map(|(mut s, v)| {
                        s.value = v;
                        s
                    })
                    .collect();
                (out, false)
            }
        },
    }
}

/// Runs the whole stage chain.
pub fn run_stages(mut samples: Vec<Sample>, stages: &[PipelineStage]) -> (Vec<Sample>, bool) {
    let mut degraded = false;
    for stage in stages {
        let (next, fell_back) = apply_stage(samples, stage);
        samples = next;
        degraded |= fell_back;
    }
    (samples, degraded)
}

/// DFS cycle check over the pipeline graph: nodes are signal ids, edges
/// run input → output for every existing pipeline plus the candidate.
/// Returns the ids on a detected cycle, if any.
pub fn find_cycle(
    existing: impl Iterator<Item = (Vec<String>, String)>,
    candidate_inputs: &[String],
    candidate_output: &str,
) -> Option<Vec<String>> {
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    for (inputs, output) in existing {
        for input in inputs {
            edges.entry(input).or_default().push(output.clone());
        }
    }
    for input in candidate_inputs {
        edges
            .entry(input.clone())
            .or_default()
            .push(candidate_output.to_string());
    }

    // A cycle, if introduced, passes through the candidate's output.
    let mut path = vec![candidate_output.to_string()];
    let mut visited = HashSet::new();
    if dfs(candidate_output, candidate_output, &edges, &mut visited, &mut path) {
        Some(path)
    } else {
        None
    }
}

fn dfs(
    node: &str,
    target: &str,
    edges: &HashMap<String, Vec<String>>,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> bool {
    if let Some(nexts) = edges.get(node) {
        for next in nexts {
            if next == target {
                path.push(next.clone());
                return true;
            }
            if visited.insert(next.clone()) {
                path.push(next.clone());
                if dfs(next, target, edges, visited, path) {
                    return true;
                }
                path.pop();
            }
        }
    }
    false
}
