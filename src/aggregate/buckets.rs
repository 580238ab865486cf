//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Time-Bucketed Aggregation
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-18
//! Version: 1.0.0
//! Description: Groups samples into fixed windows at
//! floor(ts/window)·window — inclusive start, exclusive end — and applies
//! a reducer per bucket.
//! Layer: Core
//! Dependencies: dsp/statistics
//! Affected Components: system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-18 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use serde::{Deserialize, Serialize};

use crate::core::types::Sample;
use crate::dsp::statistics::{mean, percentile, rms};

/// Reducer applied to each bucket's values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reducer", rename_all = "snake_case")]
pub enum BucketReducer {
    Mean,
    Sum,
    Min,
    Max,
    Rms,
    HarmonicMean,
    GeometricMean,
    Percentile { p: f64 },
}

/// One reduced bucket. `start_us` is the inclusive lower bound; the
/// bucket covers [start_us, start_us + window).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub start_us: u64,
    pub value: f64,
    pub count: usize,
}

/// Buckets a sorted sample series. Returns the reduced buckets in time
/// order plus a degraded flag set when a reducer hit a safe-default path
/// (harmonic/geometric mean over non-positive values).
pub fn bucket_aggregate(
    samples: &[Sample],
    window_us: u64,
    reducer: BucketReducer,
) -> (Vec<Bucket>, bool) {
    if samples.is_empty() || window_us == 0 {
        return (Vec::new(), false);
    }

    let mut degraded = false;
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut current_start: Option<u64> = None;
    let mut current_values: Vec<f64> = Vec::new();

    let mut flush =
        |start: u64, values: &mut Vec<f64>, buckets: &mut Vec<Bucket>, degraded: &mut bool| {
            if values.is_empty() {
                return;
            }
            let (value, fell_back) = reduce(values, reducer);
            if fell_back {
                *degraded = true;
            }
            buckets.push(Bucket {
                start_us: start,
                value,
                count: values.len(),
            });
            values.clear();
        };

    for sample in samples {
        let start = (sample.timestamp_us / window_us) * window_us;
        match current_start {
            Some(s) if s == start => {}
            Some(s) => {
                flush(s, &mut current_values, &mut buckets, &mut degraded);
                current_start = Some(start);
            }
            None => current_start = Some(start),
        }
        current_values.push(sample.value);
    }
    if let Some(s) = current_start {
        flush(s, &mut current_values, &mut buckets, &mut degraded);
    }

    (buckets, degraded)
}

/// Applies one reducer; the bool reports a safe-default fallback.
fn reduce(values: &[f64], reducer: BucketReducer) -> (f64, bool) {
    match reducer {
        BucketReducer::Mean => (mean(values), false),
        BucketReducer::Sum => (values.iter().sum(), false),
        BucketReducer::Min => (values.iter().cloned().fold(f64::INFINITY, f64::min), false),
        BucketReducer::Max => (
            values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            false,
        ),
        BucketReducer::Rms => (rms(values), false),
        BucketReducer::HarmonicMean => {
            if values.iter().any(|&v| v <= 0.0) {
                return (0.0, true);
            }
            let sum_inv: f64 = values.iter().map(|v| 1.0 / v).sum();
            (values.len() as f64 / sum_inv, false)
        }
        BucketReducer::GeometricMean => {
            if values.iter().any(|&v| v <= 0.0) {
                return (0.0, true);
            }
            let log_sum: f64 = values.iter().map(|v| v.ln()).sum();
            ((log_sum / values.len() as f64).exp(), false)
        }
        BucketReducer::Percentile { p } => (percentile(values, p), false),
    }
}
