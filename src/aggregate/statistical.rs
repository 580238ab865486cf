//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Statistical Aggregation
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-18
//! Version: 1.0.0
//! Description: Vector mean, covariance/correlation matrices, per-signal
//! ranges and a synchrony score over aligned multi-signal observations.
//! Layer: Core
//! Dependencies: aggregate/align
//! Affected Components: system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Synchrony is the mean absolute off-diagonal correlation: 1 when every
//! pair of signals moves in lockstep (either direction), 0 when all pairs
//! are uncorrelated.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-18 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use serde::{Deserialize, Serialize};

use crate::aggregate::align::AlignedSeries;

/// Statistical summary of aligned signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalAggregation {
    /// Per-signal mean over the aligned window.
    pub means: Vec<f64>,
    /// Per-signal (min, max) over the aligned window.
    pub ranges: Vec<(f64, f64)>,
    /// Population covariance matrix.
    pub covariance: Vec<Vec<f64>>,
    /// Pearson correlation matrix; unit diagonal.
    pub correlation: Vec<Vec<f64>>,
    /// Mean absolute off-diagonal correlation in [0, 1].
    pub synchrony: f64,
    /// Grid points the summary was computed over.
    pub observation_count: usize,
}

/// Computes the statistical aggregation. Pure function of the aligned
/// inputs: identical inputs yield identical output.
pub fn statistical(aligned: &AlignedSeries) -> StatisticalAggregation {
    let k = aligned.signal_count();
    let n = aligned.len();

    let means: Vec<f64> = aligned
        .values
        .iter()
        .map(|series| series.iter().sum::<f64>() / n.max(1) as f64)
        .collect();

    let ranges: Vec<(f64, f64)> = aligned
        .values
        .iter()
        .map(|series| {
            let min = series.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = series.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            (min, max)
        })
        .collect();

    let mut covariance = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in i..k {
            let mut cov = 0.0;
            for t in 0..n {
                cov += (aligned.values[i][t] - means[i]) * (aligned.values[j][t] - means[j]);
            }
            cov /= n.max(1) as f64;
            covariance[i][j] = cov;
            covariance[j][i] = cov;
        }
    }

    let mut correlation = vec![vec![0.0; k]; k];
    for i in 0..k {
        for j in 0..k {
            if i == j {
                correlation[i][j] = 1.0;
                continue;
            }
            let denom = (covariance[i][i] * covariance[j][j]).sqrt();
            correlation[i][j] = if denom < f64::EPSILON {
                0.0
            } else {
                (covariance[i][j] / denom).clamp(-1.0, 1.0)
            };
        }
    }

    let synchrony = if k < 2 {
        1.0
    } else {
        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..k {
            for j in (i + 1)..k {
                sum += correlation[i][j].abs();
                count += 1;
            }
        }
        sum / count as f64
    };

    StatisticalAggregation {
        means,
        ranges,
        covariance,
        correlation,
        synchrony,
        observation_count: n,
    }
}
