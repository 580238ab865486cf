//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Multi-Signal Fusion
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-19
//! Version: 1.0.0
//! Description: Weighted combination and sensor-fusion variants over
//! aligned signals: simple average, sequential scalar Kalman, Bayesian
//! precision weighting, and a Dempster–Shafer style conflict-discounted
//! blend. Every variant emits a fused stream plus a confidence.
//! Layer: Core
//! Dependencies: aggregate/align, dsp/statistics
//! Affected Components: system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Per-sensor measurement noise is estimated from each signal's variance
//! over the aligned window. Kalman runs one predict and one update per
//! sensor per grid step; Bayesian uses precision weights wᵢ = 1/σᵢ²;
//! Dempster–Shafer assigns precision masses and discounts confidence by
//! the normalized pairwise disagreement (conflict).
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-19 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use serde::{Deserialize, Serialize};

use crate::aggregate::align::AlignedSeries;
use crate::dsp::statistics::variance;

/// Fusion method families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    SimpleAverage,
    Kalman,
    Bayesian,
    DempsterShafer,
}

/// A fused stream with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionResult {
    pub method: FusionMethod,
    pub timestamps_us: Vec<u64>,
    pub fused: Vec<f64>,
    /// Method-specific confidence in [0, 1].
    pub confidence: f64,
}

/// Componentwise weighted sum. Weight count must match the signal count.
pub fn weighted_sum(aligned: &AlignedSeries, weights: &[f64]) -> Option<(Vec<u64>, Vec<f64>)> {
    if weights.len() != aligned.signal_count() {
        return None;
    }
    let fused: Vec<f64> = (0..aligned.len())
        .map(|t| {
            aligned
                .values
                .iter()
                .zip(weights.iter())
                .map(|(series, w)| series[t] * w)
                .sum()
        })
        .collect();
    Some((aligned.timestamps_us.clone(), fused))
}

/// Fuses aligned signals with the chosen method.
pub fn fuse(aligned: &AlignedSeries, method: FusionMethod) -> FusionResult {
    match method {
        FusionMethod::SimpleAverage => simple_average(aligned),
        FusionMethod::Kalman => kalman(aligned),
        FusionMethod::Bayesian => bayesian(aligned),
        FusionMethod::DempsterShafer => dempster_shafer(aligned),
    }
}

/// Row means; confidence falls with the average cross-sensor spread.
fn simple_average(aligned: &AlignedSeries) -> FusionResult {
    let k = aligned.signal_count().max(1) as f64;
    let mut fused = Vec::with_capacity(aligned.len());
    let mut spread_sum = 0.0;
    for t in 0..aligned.len() {
        let row: Vec<f64> = aligned.values.iter().map(|s| s[t]).collect();
        let mean = row.iter().sum::<f64>() / k;
        spread_sum += variance(&row).sqrt();
        fused.push(mean);
    }
    let mean_spread = spread_sum / aligned.len().max(1) as f64;
    FusionResult {
        method: FusionMethod::SimpleAverage,
        timestamps_us: aligned.timestamps_us.clone(),
        fused,
        confidence: 1.0 / (1.0 + mean_spread),
    }
}

/// Per-sensor measurement variances over the window, floored so a
/// constant sensor cannot claim infinite precision.
fn sensor_variances(aligned: &AlignedSeries) -> Vec<f64> {
    aligned
        .values
        .iter()
        .map(|series| variance(series).max(1e-9))
        .collect()
}

/// Sequential scalar Kalman: one predict, then one measurement update
/// per sensor, per grid step. Process noise is a fixed small constant;
/// measurement noise per sensor comes from its window variance.
fn kalman(aligned: &AlignedSeries) -> FusionResult {
    const PROCESS_NOISE: f64 = 1e-3;
    let noises = sensor_variances(aligned);

    let mut fused = Vec::with_capacity(aligned.len());
    let mut x = 0.0;
    let mut p = 1.0;
    let mut seeded = false;

    for t in 0..aligned.len() {
        if !seeded {
            let row: Vec<f64> = aligned.values.iter().map(|s| s[t]).collect();
            x = row.iter().sum::<f64>() / row.len().max(1) as f64;
            seeded = true;
        }
        p += PROCESS_NOISE;
        for (series, &r) in aligned.values.iter().zip(noises.iter()) {
            let z = series[t];
            let gain = p / (p + r);
            x += gain * (z - x);
            p *= 1.0 - gain;
        }
        fused.push(x);
    }

    FusionResult {
        method: FusionMethod::Kalman,
        timestamps_us: aligned.timestamps_us.clone(),
        fused,
        confidence: 1.0 / (1.0 + p),
    }
}

/// Inverse-variance weighted average per grid step.
fn bayesian(aligned: &AlignedSeries) -> FusionResult {
    let noises = sensor_variances(aligned);
    let precisions: Vec<f64> = noises.iter().map(|v| 1.0 / v).collect();
    let total_precision: f64 = precisions.iter().sum();

    let fused: Vec<f64> = (0..aligned.len())
        .map(|t| {
            aligned
                .values
                .iter()
                .zip(precisions.iter())
                .map(|(series, w)| series[t] * w)
                .sum::<f64>()
                / total_precision
        })
        .collect();

    FusionResult {
        method: FusionMethod::Bayesian,
        timestamps_us: aligned.timestamps_us.clone(),
        fused,
        confidence: 1.0 - 1.0 / (1.0 + total_precision),
    }
}

/// Precision masses with conflict discounting: the fused value is the
/// mass-weighted blend, and confidence is scaled down by the mean
/// normalized pairwise disagreement between sensors.
fn dempster_shafer(aligned: &AlignedSeries) -> FusionResult {
    let noises = sensor_variances(aligned);
    let precisions: Vec<f64> = noises.iter().map(|v| 1.0 / v).collect();
    let total_precision: f64 = precisions.iter().sum();
    let masses: Vec<f64> = precisions.iter().map(|p| p / total_precision).collect();

    let k = aligned.signal_count();
    let mut fused = Vec::with_capacity(aligned.len());
    let mut conflict_sum = 0.0;

    for t in 0..aligned.len() {
        let row: Vec<f64> = aligned.values.iter().map(|s| s[t]).collect();
        let blend: f64 = row.iter().zip(masses.iter()).map(|(z, m)| z * m).sum();
        fused.push(blend);

        // Normalized pairwise disagreement as the conflict measure.
        let min = row.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let scale = (max.abs().max(min.abs())).max(1e-9);
        let mut disagreement = 0.0;
        let mut pairs = 0usize;
        for i in 0..k {
            for j in (i + 1)..k {
                disagreement += (row[i] - row[j]).abs() / scale;
                pairs += 1;
            }
        }
        if pairs > 0 {
            conflict_sum += (disagreement / pairs as f64).min(1.0);
        }
    }

    let mean_conflict = conflict_sum / aligned.len().max(1) as f64;
    FusionResult {
        method: FusionMethod::DempsterShafer,
        timestamps_us: aligned.timestamps_us.clone(),
        fused,
        confidence: (1.0 - mean_conflict).clamp(0.0, 1.0),
    }
}
