//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Correlation and Peak Analysis
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-10
//! Version: 1.0.0
//! Description: Autocorrelation, cross-correlation, peak detection and
//! moving-extremum envelopes over immutable slices.
//! Layer: Core
//! Dependencies: statistics
//! Affected Components: detect, aggregate
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Autocorrelation: r(lag) = Σ(xᵢ−µ)(xᵢ₊lag−µ) / (n·σ²), n = N−lag
//! r(0) = 1 by construction. A degenerate series (σ² ≈ 0) correlates to 0
//! at every non-zero lag.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-10 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use serde::{Deserialize, Serialize};

use crate::dsp::statistics::{mean, variance};

/// Maximum autocorrelation lag considered.
pub const MAX_AUTOCORR_LAG: usize = 100;

/// Autocorrelation for lags 0..=min(N−1, 100).
///
/// Returns one coefficient per lag; empty input yields an empty vector.
pub fn autocorrelation(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    let max_lag = (n - 1).min(MAX_AUTOCORR_LAG);
    let mu = mean(values);
    let var = variance(values);

    let mut out = Vec::with_capacity(max_lag + 1);
    out.push(1.0);
    if var < f64::EPSILON {
        // Degenerate series: no self-similarity information.
        out.extend(std::iter::repeat(0.0).take(max_lag));
        return out;
    }

    for lag in 1..=max_lag {
        let pairs = n - lag;
        let sum: f64 = (0..pairs)
            .map(|i| (values[i] - mu) * (values[i + lag] - mu))
            .sum();
        out.push((sum / (pairs as f64 * var)).clamp(-1.0, 1.0));
    }
    out
}

/// Cross-correlation of `a` against `b` for lags −max_lag..=max_lag.
///
/// Positive lag means `b` trails `a`. With `normalize`, coefficients are
/// Pearson-style (mean-removed, σ-scaled) and clamped to [−1, 1].
pub fn cross_correlation(a: &[f64], b: &[f64], max_lag: usize, normalize: bool) -> Vec<(i64, f64)> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mu_a = if normalize { mean(a) } else { 0.0 };
    let mu_b = if normalize { mean(b) } else { 0.0 };
    let sigma = if normalize {
        (variance(a) * variance(b)).sqrt()
    } else {
        1.0
    };

    let max_lag = max_lag as i64;
    let mut out = Vec::with_capacity((2 * max_lag + 1) as usize);
    for lag in -max_lag..=max_lag {
        let mut sum = 0.0;
        let mut count = 0usize;
        for i in 0..a.len() as i64 {
            let j = i + lag;
            if j < 0 || j >= b.len() as i64 {
                continue;
            }
            sum += (a[i as usize] - mu_a) * (b[j as usize] - mu_b);
            count += 1;
        }
        let coeff = if count == 0 {
            0.0
        } else if normalize {
            if sigma < f64::EPSILON {
                0.0
            } else {
                (sum / (count as f64 * sigma)).clamp(-1.0, 1.0)
            }
        } else {
            sum / count as f64
        };
        out.push((lag, coeff));
    }
    out
}

/// A detected local maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Sample index of the maximum.
    pub index: usize,
    /// Value at the maximum.
    pub value: f64,
}

/// Local maxima over 3-sample windows above `threshold`, with a minimum
/// index separation between reported peaks.
///
/// When two candidate peaks fall within `min_separation`, the taller one
/// wins.
pub fn find_peaks(values: &[f64], threshold: f64, min_separation: usize) -> Vec<Peak> {
    if values.len() < 3 {
        return Vec::new();
    }
    let mut peaks: Vec<Peak> = Vec::new();
    for i in 1..values.len() - 1 {
        let v = values[i];
        if v < threshold || v < values[i - 1] || v <= values[i + 1] {
            continue;
        }
        match peaks.last() {
            Some(last) if i - last.index < min_separation.max(1) => {
                if v > last.value {
                    peaks.pop();
                    peaks.push(Peak { index: i, value: v });
                }
            }
            _ => peaks.push(Peak { index: i, value: v }),
        }
    }
    peaks
}

/// Upper and lower envelopes as moving max/min over window `w`, centered
/// windows clamped at the edges. Output lengths equal the input length.
pub fn envelope(values: &[f64], window: usize) -> (Vec<f64>, Vec<f64>) {
    if values.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let window = window.max(1);
    let half = window / 2;
    let mut upper = Vec::with_capacity(values.len());
    let mut lower = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let start = i.saturating_sub(half);
        let end = (i + half + 1).min(values.len());
        let slice = &values[start..end];
        let max = slice.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min = slice.iter().cloned().fold(f64::INFINITY, f64::min);
        upper.push(max);
        lower.push(min);
    }
    (upper, lower)
}
