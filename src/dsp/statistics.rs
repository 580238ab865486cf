//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Descriptive Statistics
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-10
//! Version: 1.1.0
//! Description: Mean, median, variance, standard deviation, skewness,
//! kurtosis and percentiles over immutable slices, plus the Welford
//! running formulation for streaming consumers.
//! Layer: Core
//! Dependencies: None (pure computation)
//! Affected Components: detect, control, aggregate
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Welford's method updates mean and M2 incrementally:
//!   δ = x − μₙ₋₁;  μₙ = μₙ₋₁ + δ/n;  M2ₙ = M2ₙ₋₁ + δ·(x − μₙ)
//! Variance = M2/n. This is numerically stable for long streams where the
//! naive Σx² formulation catastrophically cancels.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-10 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-18 - Carlos Eduardo Favini - Population moments for skew/kurtosis (v1.1.0)
//! --------------------------

use serde::{Deserialize, Serialize};

/// Arithmetic mean. 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median by sorting a copy. 0.0 for empty input.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population variance. 0.0 for inputs shorter than two samples.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Population skewness (third standardized moment). 0.0 when the
/// distribution is degenerate.
pub fn skewness(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let mu = mean(values);
    let sigma = std_dev(values);
    if sigma < f64::EPSILON {
        return 0.0;
    }
    let n = values.len() as f64;
    values
        .iter()
        .map(|v| {
            let z = (v - mu) / sigma;
            z * z * z
        })
        .sum::<f64>()
        / n
}

/// Population excess kurtosis (fourth standardized moment minus 3).
/// 0.0 when the distribution is degenerate.
pub fn kurtosis(values: &[f64]) -> f64 {
    if values.len() < 4 {
        return 0.0;
    }
    let mu = mean(values);
    let sigma = std_dev(values);
    if sigma < f64::EPSILON {
        return 0.0;
    }
    let n = values.len() as f64;
    let fourth = values
        .iter()
        .map(|v| {
            let z = (v - mu) / sigma;
            z * z * z * z
        })
        .sum::<f64>()
        / n;
    fourth - 3.0
}

/// p-th percentile with linear interpolation between ranks.
/// `p` is clamped to [0, 100]. 0.0 for empty input.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let p = p.clamp(0.0, 100.0);
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Root mean square. 0.0 for empty input.
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Numerically stable online mean/variance (Welford's method).
///
/// Used by streaming consumers: adaptive thresholds, scalers, and any code
/// that cannot afford to re-scan history.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Folds one observation into the running moments.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population variance of everything pushed so far.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.min
        }
    }

    pub fn max(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.max
        }
    }
}
