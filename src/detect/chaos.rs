//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Chaos Analysis
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-14
//! Version: 1.0.0
//! Description: Largest-Lyapunov estimation over a Takens phase-space
//! reconstruction, with coarse attractor classification.
//! Layer: Core
//! Dependencies: dsp/correlation
//! Affected Components: engine, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Takens embedding: Xᵢ = (xᵢ, xᵢ₊τ, xᵢ₊₂τ) with delay τ at the first
//! autocorrelation minimum (default 10). The Rosenstein-style estimate
//! averages ln(d_k/d_0)/k over nearest-neighbor pairs, where d_k is the
//! pair distance after k steps. λ > 0 bounds predictability at 1/λ.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-14 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use crate::detect::types::{AnalysisResult, AttractorType, ChaosAnalysis};
use crate::dsp::correlation::autocorrelation;

/// Minimum samples for a usable reconstruction.
pub const MIN_SAMPLES: usize = 50;

/// Embedding dimension for the reconstruction.
const EMBEDDING_DIM: usize = 3;

/// Default delay when the autocorrelation has no interior minimum.
const DEFAULT_DELAY: usize = 10;

/// Divergence horizon (steps) for the Lyapunov average.
const HORIZON: usize = 5;

/// Embedded points are capped to bound the O(M²) neighbor search.
const MAX_POINTS: usize = 400;

/// λ band treated as neutrally stable.
const NEUTRAL_BAND: f64 = 0.01;

pub fn analyze(values: &[f64]) -> (AnalysisResult, bool) {
    if values.len() < MIN_SAMPLES {
        return (
            AnalysisResult::InsufficientData {
                required: MIN_SAMPLES,
                actual: values.len(),
            },
            false,
        );
    }

    let mut degraded = false;
    let delay = first_autocorr_minimum(values).unwrap_or(DEFAULT_DELAY);

    // Reconstruct the phase space, newest points preferred.
    let span = (EMBEDDING_DIM - 1) * delay;
    if values.len() <= span + HORIZON {
        return (
            AnalysisResult::InsufficientData {
                required: span + HORIZON + 1,
                actual: values.len(),
            },
            false,
        );
    }
    let total = values.len() - span;
    let start = total.saturating_sub(MAX_POINTS);
    let points: Vec<[f64; EMBEDDING_DIM]> = (start..total)
        .map(|i| [values[i], values[i + delay], values[i + 2 * delay]])
        .collect();

    let lyapunov = match lyapunov_estimate(&points, delay) {
        Some(l) => l,
        None => {
            // Degenerate geometry (all points coincide). Report a stable
            // fixed point rather than failing the analysis.
            degraded = true;
            -1.0
        }
    };

    let attractor = if lyapunov > NEUTRAL_BAND {
        AttractorType::Strange
    } else if lyapunov < -NEUTRAL_BAND {
        AttractorType::FixedPoint
    } else {
        AttractorType::LimitCycle
    };

    let predictability_horizon = if lyapunov > 0.0 {
        Some(1.0 / lyapunov)
    } else {
        None
    };

    (
        AnalysisResult::Chaos(ChaosAnalysis {
            lyapunov_exponent: lyapunov,
            attractor,
            embedding_delay: delay,
            embedding_dimension: EMBEDDING_DIM,
            predictability_horizon,
        }),
        degraded,
    )
}

/// First interior local minimum of the autocorrelation function.
fn first_autocorr_minimum(values: &[f64]) -> Option<usize> {
    let r = autocorrelation(values);
    for lag in 1..r.len().saturating_sub(1) {
        if r[lag] < r[lag - 1] && r[lag] <= r[lag + 1] {
            return Some(lag.max(1));
        }
    }
    None
}

/// Rosenstein-style average log divergence rate over nearest-neighbor
/// pairs. None when no usable pair exists.
fn lyapunov_estimate(points: &[[f64; EMBEDDING_DIM]], delay: usize) -> Option<f64> {
    let m = points.len();
    if m < 2 * HORIZON {
        return None;
    }

    let mut rates = Vec::new();
    for i in 0..m - HORIZON {
        // Nearest neighbor outside the temporal exclusion window.
        let mut best: Option<(usize, f64)> = None;
        for j in 0..m - HORIZON {
            if i.abs_diff(j) <= delay {
                continue;
            }
            let d = distance(&points[i], &points[j]);
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((j, d));
            }
        }
        let (j, d0) = match best {
            Some(pair) => pair,
            None => continue,
        };
        if d0 < 1e-12 {
            continue;
        }
        let dk = distance(&points[i + HORIZON], &points[j + HORIZON]);
        if dk < 1e-12 {
            continue;
        }
        rates.push((dk / d0).ln() / HORIZON as f64);
    }

    if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

fn distance(a: &[f64; EMBEDDING_DIM], b: &[f64; EMBEDDING_DIM]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
