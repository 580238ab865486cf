//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Fractal Analysis
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-14
//! Version: 1.0.0
//! Description: Box-counting dimension of the sample path and Hurst
//! exponent by rescaled-range (R/S) analysis.
//! Layer: Core
//! Dependencies: dsp/statistics
//! Affected Components: engine, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! R/S: for chunks of length n, R is the range of the mean-adjusted
//! cumulative sum and S the chunk deviation; E[R/S] ~ c·nᴴ, so H is the
//! slope of ln(R/S) against ln(n). H < 0.45 anti-persistent, ≈ 0.5
//! random walk, > 0.55 persistent.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-14 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use crate::detect::types::{AnalysisResult, FractalAnalysis, SelfSimilarity};
use crate::dsp::statistics::{mean, std_dev};

/// Minimum samples for two usable R/S window sizes.
pub const MIN_SAMPLES: usize = 32;

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

    let hurst = match hurst_rs(values) {
        Some(h) => h,
        None => {
            // Degenerate series (zero deviation everywhere).
            degraded = true;
            0.5
        }
    };

    let box_dimension = match box_counting(values) {
        Some(d) => d,
        None => {
            degraded = true;
            1.0
        }
    };

    let self_similarity = if hurst < 0.45 {
        SelfSimilarity::AntiPersistent
    } else if hurst > 0.55 {
        SelfSimilarity::Persistent
    } else {
        SelfSimilarity::RandomWalk
    };

    (
        AnalysisResult::Fractal(FractalAnalysis {
            box_dimension,
            hurst_exponent: hurst,
            self_similarity,
        }),
        degraded,
    )
}

/// Hurst exponent via R/S over power-of-two window sizes 8..N/2.
fn hurst_rs(values: &[f64]) -> Option<f64> {
    let n = values.len();
    let mut log_n = Vec::new();
    let mut log_rs = Vec::new();

    let mut window = 8;
    while window <= n / 2 {
        let mut ratios = Vec::new();
        for chunk in values.chunks_exact(window) {
            let mu = mean(chunk);
            let sigma = std_dev(chunk);
            if sigma < f64::EPSILON {
                continue;
            }
            let mut cumulative = 0.0;
            let mut max_dev = f64::NEG_INFINITY;
            let mut min_dev = f64::INFINITY;
            for &v in chunk {
                cumulative += v - mu;
                max_dev = max_dev.max(cumulative);
                min_dev = min_dev.min(cumulative);
            }
            let range = max_dev - min_dev;
            if range > 0.0 {
                ratios.push(range / sigma);
            }
        }
        if !ratios.is_empty() {
            log_n.push((window as f64).ln());
            log_rs.push(mean(&ratios).ln());
        }
        window *= 2;
    }

    if log_n.len() < 2 {
        return None;
    }
    slope(&log_n, &log_rs).map(|h| h.clamp(0.0, 1.0))
}

/// Box-counting dimension of the normalized sample path over grids of
/// 4..=64 cells per axis. Vertical spans between consecutive samples are
/// filled so steep segments are counted.
fn box_counting(values: &[f64]) -> Option<f64> {
    let n = values.len();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range < f64::EPSILON {
        return None;
    }

    let mut log_grid = Vec::new();
    let mut log_count = Vec::new();

    for grid in [4usize, 8, 16, 32, 64] {
        let cell = |t: f64| -> usize { ((t * grid as f64) as usize).min(grid - 1) };
        let mut boxes = std::collections::HashSet::new();
        let mut prev_row = cell((values[0] - min) / range);
        for (i, &v) in values.iter().enumerate() {
            let col = cell(i as f64 / (n - 1) as f64);
            let row = cell((v - min) / range);
            let (lo, hi) = if prev_row <= row {
                (prev_row, row)
            } else {
                (row, prev_row)
            };
            for r in lo..=hi {
                boxes.insert((col, r));
            }
            prev_row = row;
        }
        log_grid.push((grid as f64).ln());
        log_count.push((boxes.len() as f64).ln());
    }

    slope(&log_grid, &log_count)
}

/// Least-squares slope, None for a degenerate abscissa.
fn slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let mx = mean(xs);
    let my = mean(ys);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        sxx += (x - mx) * (x - mx);
        sxy += (x - mx) * (y - my);
    }
    if sxx < f64::EPSILON {
        return None;
    }
    Some(sxy / sxx)
}
