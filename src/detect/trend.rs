//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Trend Fitting
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-12
//! Version: 1.1.0
//! Description: Fits linear, exponential, logarithmic and quadratic
//! models over sample index and selects the winner by R².
//! Layer: Core
//! Dependencies: dsp/statistics
//! Affected Components: engine, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Exponential fits regress ln(y) on x (valid only for strictly positive
//! series); logarithmic fits regress y on ln(x+1). The quadratic fit
//! solves the 3×3 normal equations directly. Because the quadratic nests
//! the linear model, its R² never loses; simpler models win ties within
//! a small margin so noise alone cannot promote curvature.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-12 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-26 - Carlos Eduardo Favini - Parsimony margin on model choice (v1.1.0)
//! --------------------------

use crate::detect::types::{AnalysisResult, TrendAnalysis, TrendDirection, TrendType};
use crate::dsp::statistics::{mean, std_dev};

/// Minimum samples for a meaningful fit.
pub const MIN_SAMPLES: usize = 10;

/// R² advantage a more complex model needs before it beats a simpler one.
const PARSIMONY_MARGIN: f64 = 0.005;

struct Fit {
    trend_type: TrendType,
    parameters: Vec<f64>,
    r_squared: f64,
}

/// Fits all candidate models and returns the best with a forecast-capable
/// payload. Degraded is set when a degenerate denominator forced a safe
/// default.
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
    let n = values.len();
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();

    // Candidates in parsimony order: simplest first.
    let mut fits: Vec<Fit> = Vec::with_capacity(4);

    if let Some((slope, intercept, r2)) = linear_regression(&xs, values) {
        fits.push(Fit {
            trend_type: TrendType::Linear,
            parameters: vec![slope, intercept],
            r_squared: r2,
        });
    } else {
        degraded = true;
    }

    // Logarithmic: y = a + b·ln(x+1).
    let log_xs: Vec<f64> = xs.iter().map(|x| (x + 1.0).ln()).collect();
    if let Some((b, a, r2)) = linear_regression(&log_xs, values) {
        fits.push(Fit {
            trend_type: TrendType::Logarithmic,
            parameters: vec![a, b],
            r_squared: r2,
        });
    }

    // Exponential: ln(y) = ln(a) + b·x, strictly positive series only.
    if values.iter().all(|&v| v > 0.0) {
        let log_ys: Vec<f64> = values.iter().map(|v| v.ln()).collect();
        if let Some((b, ln_a, _)) = linear_regression(&xs, &log_ys) {
            let a = ln_a.exp();
            // Score the exponential in the original space so R² values
            // are comparable across models.
            let predictions: Vec<f64> = xs.iter().map(|x| a * (b * x).exp()).collect();
            let r2 = r_squared(values, &predictions);
            fits.push(Fit {
                trend_type: TrendType::Exponential,
                parameters: vec![a, b],
                r_squared: r2,
            });
        }
    }

    if let Some(coeffs) = quadratic_regression(&xs, values) {
        let predictions: Vec<f64> = xs
            .iter()
            .map(|x| coeffs[0] + coeffs[1] * x + coeffs[2] * x * x)
            .collect();
        let r2 = r_squared(values, &predictions);
        fits.push(Fit {
            trend_type: TrendType::Polynomial,
            parameters: coeffs,
            r_squared: r2,
        });
    }

    if fits.is_empty() {
        return (
            AnalysisResult::InsufficientData {
                required: MIN_SAMPLES,
                actual: n,
            },
            true,
        );
    }

    // Best R², with earlier (simpler) models winning ties within margin.
    let best_r2 = fits
        .iter()
        .map(|f| f.r_squared)
        .fold(f64::NEG_INFINITY, f64::max);
    let winner = fits
        .iter()
        .find(|f| f.r_squared >= best_r2 - PARSIMONY_MARGIN)
        .unwrap_or(&fits[0]);

    let analysis = TrendAnalysis {
        trend_type: winner.trend_type,
        direction: direction_of(winner, values),
        parameters: winner.parameters.clone(),
        r_squared: winner.r_squared,
        fitted_over: n,
    };

    (AnalysisResult::Trend(analysis), degraded)
}

/// Least-squares y = slope·x + intercept. None when x is degenerate.
fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<(f64, f64, f64)> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = mean(xs);
    let mean_y = mean(ys);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx < f64::EPSILON {
        return None;
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let predictions: Vec<f64> = xs.iter().map(|x| slope * x + intercept).collect();
    Some((slope, intercept, r_squared(ys, &predictions)))
}

/// Solves the quadratic normal equations by Gaussian elimination.
fn quadratic_regression(xs: &[f64], ys: &[f64]) -> Option<Vec<f64>> {
    if xs.len() < 3 {
        return None;
    }
    let n = xs.len() as f64;
    let (mut sx, mut sx2, mut sx3, mut sx4) = (0.0, 0.0, 0.0, 0.0);
    let (mut sy, mut sxy, mut sx2y) = (0.0, 0.0, 0.0);
    for (&x, &y) in xs.iter().zip(ys.iter()) {
        let x2 = x * x;
        sx += x;
        sx2 += x2;
        sx3 += x2 * x;
        sx4 += x2 * x2;
        sy += y;
        sxy += x * y;
        sx2y += x2 * y;
    }
    let mut m = [
        [n, sx, sx2, sy],
        [sx, sx2, sx3, sxy],
        [sx2, sx3, sx4, sx2y],
    ];

    // Gaussian elimination with partial pivoting on the 3×4 system.
    for col in 0..3 {
        let pivot_row = (col..3)
            .max_by(|&a, &b| {
                m[a][col]
                    .abs()
                    .partial_cmp(&m[b][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);
        if m[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot_row);
        for row in 0..3 {
            if row == col {
                continue;
            }
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }
    Some(vec![m[0][3] / m[0][0], m[1][3] / m[1][1], m[2][3] / m[2][2]])
}

/// 1 − SSres/SStot; a degenerate SStot scores 1 for a perfect residual
/// and 0 otherwise.
fn r_squared(observed: &[f64], predicted: &[f64]) -> f64 {
    let mean_obs = mean(observed);
    let ss_tot: f64 = observed.iter().map(|y| (y - mean_obs) * (y - mean_obs)).sum();
    let ss_res: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p) * (y - p))
        .sum();
    if ss_tot < f64::EPSILON {
        return if ss_res < f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Direction from the fitted model's endpoint change, flat within a small
/// fraction of the signal's spread.
fn direction_of(fit: &Fit, values: &[f64]) -> TrendDirection {
    let n = values.len();
    let eval = |x: f64| -> f64 {
        match fit.trend_type {
            TrendType::Linear => fit.parameters[0] * x + fit.parameters[1],
            TrendType::Exponential => fit.parameters[0] * (fit.parameters[1] * x).exp(),
            TrendType::Logarithmic => fit.parameters[0] + fit.parameters[1] * (x + 1.0).ln(),
            TrendType::Polynomial => {
                fit.parameters[0] + fit.parameters[1] * x + fit.parameters[2] * x * x
            }
        }
    };
    let change = eval((n - 1) as f64) - eval(0.0);
    let tolerance = (0.05 * std_dev(values)).max(1e-9);
    if change > tolerance {
        TrendDirection::Rising
    } else if change < -tolerance {
        TrendDirection::Falling
    } else {
        TrendDirection::Flat
    }
}
