//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Periodicity Detection
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-12
//! Version: 1.0.0
//! Description: Detects repetition through autocorrelation peaks,
//! cross-checked against the strongest FFT magnitudes.
//! Layer: Core
//! Dependencies: dsp
//! Affected Components: engine, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! A lag with autocorrelation ≥ 0.6 marks a candidate period; the period
//! in seconds is lag/fs with fs estimated from the median inter-sample
//! spacing. Confidence blends time-domain and frequency-domain evidence:
//!   confidence = 0.6·max_autocorr + 0.4·min(max_mag/mean_mag − 1, 10)/10
//! clamped to [0, 1].
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-12 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use crate::detect::types::{AnalysisResult, PeriodicityAnalysis};
use crate::dsp::correlation::{autocorrelation, find_peaks};
use crate::dsp::spectrum::{bin_frequency, magnitude_spectrum};

/// Autocorrelation coefficient that qualifies a lag as periodic.
const CORRELATION_GATE: f64 = 0.6;

/// Minimum samples for a meaningful autocorrelation landscape.
pub const MIN_SAMPLES: usize = 20;

/// Number of FFT bins reported as the frequency-domain cross-check.
const TOP_BINS: usize = 5;

/// Analyzes periodicity. `sample_rate_hz` comes from the median
/// inter-sample spacing (or the configured rate hint when timestamps are
/// too few). Returns the result plus a degraded flag for safe-default
/// fallbacks.
pub fn analyze(values: &[f64], sample_rate_hz: f64) -> (AnalysisResult, bool) {
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
    let fs = if sample_rate_hz.is_finite() && sample_rate_hz > 0.0 {
        sample_rate_hz
    } else {
        degraded = true;
        1.0
    };

    // Time domain: qualifying autocorrelation peaks, lag 0 excluded by
    // construction (a peak needs a rise, and r(0) = 1 is the global max).
    // Peaks stay in lag order: a periodic signal correlates equally at
    // every multiple of its period, and the first qualifying lag is the
    // fundamental.
    let autocorr = autocorrelation(values);
    let peaks = find_peaks(&autocorr, CORRELATION_GATE, 2);

    let dominant_lag = peaks.first().map(|p| p.index).unwrap_or(0);
    let max_autocorr = peaks
        .iter()
        .map(|p| p.value)
        .fold(0.0_f64, f64::max);

    let periods_s: Vec<f64> = peaks.iter().map(|p| p.index as f64 / fs).collect();

    // Frequency domain: top bins as a cross-check.
    let magnitudes = magnitude_spectrum(values);
    let fft_len = values.len().next_power_of_two();
    let mut indexed: Vec<(usize, f64)> = magnitudes
        .iter()
        .enumerate()
        .skip(1) // DC carries no periodicity information
        .map(|(i, &m)| (i, m))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let dominant_frequencies_hz: Vec<f64> = indexed
        .iter()
        .take(TOP_BINS)
        .map(|(i, _)| bin_frequency(*i, fft_len, fs))
        .collect();

    // Spectral contrast term of the confidence blend.
    let max_mag = indexed.first().map(|(_, m)| *m).unwrap_or(0.0);
    let mean_mag = if indexed.is_empty() {
        0.0
    } else {
        indexed.iter().map(|(_, m)| m).sum::<f64>() / indexed.len() as f64
    };
    let contrast = if mean_mag < f64::EPSILON {
        degraded = true;
        0.0
    } else {
        (max_mag / mean_mag - 1.0).min(10.0).max(0.0) / 10.0
    };

    let confidence = (0.6 * max_autocorr + 0.4 * contrast).clamp(0.0, 1.0);
    let detected = !peaks.is_empty();

    (
        AnalysisResult::Periodicity(PeriodicityAnalysis {
            detected,
            periods_s,
            dominant_frequencies_hz,
            confidence,
            max_autocorrelation: max_autocorr,
            dominant_lag,
        }),
        degraded,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(n: usize, period: f64) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn test_insufficient_data() {
        let (result, degraded) = analyze(&[1.0, 2.0, 3.0], 10.0);
        assert!(result.is_insufficient());
        assert!(!degraded);
    }

    #[test]
    fn test_pure_sine_detected() {
        // Period 10 samples at 10 Hz → 1.0 s period, 1.0 Hz.
        let values = sine(400, 10.0);
        let (result, degraded) = analyze(&values, 10.0);
        assert!(!degraded);
        match result {
            AnalysisResult::Periodicity(p) => {
                assert!(p.detected);
                assert!(p.confidence >= 0.8, "confidence {}", p.confidence);
                let period = p.periods_s[0];
                assert!((1.0 / period - 1.0).abs() < 0.1, "period {}", period);
                // FFT cross-check should agree near 1 Hz.
                let nearest = p
                    .dominant_frequencies_hz
                    .iter()
                    .cloned()
                    .fold(f64::MAX, |acc, f| {
                        if (f - 1.0).abs() < (acc - 1.0).abs() {
                            f
                        } else {
                            acc
                        }
                    });
                assert!((nearest - 1.0).abs() < 0.2, "nearest {}", nearest);
            }
            other => panic!("expected periodicity, got {:?}", other),
        }
    }

    #[test]
    fn test_aperiodic_signal_not_detected() {
        // Scrambled arithmetic noise has no lag ≥ 0.6.
        let values: Vec<f64> = (0..300)
            .map(|i| (((i * 193 + 71) ^ (i * 57 + 13)) % 211) as f64 / 211.0)
            .collect();
        let (result, _) = analyze(&values, 10.0);
        match result {
            AnalysisResult::Periodicity(p) => {
                assert!(!p.detected, "max_autocorr {}", p.max_autocorrelation);
            }
            other => panic!("expected periodicity, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_signal_not_periodic() {
        let (result, _) = analyze(&[5.0; 100], 10.0);
        match result {
            AnalysisResult::Periodicity(p) => assert!(!p.detected),
            other => panic!("expected periodicity, got {:?}", other),
        }
    }
}
