//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Pattern Detector
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-12
//! Version: 1.1.0
//! Description: Dispatches a signal snapshot to the analysis family for
//! an enabled mode and wraps the outcome in a provenance record. The
//! configured filter chain is applied here, at analysis time; raw
//! samples in the buffer are never modified.
//! Layer: Core
//! Dependencies: core, dsp
//! Affected Components: engine, system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-12 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-26 - Carlos Eduardo Favini - Filter chain at analysis time (v1.1.0)
//! --------------------------

pub mod anomaly;
pub mod chaos;
pub mod fractal;
pub mod periodicity;
pub mod trend;
pub mod types;

use crate::core::clock::wall_clock_us;
use crate::core::types::{AnalysisMode, FilterSpec, Sample, SignalConfig};
use crate::dsp::correlation::{envelope, find_peaks};
use crate::dsp::filters::{
    band_pass, butterworth_lowpass, high_pass, low_pass, moving_average, DirectForm2, KalmanFilter,
    LmsFilter,
};
use crate::dsp::spectrum::{bin_frequency, dominant_bin, magnitude_spectrum};
use crate::dsp::statistics::{kurtosis, mean, median, rms, skewness, std_dev, variance};
use crate::detect::types::{
    AnalysisRecord, AnalysisResult, BasicStats, EnvelopeAnalysis, PeaksAnalysis, SpectrumAnalysis,
};

/// Minimum samples for a spectrum worth reporting.
const SPECTRUM_MIN_SAMPLES: usize = 8;

/// Default separation between reported peaks, in samples.
const PEAK_SEPARATION: usize = 3;

/// Runs one analysis mode over a snapshot and stamps the record.
pub fn run_analysis(
    signal_id: &str,
    mode: AnalysisMode,
    samples: &[Sample],
    config: &SignalConfig,
) -> AnalysisRecord {
    let raw: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let timestamps: Vec<u64> = samples.iter().map(|s| s.timestamp_us).collect();
    let values = apply_filter_chain(&raw, &config.filters);
    let fs = estimate_sample_rate(samples).unwrap_or_else(|| config.sampling_rate_hint.nominal_hz());

    let (result, degraded) = match mode {
        AnalysisMode::Basic => basic(&values),
        AnalysisMode::Spectrum => spectrum(&values, fs),
        AnalysisMode::Peaks => peaks(&values),
        AnalysisMode::Envelope => envelope_analysis(&values),
        AnalysisMode::Periodicity => periodicity::analyze(&values, fs),
        AnalysisMode::Trend => trend::analyze(&values),
        AnalysisMode::Anomaly => anomaly::analyze(&values, &timestamps, config.sensitivity),
        AnalysisMode::Chaos => chaos::analyze(&values),
        AnalysisMode::Fractal => fractal::analyze(&values),
    };

    AnalysisRecord {
        signal_id: signal_id.to_string(),
        mode,
        produced_at_us: wall_clock_us(),
        degraded,
        result,
    }
}

/// Applies the ordered filter chain to a value series. Output length
/// always equals input length.
pub fn apply_filter_chain(values: &[f64], filters: &[FilterSpec]) -> Vec<f64> {
    let mut current = values.to_vec();
    for filter in filters {
        current = apply_filter(&current, filter);
    }
    current
}

/// Applies one filter specification.
pub fn apply_filter(values: &[f64], filter: &FilterSpec) -> Vec<f64> {
    match filter {
        FilterSpec::MovingAverage { window } => moving_average(values, *window),
        FilterSpec::LowPass { cutoff_hz } => low_pass(values, *cutoff_hz),
        FilterSpec::HighPass { cutoff_hz } => high_pass(values, *cutoff_hz),
        FilterSpec::BandPass { low_hz, high_hz } => band_pass(values, *low_hz, *high_hz),
        FilterSpec::Butterworth { order, cutoff } => {
            let (b, a) = butterworth_lowpass(*order, *cutoff);
            DirectForm2::new(b, a).process(values)
        }
        FilterSpec::Kalman {
            process_noise,
            measurement_noise,
        } => KalmanFilter::new(*process_noise, *measurement_noise).process(values),
        FilterSpec::Lms {
            taps,
            learning_rate,
        } => LmsFilter::new(*taps, *learning_rate).process(values),
    }
}

/// Sample rate from the median inter-sample spacing. None when fewer than
/// two samples or a degenerate spacing.
pub fn estimate_sample_rate(samples: &[Sample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let deltas: Vec<f64> = samples
        .windows(2)
        .map(|w| (w[1].timestamp_us.saturating_sub(w[0].timestamp_us)) as f64)
        .collect();
    let median_us = median(&deltas);
    if median_us <= 0.0 {
        return None;
    }
    Some(1_000_000.0 / median_us)
}

fn basic(values: &[f64]) -> (AnalysisResult, bool) {
    if values.is_empty() {
        return (
            AnalysisResult::InsufficientData {
                required: 1,
                actual: 0,
            },
            false,
        );
    }
    let stats = BasicStats {
        count: values.len(),
        mean: mean(values),
        median: median(values),
        variance: variance(values),
        std_dev: std_dev(values),
        skewness: skewness(values),
        kurtosis: kurtosis(values),
        min: values.iter().cloned().fold(f64::INFINITY, f64::min),
        max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        rms: rms(values),
    };
    (AnalysisResult::Basic(stats), false)
}

fn spectrum(values: &[f64], fs: f64) -> (AnalysisResult, bool) {
    if values.len() < SPECTRUM_MIN_SAMPLES {
        return (
            AnalysisResult::InsufficientData {
                required: SPECTRUM_MIN_SAMPLES,
                actual: values.len(),
            },
            false,
        );
    }
    let magnitudes = magnitude_spectrum(values);
    let fft_len = values.len().next_power_of_two();
    let dominant = dominant_bin(&magnitudes).unwrap_or(0);
    let degraded = !(fs.is_finite() && fs > 0.0);
    let fs = if degraded { 1.0 } else { fs };
    (
        AnalysisResult::Spectrum(SpectrumAnalysis {
            dominant_frequency_hz: bin_frequency(dominant, fft_len, fs),
            dominant_bin: dominant,
            resolution_hz: fs / fft_len as f64,
            sample_rate_hz: fs,
            fft_len,
            magnitudes,
        }),
        degraded,
    )
}

fn peaks(values: &[f64]) -> (AnalysisResult, bool) {
    if values.len() < 3 {
        return (
            AnalysisResult::InsufficientData {
                required: 3,
                actual: values.len(),
            },
            false,
        );
    }
    // Peaks must rise above the signal's own spread.
    let threshold = mean(values) + std_dev(values);
    let found = find_peaks(values, threshold, PEAK_SEPARATION);
    (
        AnalysisResult::Peaks(PeaksAnalysis {
            peaks: found,
            threshold,
        }),
        false,
    )
}

fn envelope_analysis(values: &[f64]) -> (AnalysisResult, bool) {
    if values.is_empty() {
        return (
            AnalysisResult::InsufficientData {
                required: 1,
                actual: 0,
            },
            false,
        );
    }
    // Window scales with the snapshot but stays responsive.
    let window = (values.len() / 20).clamp(3, 25);
    let (upper, lower) = envelope(values, window);
    (
        AnalysisResult::Envelope(EnvelopeAnalysis {
            upper,
            lower,
            window,
        }),
        false,
    )
}
