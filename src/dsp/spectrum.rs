//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Spectral Analysis
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-10
//! Version: 1.0.0
//! Description: Length-normalized discrete Fourier transform on real
//! input, zero-padded to the next power of two. Magnitude and phase
//! spectra and bin/frequency mapping.
//! Layer: Core
//! Dependencies: rustfft
//! Affected Components: detect
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Magnitude spectrum: |X(k)| = √(re² + im²)
//! Phase spectrum:     φ(k) = atan2(im, re)
//! Frequency bin k corresponds to k·fs/N.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-10 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use rustfft::{num_complex::Complex, FftPlanner};
use std::sync::Mutex;

// Persistent FFT planner shared across analyses. First call may involve
// auto-tuning; subsequent plans for the same length are cached.
static FFT_PLANNER: Mutex<Option<FftPlanner<f64>>> = Mutex::new(None);

fn with_planner<T>(f: impl FnOnce(&mut FftPlanner<f64>) -> T) -> T {
    let mut guard = FFT_PLANNER.lock().unwrap_or_else(|e| e.into_inner());
    let planner = guard.get_or_insert_with(FftPlanner::new);
    f(planner)
}

/// Length-normalized DFT of real input, zero-padded to the next power of
/// two. Returns (re, im) pairs of length `padded_len`.
///
/// Empty input returns an empty spectrum.
pub fn fft(values: &[f64]) -> Vec<(f64, f64)> {
    if values.is_empty() {
        return Vec::new();
    }
    let fft_size = values.len().next_power_of_two();

    let mut buffer: Vec<Complex<f64>> = values
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .collect();
    buffer.resize(fft_size, Complex::new(0.0, 0.0));

    with_planner(|planner| {
        let plan = planner.plan_fft_forward(fft_size);
        plan.process(&mut buffer);
    });

    let norm = fft_size as f64;
    buffer.iter().map(|c| (c.re / norm, c.im / norm)).collect()
}

/// Magnitude spectrum over the positive-frequency half (N/2 bins).
pub fn magnitude_spectrum(values: &[f64]) -> Vec<f64> {
    let bins = fft(values);
    let half = bins.len() / 2;
    bins.iter()
        .take(half.max(bins.len().min(1)))
        .map(|(re, im)| (re * re + im * im).sqrt())
        .collect()
}

/// Phase spectrum over the positive-frequency half.
pub fn phase_spectrum(values: &[f64]) -> Vec<f64> {
    let bins = fft(values);
    let half = bins.len() / 2;
    bins.iter()
        .take(half.max(bins.len().min(1)))
        .map(|(re, im)| im.atan2(*re))
        .collect()
}

/// Frequency in Hz of bin `k` for a padded transform of `fft_len` bins at
/// sample rate `fs`.
pub fn bin_frequency(k: usize, fft_len: usize, fs: f64) -> f64 {
    if fft_len == 0 {
        return 0.0;
    }
    k as f64 * fs / fft_len as f64
}

/// Index of the strongest non-DC bin in a magnitude spectrum.
pub fn dominant_bin(magnitudes: &[f64]) -> Option<usize> {
    magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(fft(&[]).is_empty());
        assert!(magnitude_spectrum(&[]).is_empty());
    }

    #[test]
    fn test_single_element() {
        let bins = fft(&[3.0]);
        assert_eq!(bins.len(), 1);
        assert!((bins[0].0 - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_dc_signal() {
        let bins = fft(&[2.0; 64]);
        // All energy in bin 0 after normalization.
        assert!((bins[0].0 - 2.0).abs() < 1e-9);
        for (re, im) in bins.iter().skip(1) {
            assert!(re.abs() < 1e-9 && im.abs() < 1e-9);
        }
    }

    #[test]
    fn test_pure_tone_peaks_at_expected_bin() {
        // f = 8 cycles over N = 256 samples → bin 8.
        let n = 256;
        let tone: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 8.0 * i as f64 / n as f64).sin())
            .collect();
        let mags = magnitude_spectrum(&tone);
        let peak = dominant_bin(&mags).unwrap();
        assert_eq!(peak, 8);

        // Energy concentration ≥ 95% in the peak bin.
        let total: f64 = mags.iter().map(|m| m * m).sum();
        let peak_energy = mags[peak] * mags[peak];
        assert!(peak_energy / total >= 0.95);
    }

    #[test]
    fn test_zero_padding_to_power_of_two() {
        let bins = fft(&vec![1.0; 100]);
        assert_eq!(bins.len(), 128);
    }

    #[test]
    fn test_bin_frequency_mapping() {
        assert!((bin_frequency(8, 256, 10.0) - 0.3125).abs() < 1e-12);
        assert_eq!(bin_frequency(0, 256, 10.0), 0.0);
        assert_eq!(bin_frequency(5, 0, 10.0), 0.0);
    }

    #[test]
    fn test_phase_of_cosine_is_zero() {
        let n = 128;
        let tone: Vec<f64> = (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * 4.0 * i as f64 / n as f64).cos())
            .collect();
        let phases = phase_spectrum(&tone);
        assert!(phases[4].abs() < 1e-6);
    }
}
