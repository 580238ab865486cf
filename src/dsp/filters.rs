//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Time-Domain Filters
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-10
//! Version: 1.1.0
//! Description: Moving-average low-pass/high-pass/band-pass, Butterworth
//! IIR design with direct-form II evaluation, scalar Kalman and LMS
//! adaptive filtering. All batch functions preserve input length.
//! Layer: Core
//! Dependencies: rustfft (num_complex only)
//! Affected Components: detect, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! Butterworth low-pass design by bilinear transform:
//!   ωw = tan(π·fc/2)                       (prewarped cutoff)
//!   pₖ = ωw·exp(jπ(2k + n + 1)/(2n))       (analog poles, left half-plane)
//!   zₖ = (1 + pₖ)/(1 − pₖ)                 (digital poles)
//! Zeros sit at z = −1 (n of them); gain is normalized to unity at DC.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-10 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-21 - Carlos Eduardo Favini - Direct-form II transposed state (v1.1.0)
//! --------------------------

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Sliding mean of window `w`, padded at the leading edge with expanding
/// windows so the output length equals the input length.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for (i, &v) in values.iter().enumerate() {
        sum += v;
        if i >= window {
            sum -= values[i - window];
        }
        let effective = (i + 1).min(window);
        out.push(sum / effective as f64);
    }
    out
}

/// Window size for a moving-average low-pass at `cutoff_hz`.
///
/// max(2, round(100/cutoff)). The constant assumes the nominal 100 Hz
/// high-rate class; lower-rate signals simply get a gentler filter.
pub fn low_pass_window(cutoff_hz: f64) -> usize {
    if !cutoff_hz.is_finite() || cutoff_hz <= 0.0 {
        return 2;
    }
    ((100.0 / cutoff_hz).round() as usize).max(2)
}

/// Moving-average low-pass with window derived from the cutoff frequency.
pub fn low_pass(values: &[f64], cutoff_hz: f64) -> Vec<f64> {
    moving_average(values, low_pass_window(cutoff_hz))
}

/// High-pass as the low-pass residual: x − low_pass(x).
pub fn high_pass(values: &[f64], cutoff_hz: f64) -> Vec<f64> {
    let lp = low_pass(values, cutoff_hz);
    values.iter().zip(lp.iter()).map(|(v, l)| v - l).collect()
}

/// Band-pass via cascade: low-pass at the upper cutoff, then high-pass at
/// the lower cutoff.
pub fn band_pass(values: &[f64], low_hz: f64, high_hz: f64) -> Vec<f64> {
    let lp = low_pass(values, high_hz);
    high_pass(&lp, low_hz)
}

/// Butterworth low-pass coefficients `(b, a)` for `order` ∈ 1..=4 and a
/// cutoff normalized to the Nyquist frequency (0 < cutoff < 1).
///
/// `a[0]` is normalized to 1. Out-of-range parameters clamp to the nearest
/// valid design rather than raising.
pub fn butterworth_lowpass(order: usize, cutoff: f64) -> (Vec<f64>, Vec<f64>) {
    let order = order.clamp(1, 4);
    let cutoff = cutoff.clamp(1e-6, 1.0 - 1e-6);

    let warped = (std::f64::consts::PI * cutoff / 2.0).tan();

    // Analog prototype poles scaled by the prewarped cutoff.
    let mut digital_poles = Vec::with_capacity(order);
    for k in 0..order {
        let theta = std::f64::consts::PI * (2 * k + order + 1) as f64 / (2 * order) as f64;
        let analog = Complex::new(warped * theta.cos(), warped * theta.sin());
        let one = Complex::new(1.0, 0.0);
        digital_poles.push((one + analog) / (one - analog));
    }

    // Denominator from digital poles; conjugate pairs keep it real.
    let a = poly_from_roots(&digital_poles);

    // Numerator: `order` zeros at z = -1 (binomial coefficients).
    let minus_one = vec![Complex::new(-1.0, 0.0); order];
    let mut b = poly_from_roots(&minus_one);

    // Unity gain at DC (z = 1).
    let a_dc: f64 = a.iter().sum();
    let b_dc: f64 = b.iter().sum();
    let gain = if b_dc.abs() < f64::EPSILON {
        0.0
    } else {
        a_dc / b_dc
    };
    for c in &mut b {
        *c *= gain;
    }

    (b, a)
}

/// Expands ∏(z − rₖ) into real polynomial coefficients, highest power
/// first. Imaginary residue from conjugate pairs is discarded.
fn poly_from_roots(roots: &[Complex<f64>]) -> Vec<f64> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs.iter().map(|c| c.re).collect()
}

/// Direct-form II (transposed) evaluation of an IIR filter.
///
/// State vector length is max(|a|, |b|) − 1; `a[0]` must be 1 (the design
/// functions guarantee it).
#[derive(Debug, Clone)]
pub struct DirectForm2 {
    b: Vec<f64>,
    a: Vec<f64>,
    state: Vec<f64>,
}

impl DirectForm2 {
    pub fn new(b: Vec<f64>, a: Vec<f64>) -> Self {
        let n = b.len().max(a.len());
        let mut b = b;
        let mut a = a;
        b.resize(n, 0.0);
        a.resize(n, 0.0);
        Self {
            b,
            a,
            state: vec![0.0; n.saturating_sub(1)],
        }
    }

    /// Processes one sample, updating the history buffer.
    pub fn step(&mut self, x: f64) -> f64 {
        let y = self.b[0] * x + self.state.first().copied().unwrap_or(0.0);
        let n = self.state.len();
        for i in 0..n {
            let next = if i + 1 < n { self.state[i + 1] } else { 0.0 };
            self.state[i] = self.b[i + 1] * x + next - self.a[i + 1] * y;
        }
        y
    }

    /// Filters a whole series, returning a same-length output.
    pub fn process(&mut self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.step(v)).collect()
    }

    /// Clears filter history.
    pub fn reset(&mut self) {
        self.state.iter_mut().for_each(|s| *s = 0.0);
    }
}

/// Output of one Kalman step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KalmanOutput {
    /// Filtered state estimate.
    pub value: f64,
    /// Measurement residual before the update.
    pub innovation: f64,
    /// Kalman gain used for the update.
    pub gain: f64,
}

/// Scalar Kalman filter: state (x, P), process noise Q, measurement noise R,
/// transition F, observation H.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KalmanFilter {
    x: f64,
    p: f64,
    q: f64,
    r: f64,
    f: f64,
    h: f64,
    initialized: bool,
}

impl KalmanFilter {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            x: 0.0,
            p: 1.0,
            q: process_noise.max(f64::EPSILON),
            r: measurement_noise.max(f64::EPSILON),
            f: 1.0,
            h: 1.0,
            initialized: false,
        }
    }

    pub fn with_model(mut self, transition: f64, observation: f64) -> Self {
        self.f = transition;
        self.h = observation;
        self
    }

    /// Predict then update with one measurement.
    pub fn step(&mut self, measurement: f64) -> KalmanOutput {
        if !self.initialized {
            // Seed the state from the first measurement to avoid a long
            // transient from x = 0.
            self.x = measurement / self.h;
            self.initialized = true;
        }

        // Predict
        self.x = self.f * self.x;
        self.p = self.f * self.p * self.f + self.q;

        // Update
        let innovation = measurement - self.h * self.x;
        let s = self.h * self.p * self.h + self.r;
        let gain = if s.abs() < f64::EPSILON {
            0.0
        } else {
            self.p * self.h / s
        };
        self.x += gain * innovation;
        self.p = (1.0 - gain * self.h) * self.p;

        KalmanOutput {
            value: self.x,
            innovation,
            gain,
        }
    }

    /// Filters a whole series, returning the state estimates.
    pub fn process(&mut self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.step(v).value).collect()
    }

    pub fn state(&self) -> (f64, f64) {
        (self.x, self.p)
    }
}

/// Output of one LMS step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmsOutput {
    /// Tap prediction ŷ before the weight update.
    pub prediction: f64,
    /// Error e = x − ŷ driving the update.
    pub error: f64,
}

/// Least-mean-squares adaptive filter with L taps and learning rate µ.
///
/// Predicts each sample from the previous L samples and adapts weights on
/// the prediction error. Weight history is tracked only when requested.
#[derive(Debug, Clone)]
pub struct LmsFilter {
    weights: Vec<f64>,
    delay_line: Vec<f64>,
    mu: f64,
    history: Option<Vec<Vec<f64>>>,
}

impl LmsFilter {
    pub fn new(taps: usize, learning_rate: f64) -> Self {
        let taps = taps.max(1);
        Self {
            weights: vec![0.0; taps],
            delay_line: vec![0.0; taps],
            mu: learning_rate.max(f64::EPSILON),
            history: None,
        }
    }

    /// Enables weight-history tracking.
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    /// Predicts the incoming sample from the delay line, then adapts.
    pub fn step(&mut self, x: f64) -> LmsOutput {
        let prediction: f64 = self
            .weights
            .iter()
            .zip(self.delay_line.iter())
            .map(|(w, u)| w * u)
            .sum();
        let error = x - prediction;

        for (w, u) in self.weights.iter_mut().zip(self.delay_line.iter()) {
            *w += self.mu * error * u;
        }
        if let Some(history) = &mut self.history {
            history.push(self.weights.clone());
        }

        // Shift the delay line: newest sample in front.
        self.delay_line.rotate_right(1);
        self.delay_line[0] = x;

        LmsOutput { prediction, error }
    }

    pub fn process(&mut self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.step(v).prediction).collect()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn weight_history(&self) -> Option<&[Vec<f64>]> {
        self.history.as_deref()
    }
}
