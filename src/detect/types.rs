//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Analysis Result Types
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-12
//! Version: 1.1.0
//! Description: The tagged analysis result union, one variant per analysis
//! mode, each with a fixed payload shape. Every record carries the source
//! signal id and a wall-clock timestamp.
//! Layer: Core
//! Dependencies: core/types, dsp
//! Affected Components: engine, bus, system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-12 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-24 - Carlos Eduardo Favini - Degraded flag on records (v1.1.0)
//! --------------------------

use serde::{Deserialize, Serialize};

use crate::core::types::{AnalysisMode, Sensitivity};
use crate::dsp::correlation::Peak;

/// Descriptive statistics payload for the `basic` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub variance: f64,
    pub std_dev: f64,
    pub skewness: f64,
    pub kurtosis: f64,
    pub min: f64,
    pub max: f64,
    pub rms: f64,
}

/// Magnitude spectrum payload for the `spectrum` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumAnalysis {
    /// Positive-frequency magnitude bins.
    pub magnitudes: Vec<f64>,
    /// Hz per bin: fs / fft_len.
    pub resolution_hz: f64,
    /// Estimated sample rate used for the frequency axis.
    pub sample_rate_hz: f64,
    /// Strongest non-DC bin.
    pub dominant_bin: usize,
    /// Frequency of the strongest non-DC bin.
    pub dominant_frequency_hz: f64,
    /// Padded transform length.
    pub fft_len: usize,
}

/// Detected peaks payload for the `peaks` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeaksAnalysis {
    pub peaks: Vec<Peak>,
    /// Amplitude threshold the detector used (µ + σ).
    pub threshold: f64,
}

/// Moving-extremum envelope payload for the `envelope` mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeAnalysis {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    pub window: usize,
}

/// Periodicity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicityAnalysis {
    /// Whether significant periodicity was found.
    pub detected: bool,
    /// Candidate periods in seconds in lag order; the fundamental first.
    pub periods_s: Vec<f64>,
    /// Dominant frequencies from the FFT cross-check, strongest first.
    pub dominant_frequencies_hz: Vec<f64>,
    /// 0.6·max_autocorr + 0.4·spectral-contrast term, clamped to [0, 1].
    pub confidence: f64,
    /// Strongest non-zero-lag autocorrelation coefficient.
    pub max_autocorrelation: f64,
    /// Lag (samples) of the first qualifying autocorrelation peak.
    pub dominant_lag: usize,
}

/// Best-fit trend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    Linear,
    Exponential,
    Logarithmic,
    Polynomial,
}

/// Direction of the fitted trend over the observed span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

/// Trend payload. `forecast` extrapolates the fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub trend_type: TrendType,
    pub direction: TrendDirection,
    /// Model parameters. Linear: [slope, intercept]. Exponential:
    /// [a, b] for y = a·e^(b·x). Logarithmic: [a, b] for y = a + b·ln(x+1).
    /// Polynomial: [c0, c1, c2] for y = c0 + c1·x + c2·x².
    pub parameters: Vec<f64>,
    /// Coefficient of determination of the winning fit.
    pub r_squared: f64,
    /// Number of samples the model was fitted over.
    pub fitted_over: usize,
}

impl TrendAnalysis {
    /// Extrapolates the fitted model `steps` samples past the observed end.
    pub fn forecast(&self, steps: usize) -> f64 {
        let x = (self.fitted_over.saturating_sub(1) + steps) as f64;
        match self.trend_type {
            TrendType::Linear => self.parameters[0] * x + self.parameters[1],
            TrendType::Exponential => self.parameters[0] * (self.parameters[1] * x).exp(),
            TrendType::Logarithmic => self.parameters[0] + self.parameters[1] * (x + 1.0).ln(),
            TrendType::Polynomial => {
                self.parameters[0] + self.parameters[1] * x + self.parameters[2] * x * x
            }
        }
    }
}

/// Classification of a pattern anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Statistical outlier by z-score only.
    Outlier,
    /// Sharp rise followed by recovery.
    Spike,
    /// Sharp drop followed by recovery.
    Dip,
    /// Sustained change of operating level.
    LevelShift,
    /// Derivative excursion too small to classify.
    MinorFluctuation,
}

/// Severity graded from |z|.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// |z| < 3 low, < 4 medium, < 6 high, else critical.
    pub fn from_z(z: f64) -> Self {
        let z = z.abs();
        if z < 3.0 {
            Severity::Low
        } else if z < 4.0 {
            Severity::Medium
        } else if z < 6.0 {
            Severity::High
        } else {
            Severity::Critical
        }
    }
}

/// One anomalous sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPoint {
    /// Index into the analyzed snapshot.
    pub index: usize,
    pub timestamp_us: u64,
    pub value: f64,
    pub z_score: f64,
    pub kind: AnomalyKind,
    pub severity: Severity,
}

/// Anomaly payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAnalysis {
    pub anomalies: Vec<AnomalyPoint>,
    pub sensitivity: Sensitivity,
    /// Mean of the analyzed values, for context.
    pub mean: f64,
    /// Standard deviation of the analyzed values.
    pub std_dev: f64,
}

/// Coarse attractor classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttractorType {
    /// Trajectories converge; λ < 0.
    FixedPoint,
    /// Bounded periodic orbit; λ ≈ 0.
    LimitCycle,
    /// Sensitive dependence on initial conditions; λ > 0.
    Strange,
}

/// Chaos payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChaosAnalysis {
    /// Largest Lyapunov exponent estimate (per sample).
    pub lyapunov_exponent: f64,
    pub attractor: AttractorType,
    /// Takens embedding delay τ in samples.
    pub embedding_delay: usize,
    /// Takens embedding dimension.
    pub embedding_dimension: usize,
    /// 1/λ when λ > 0; unbounded horizons are absent.
    pub predictability_horizon: Option<f64>,
}

/// Self-similarity classification from the Hurst exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfSimilarity {
    /// H < 0.45 — mean-reverting.
    AntiPersistent,
    /// 0.45 ≤ H ≤ 0.55 — uncorrelated increments.
    RandomWalk,
    /// H > 0.55 — trending.
    Persistent,
}

/// Fractal payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalAnalysis {
    pub box_dimension: f64,
    pub hurst_exponent: f64,
    pub self_similarity: SelfSimilarity,
}

/// Tagged analysis result keyed by mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Basic(BasicStats),
    Spectrum(SpectrumAnalysis),
    Peaks(PeaksAnalysis),
    Envelope(EnvelopeAnalysis),
    Periodicity(PeriodicityAnalysis),
    Trend(TrendAnalysis),
    Anomaly(AnomalyAnalysis),
    Chaos(ChaosAnalysis),
    Fractal(FractalAnalysis),
    /// The detector needs more history than the snapshot holds.
    InsufficientData { required: usize, actual: usize },
    /// The analysis family is recognized but not implemented.
    Unsupported,
}

impl AnalysisResult {
    /// Short summary for event payloads and logs.
    pub fn summary(&self) -> String {
        match self {
            AnalysisResult::Basic(s) => {
                format!("n={} mean={:.4} sd={:.4}", s.count, s.mean, s.std_dev)
            }
            AnalysisResult::Spectrum(s) => format!(
                "dominant {:.4} Hz (bin {})",
                s.dominant_frequency_hz, s.dominant_bin
            ),
            AnalysisResult::Peaks(p) => format!("{} peaks", p.peaks.len()),
            AnalysisResult::Envelope(e) => format!("envelope w={}", e.window),
            AnalysisResult::Periodicity(p) => {
                if p.detected {
                    format!(
                        "periodic T={:.4}s conf={:.2}",
                        p.periods_s.first().copied().unwrap_or(0.0),
                        p.confidence
                    )
                } else {
                    "aperiodic".to_string()
                }
            }
            AnalysisResult::Trend(t) => {
                format!("{:?} {:?} r2={:.3}", t.trend_type, t.direction, t.r_squared)
            }
            AnalysisResult::Anomaly(a) => format!("{} anomalies", a.anomalies.len()),
            AnalysisResult::Chaos(c) => {
                format!("λ={:.4} {:?}", c.lyapunov_exponent, c.attractor)
            }
            AnalysisResult::Fractal(f) => {
                format!("H={:.3} D={:.3}", f.hurst_exponent, f.box_dimension)
            }
            AnalysisResult::InsufficientData { required, actual } => {
                format!("insufficient data ({}/{})", actual, required)
            }
            AnalysisResult::Unsupported => "unsupported".to_string(),
        }
    }

    /// True for the `InsufficientData` variant.
    pub fn is_insufficient(&self) -> bool {
        matches!(self, AnalysisResult::InsufficientData { .. })
    }
}

/// A produced analysis: result plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    /// Source signal.
    pub signal_id: String,
    pub mode: AnalysisMode,
    /// Wall-clock production time in microseconds.
    pub produced_at_us: u64,
    /// Set when a transient numeric fault forced a safe default somewhere
    /// in the computation.
    pub degraded: bool,
    pub result: AnalysisResult,
}
