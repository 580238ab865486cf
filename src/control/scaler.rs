//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Auto-Scaler
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-16
//! Version: 1.0.0
//! Description: Per-signal affine output scaling with adaptive range
//! tracking (dynamic range, histogram, normalization, robust) and an
//! outlier policy against the output range.
//! Layer: Core
//! Dependencies: dsp/statistics
//! Affected Components: engine, system
//!
//! --------------------------
//! MATHEMATICAL BASIS
//! --------------------------
//! scaled = (value − offset)·scale. Each adaptation mode re-derives the
//! (scale, offset) pair so its reference span maps onto the output range:
//! observed min/max, µ±3σ, the 5th–95th percentile band, or median±IQR.
//! New targets blend in with exponential smoothing at adaptation_speed.
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-16 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! --------------------------

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::dsp::statistics::{percentile, RunningStats};

use super::ControlError;

/// Scaling adaptation families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerMode {
    DynamicRange,
    Histogram,
    Normalization,
    Robust,
}

/// What happens to a scaled value that leaves the output range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierPolicy {
    /// Clamp to the range edge.
    Clip,
    /// Soft-squash the overshoot into a small headroom band.
    Compress,
    /// Drop the value.
    Reject,
}

/// Auto-scaler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerConfig {
    pub mode: ScalerMode,
    /// Expected raw input span, used before adaptation has evidence.
    pub input_range: (f64, f64),
    /// Target output span.
    pub output_range: (f64, f64),
    /// Exponential smoothing factor for adapted scale/offset, in (0, 1].
    pub adaptation_speed: f64,
    pub outlier_policy: OutlierPolicy,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            mode: ScalerMode::DynamicRange,
            input_range: (0.0, 1.0),
            output_range: (0.0, 1.0),
            adaptation_speed: 0.2,
            outlier_policy: OutlierPolicy::Clip,
        }
    }
}

impl ScalerConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.input_range.0 >= self.input_range.1 {
            return Err(ControlError::InvalidConfig(
                "input range must be ascending".into(),
            ));
        }
        if self.output_range.0 >= self.output_range.1 {
            return Err(ControlError::InvalidConfig(
                "output range must be ascending".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.adaptation_speed) || self.adaptation_speed == 0.0 {
            return Err(ControlError::InvalidConfig(
                "adaptation speed must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of scaling one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScaleOutcome {
    /// In range, passed through.
    Scaled { value: f64 },
    /// Out of range, clamped to the edge.
    Clipped { value: f64 },
    /// Out of range, softly compressed near the edge.
    Compressed { value: f64 },
    /// Out of range, dropped by policy.
    Rejected { raw: f64 },
}

impl ScaleOutcome {
    /// The output value, when one was produced.
    pub fn value(&self) -> Option<f64> {
        match self {
            ScaleOutcome::Scaled { value }
            | ScaleOutcome::Clipped { value }
            | ScaleOutcome::Compressed { value } => Some(*value),
            ScaleOutcome::Rejected { .. } => None,
        }
    }
}

/// Bound on the robust-mode evidence buffer.
const ROBUST_BUFFER: usize = 1000;

/// Compress headroom as a fraction of the output width.
const COMPRESS_HEADROOM: f64 = 0.05;

/// Per-signal auto-scaler.
#[derive(Debug)]
pub struct AutoScaler {
    config: ScalerConfig,
    scale: f64,
    offset: f64,
    stats: RunningStats,
    observed_min: f64,
    observed_max: f64,
    recent: VecDeque<f64>,
}

impl AutoScaler {
    pub fn new(config: ScalerConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let (in_min, in_max) = config.input_range;
        let (out_min, out_max) = config.output_range;
        // Seed the affine map from the configured input range.
        let scale = (out_max - out_min) / (in_max - in_min);
        let offset = in_min - out_min / scale;
        Ok(Self {
            config,
            scale,
            offset,
            stats: RunningStats::new(),
            observed_min: f64::INFINITY,
            observed_max: f64::NEG_INFINITY,
            recent: VecDeque::new(),
        })
    }

    /// Applies the affine map and the outlier policy.
    pub fn apply_scaling(&mut self, value: f64) -> ScaleOutcome {
        let scaled = (value - self.offset) * self.scale;
        let (out_min, out_max) = self.config.output_range;

        if scaled >= out_min && scaled <= out_max {
            return ScaleOutcome::Scaled { value: scaled };
        }

        match self.config.outlier_policy {
            OutlierPolicy::Clip => ScaleOutcome::Clipped {
                value: scaled.clamp(out_min, out_max),
            },
            OutlierPolicy::Compress => {
                let headroom = COMPRESS_HEADROOM * (out_max - out_min);
                let value = if scaled > out_max {
                    out_max + headroom * ((scaled - out_max) / headroom).tanh()
                } else {
                    out_min - headroom * ((out_min - scaled) / headroom).tanh()
                };
                ScaleOutcome::Compressed { value }
            }
            OutlierPolicy::Reject => ScaleOutcome::Rejected { raw: value },
        }
    }

    /// Folds feedback into the mode's evidence and re-derives the affine
    /// map with exponential smoothing.
    pub fn update_adaptation(&mut self, feedback: f64) {
        self.stats.push(feedback);
        self.observed_min = self.observed_min.min(feedback);
        self.observed_max = self.observed_max.max(feedback);
        if self.recent.len() == ROBUST_BUFFER {
            self.recent.pop_front();
        }
        self.recent.push_back(feedback);

        let target = match self.config.mode {
            ScalerMode::DynamicRange => {
                let span = (self.observed_max - self.observed_min).max(f64::EPSILON);
                Some((self.observed_min, span))
            }
            ScalerMode::Normalization => {
                if self.stats.count() < 2 {
                    None
                } else {
                    let mu = self.stats.mean();
                    let sigma = self.stats.std_dev().max(f64::EPSILON);
                    Some((mu - 3.0 * sigma, 6.0 * sigma))
                }
            }
            ScalerMode::Histogram => {
                if self.recent.len() < 10 {
                    None
                } else {
                    let values: Vec<f64> = self.recent.iter().copied().collect();
                    let lo = percentile(&values, 5.0);
                    let hi = percentile(&values, 95.0);
                    Some((lo, (hi - lo).max(f64::EPSILON)))
                }
            }
            ScalerMode::Robust => {
                if self.recent.len() < 10 {
                    None
                } else {
                    let values: Vec<f64> = self.recent.iter().copied().collect();
                    let med = percentile(&values, 50.0);
                    let iqr = percentile(&values, 75.0) - percentile(&values, 25.0);
                    Some((med - iqr, (2.0 * iqr).max(f64::EPSILON)))
                }
            }
        };

        let (ref_min, ref_span) = match target {
            Some(t) => t,
            None => return,
        };

        let (out_min, out_max) = self.config.output_range;
        let target_scale = (out_max - out_min) / ref_span;
        let target_offset = ref_min - out_min / target_scale;

        let alpha = self.config.adaptation_speed;
        self.scale = (1.0 - alpha) * self.scale + alpha * target_scale;
        self.offset = (1.0 - alpha) * self.offset + alpha * target_offset;
    }

    pub fn current_scale(&self) -> f64 {
        self.scale
    }

    pub fn current_offset(&self) -> f64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: ScalerMode, policy: OutlierPolicy) -> ScalerConfig {
        ScalerConfig {
            mode,
            input_range: (0.0, 10.0),
            output_range: (0.0, 1.0),
            adaptation_speed: 0.5,
            outlier_policy: policy,
        }
    }

    #[test]
    fn test_seed_map_from_input_range() {
        let mut scaler =
            AutoScaler::new(config(ScalerMode::DynamicRange, OutlierPolicy::Clip)).unwrap();
        assert_eq!(scaler.apply_scaling(0.0), ScaleOutcome::Scaled { value: 0.0 });
        assert_eq!(scaler.apply_scaling(10.0), ScaleOutcome::Scaled { value: 1.0 });
        match scaler.apply_scaling(5.0) {
            ScaleOutcome::Scaled { value } => assert!((value - 0.5).abs() < 1e-12),
            other => panic!("expected scaled, got {:?}", other),
        }
    }

    #[test]
    fn test_clip_policy() {
        let mut scaler =
            AutoScaler::new(config(ScalerMode::DynamicRange, OutlierPolicy::Clip)).unwrap();
        assert_eq!(scaler.apply_scaling(20.0), ScaleOutcome::Clipped { value: 1.0 });
        assert_eq!(scaler.apply_scaling(-5.0), ScaleOutcome::Clipped { value: 0.0 });
    }

    #[test]
    fn test_compress_policy_stays_near_edge() {
        let mut scaler =
            AutoScaler::new(config(ScalerMode::DynamicRange, OutlierPolicy::Compress)).unwrap();
        match scaler.apply_scaling(100.0) {
            ScaleOutcome::Compressed { value } => {
                assert!(value > 1.0 && value <= 1.0 + 0.05 + 1e-12, "value {}", value);
            }
            other => panic!("expected compressed, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_policy() {
        let mut scaler =
            AutoScaler::new(config(ScalerMode::DynamicRange, OutlierPolicy::Reject)).unwrap();
        let out = scaler.apply_scaling(50.0);
        assert_eq!(out, ScaleOutcome::Rejected { raw: 50.0 });
        assert!(out.value().is_none());
    }

    #[test]
    fn test_dynamic_range_adapts_to_observed_span() {
        let mut scaler =
            AutoScaler::new(config(ScalerMode::DynamicRange, OutlierPolicy::Clip)).unwrap();
        // Observed span is 100..200, far from the configured 0..10.
        for i in 0..200 {
            scaler.update_adaptation(100.0 + (i % 101) as f64);
        }
        // After smoothing converges, 150 should land mid-range.
        let mid = scaler.apply_scaling(150.0).value().unwrap();
        assert!((mid - 0.5).abs() < 0.05, "mid {}", mid);
    }

    #[test]
    fn test_normalization_centers_mean() {
        let mut scaler =
            AutoScaler::new(config(ScalerMode::Normalization, OutlierPolicy::Clip)).unwrap();
        for i in 0..500 {
            // Mean 50, spread ±5.
            scaler.update_adaptation(50.0 + ((i % 11) as f64 - 5.0));
        }
        let center = scaler.apply_scaling(50.0).value().unwrap();
        assert!((center - 0.5).abs() < 0.05, "center {}", center);
    }

    #[test]
    fn test_robust_mode_ignores_rare_outliers() {
        let mut robust =
            AutoScaler::new(config(ScalerMode::Robust, OutlierPolicy::Clip)).unwrap();
        let mut dynamic =
            AutoScaler::new(config(ScalerMode::DynamicRange, OutlierPolicy::Clip)).unwrap();
        for i in 0..300 {
            let v = if i == 150 { 1000.0 } else { 10.0 + (i % 21) as f64 };
            robust.update_adaptation(v);
            dynamic.update_adaptation(v);
        }
        // The dynamic-range scaler's span exploded to ~1000; the robust
        // scaler's span stayed near the IQR of the bulk.
        assert!(robust.current_scale() > dynamic.current_scale() * 5.0);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let bad = ScalerConfig {
            input_range: (5.0, 1.0),
            ..ScalerConfig::default()
        };
        assert!(AutoScaler::new(bad).is_err());

        let bad = ScalerConfig {
            adaptation_speed: 0.0,
            ..ScalerConfig::default()
        };
        assert!(AutoScaler::new(bad).is_err());
    }
}
