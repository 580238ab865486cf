//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Adaptive Threshold Controller
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-16
//! Version: 1.1.0
//! Description: Per-signal threshold state machine with hysteresis and
//! dead band, plus pluggable adaptation strategies (statistical,
//! percentile, entropy, gradient, fuzzy).
//! Layer: Core
//! Dependencies: dsp/statistics
//! Affected Components: engine, system
//!
//! --------------------------
//! STATE MACHINE
//! --------------------------
//! |value − T| < dead_band        → DeadBand
//! value > T + hysteresis         → TriggeredAbove
//! value < T − hysteresis         → TriggeredBelow
//! otherwise                      → Normal
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-16 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-27 - Carlos Eduardo Favini - Strategy trait over enum dispatch (v1.1.0)
//! --------------------------

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::dsp::statistics::{percentile, RunningStats};

use super::ControlError;

/// Outcome state of one control evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    DeadBand,
    TriggeredAbove,
    TriggeredBelow,
    Normal,
}

/// Tagged outcome of `apply_control`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlOutcome {
    pub state: ControlState,
    /// The evaluated value.
    pub value: f64,
    /// Signed distance from the threshold (value − T).
    pub direction: f64,
    /// Threshold at evaluation time.
    pub threshold: f64,
}

/// Adaptation strategy families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdStrategyKind {
    Statistical,
    Percentile,
    Entropy,
    Gradient,
    Fuzzy,
}

/// Threshold controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub strategy: ThresholdStrategyKind,
    pub initial_threshold: f64,
    /// Adaptation aggressiveness; strategy-specific meaning.
    pub adaptation_rate: f64,
    /// Gap beyond the threshold that must be crossed to trigger.
    pub hysteresis: f64,
    /// Neutral zone around the threshold where nothing is emitted.
    pub dead_band: f64,
    /// Hard floor for the adapted threshold.
    pub min_threshold: f64,
    /// Hard ceiling for the adapted threshold.
    pub max_threshold: f64,
    /// Percentile used by the percentile strategy.
    pub percentile: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            strategy: ThresholdStrategyKind::Statistical,
            initial_threshold: 0.0,
            adaptation_rate: 0.1,
            hysteresis: 0.2,
            dead_band: 0.05,
            min_threshold: f64::NEG_INFINITY,
            max_threshold: f64::INFINITY,
            percentile: 95.0,
        }
    }
}

impl ThresholdConfig {
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.hysteresis < 0.0 || self.dead_band < 0.0 {
            return Err(ControlError::InvalidConfig(
                "hysteresis and dead band must be non-negative".into(),
            ));
        }
        if self.min_threshold > self.max_threshold {
            return Err(ControlError::InvalidConfig(
                "min threshold above max threshold".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.percentile) {
            return Err(ControlError::InvalidConfig(
                "percentile must be in 0..=100".into(),
            ));
        }
        if !self.adaptation_rate.is_finite() || self.adaptation_rate < 0.0 {
            return Err(ControlError::InvalidConfig(
                "adaptation rate must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Minimal strategy interface: fold feedback, propose a new threshold.
trait ThresholdStrategy: Send + std::fmt::Debug {
    fn propose(&mut self, feedback: f64, current: f64, rate: f64) -> f64;
}

/// µ + k·σ with k widened when the stream is unstable.
#[derive(Debug, Default)]
struct StatisticalStrategy {
    stats: RunningStats,
}

impl ThresholdStrategy for StatisticalStrategy {
    fn propose(&mut self, feedback: f64, _current: f64, rate: f64) -> f64 {
        self.stats.push(feedback);
        let variance = self.stats.variance();
        let stability = 1.0 / (1.0 + variance);
        let k = 2.0 * (1.0 + rate * (1.0 - stability));
        self.stats.mean() + k * self.stats.std_dev()
    }
}

/// p-th percentile of a bounded recent-sample list.
#[derive(Debug)]
struct PercentileStrategy {
    samples: VecDeque<f64>,
    cap: usize,
    percentile: f64,
}

impl PercentileStrategy {
    fn new(p: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            cap: 1000,
            percentile: p,
        }
    }
}

impl ThresholdStrategy for PercentileStrategy {
    fn propose(&mut self, feedback: f64, _current: f64, _rate: f64) -> f64 {
        if self.samples.len() == self.cap {
            self.samples.pop_front();
        }
        self.samples.push_back(feedback);
        let values: Vec<f64> = self.samples.iter().copied().collect();
        percentile(&values, self.percentile)
    }
}

/// µ + σ·(1 + H/ln 2) over a 10-bin discretization of recent values.
#[derive(Debug)]
struct EntropyStrategy {
    window: VecDeque<f64>,
}

impl EntropyStrategy {
    const WINDOW: usize = 100;
    const BINS: usize = 10;
}

impl ThresholdStrategy for EntropyStrategy {
    fn propose(&mut self, feedback: f64, current: f64, _rate: f64) -> f64 {
        if self.window.len() == Self::WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(feedback);
        if self.window.len() < 2 {
            return current;
        }

        let values: Vec<f64> = self.window.iter().copied().collect();
        let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let mu = crate::dsp::statistics::mean(&values);
        let sigma = crate::dsp::statistics::std_dev(&values);
        if range < f64::EPSILON {
            return mu;
        }

        let mut counts = [0usize; Self::BINS];
        for &v in &values {
            let bin = (((v - min) / range) * Self::BINS as f64) as usize;
            counts[bin.min(Self::BINS - 1)] += 1;
        }
        let n = values.len() as f64;
        let entropy: f64 = counts
            .iter()
            .filter(|&&c| c > 0)
            .map(|&c| {
                let p = c as f64 / n;
                -p * p.ln()
            })
            .sum();

        mu + sigma * (1.0 + entropy / std::f64::consts::LN_2)
    }
}

/// Blends the current threshold toward a slope-projected target.
#[derive(Debug)]
struct GradientStrategy {
    recent: VecDeque<f64>,
}

impl GradientStrategy {
    const WINDOW: usize = 50;
}

impl ThresholdStrategy for GradientStrategy {
    fn propose(&mut self, feedback: f64, current: f64, rate: f64) -> f64 {
        if self.recent.len() == Self::WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(feedback);
        let n = self.recent.len();
        if n < 2 {
            return current;
        }

        // Least-squares slope over the recent window.
        let mean_x = (n - 1) as f64 / 2.0;
        let mean_y = self.recent.iter().sum::<f64>() / n as f64;
        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (i, &y) in self.recent.iter().enumerate() {
            let dx = i as f64 - mean_x;
            sxx += dx * dx;
            sxy += dx * (y - mean_y);
        }
        let slope = if sxx < f64::EPSILON { 0.0 } else { sxy / sxx };

        0.8 * current + 0.2 * (current + slope * rate)
    }
}

/// Rule-based additive nudges from the error and its rate of change.
#[derive(Debug, Default)]
struct FuzzyStrategy {
    last_feedback: Option<f64>,
}

impl ThresholdStrategy for FuzzyStrategy {
    fn propose(&mut self, feedback: f64, current: f64, rate: f64) -> f64 {
        let error = feedback - current;
        let change = self
            .last_feedback
            .map(|last| feedback - last)
            .unwrap_or(0.0);
        self.last_feedback = Some(feedback);

        // Large error pulls the threshold toward the feedback; a fast
        // rate of change adds a smaller anticipatory nudge.
        let mut adjustment = 0.0;
        if error.abs() > f64::EPSILON {
            adjustment += rate * 0.6 * error;
        }
        if change.abs() > f64::EPSILON {
            adjustment += rate * 0.2 * change;
        }
        current + adjustment
    }
}

fn build_strategy(config: &ThresholdConfig) -> Box<dyn ThresholdStrategy> {
    match config.strategy {
        ThresholdStrategyKind::Statistical => Box::<StatisticalStrategy>::default(),
        ThresholdStrategyKind::Percentile => Box::new(PercentileStrategy::new(config.percentile)),
        ThresholdStrategyKind::Entropy => Box::new(EntropyStrategy {
            window: VecDeque::new(),
        }),
        ThresholdStrategyKind::Gradient => Box::new(GradientStrategy {
            recent: VecDeque::new(),
        }),
        ThresholdStrategyKind::Fuzzy => Box::<FuzzyStrategy>::default(),
    }
}

/// Per-signal adaptive threshold state machine.
#[derive(Debug)]
pub struct ThresholdController {
    config: ThresholdConfig,
    current: f64,
    strategy: Box<dyn ThresholdStrategy>,
    /// Running statistics over every control evaluation.
    stats: RunningStats,
}

impl ThresholdController {
    pub fn new(config: ThresholdConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let strategy = build_strategy(&config);
        Ok(Self {
            current: config.initial_threshold,
            config,
            strategy,
            stats: RunningStats::new(),
        })
    }

    /// Classifies a value against the current threshold. The dead band is
    /// checked first so the neutral zone wins over the trigger bands.
    pub fn apply_control(&mut self, value: f64) -> ControlOutcome {
        self.stats.push(value);
        let t = self.current;
        let direction = value - t;

        let state = if direction.abs() < self.config.dead_band {
            ControlState::DeadBand
        } else if value > t + self.config.hysteresis {
            ControlState::TriggeredAbove
        } else if value < t - self.config.hysteresis {
            ControlState::TriggeredBelow
        } else {
            ControlState::Normal
        };

        ControlOutcome {
            state,
            value,
            direction,
            threshold: t,
        }
    }

    /// Applies the configured adaptation strategy and clamps the result
    /// to the controller's constraints.
    pub fn update_adaptation(&mut self, feedback: f64) -> f64 {
        let proposed = self
            .strategy
            .propose(feedback, self.current, self.config.adaptation_rate);
        self.current = proposed.clamp(self.config.min_threshold, self.config.max_threshold);
        self.current
    }

    pub fn current_threshold(&self) -> f64 {
        self.current
    }

    pub fn strategy_kind(&self) -> ThresholdStrategyKind {
        self.config.strategy
    }

    /// Statistics over every value seen by `apply_control`.
    pub fn observed(&self) -> &RunningStats {
        &self.stats
    }
}
