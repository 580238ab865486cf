use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// --- LEVEL 0: RAW EVIDENCE SHAPE ---

/// One measurement on a signal.
///
/// It is a data container, not a historical record: history lives in the
/// ring buffer that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Measured value.
    pub value: f64,

    /// Monotonic timestamp in microseconds. Nondecreasing per signal.
    pub timestamp_us: u64,

    /// Opaque per-sample annotations. The core never interprets these.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Sample {
    pub fn new(value: f64, timestamp_us: u64) -> Self {
        Self {
            value,
            timestamp_us,
            metadata: None,
        }
    }

    pub fn with_metadata(
        value: f64,
        timestamp_us: u64,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            value,
            timestamp_us,
            metadata: Some(metadata),
        }
    }
}

// --- SIGNAL CONFIGURATION ---

/// Advisory sampling-rate class. Used for filter design and window sizing,
/// never enforced at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingRate {
    /// ≈ 100 Hz
    High,
    /// ≈ 10 Hz
    Standard,
    /// ≈ 1 Hz
    Low,
}

impl SamplingRate {
    /// Nominal rate in Hz for window sizing when no timestamps are available.
    pub fn nominal_hz(&self) -> f64 {
        match self {
            SamplingRate::High => 100.0,
            SamplingRate::Standard => 10.0,
            SamplingRate::Low => 1.0,
        }
    }
}

/// Filter specification applied at analysis time (never at ingest).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterSpec {
    MovingAverage { window: usize },
    LowPass { cutoff_hz: f64 },
    HighPass { cutoff_hz: f64 },
    BandPass { low_hz: f64, high_hz: f64 },
    Butterworth { order: usize, cutoff: f64 },
    Kalman { process_noise: f64, measurement_noise: f64 },
    Lms { taps: usize, learning_rate: f64 },
}

impl FilterSpec {
    /// Validates parameters. Invalid parameters fail the configuring
    /// operation; no partial registration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            FilterSpec::MovingAverage { window } => {
                if *window == 0 {
                    return Err(ConfigError::InvalidFilter(
                        "moving average window must be positive".into(),
                    ));
                }
            }
            FilterSpec::LowPass { cutoff_hz } | FilterSpec::HighPass { cutoff_hz } => {
                if !cutoff_hz.is_finite() || *cutoff_hz <= 0.0 {
                    return Err(ConfigError::InvalidFilter(
                        "cutoff frequency must be positive and finite".into(),
                    ));
                }
            }
            FilterSpec::BandPass { low_hz, high_hz } => {
                if !low_hz.is_finite() || !high_hz.is_finite() || *low_hz <= 0.0 || high_hz <= low_hz
                {
                    return Err(ConfigError::InvalidFilter(
                        "band-pass requires 0 < low < high".into(),
                    ));
                }
            }
            FilterSpec::Butterworth { order, cutoff } => {
                if *order == 0 || *order > 4 {
                    return Err(ConfigError::InvalidFilter(
                        "butterworth order must be in 1..=4".into(),
                    ));
                }
                if !cutoff.is_finite() || *cutoff <= 0.0 || *cutoff >= 1.0 {
                    return Err(ConfigError::InvalidFilter(
                        "butterworth normalized cutoff must be in (0, 1)".into(),
                    ));
                }
            }
            FilterSpec::Kalman {
                process_noise,
                measurement_noise,
            } => {
                if *process_noise <= 0.0 || *measurement_noise <= 0.0 {
                    return Err(ConfigError::InvalidFilter(
                        "kalman noise terms must be positive".into(),
                    ));
                }
            }
            FilterSpec::Lms {
                taps,
                learning_rate,
            } => {
                if *taps == 0 {
                    return Err(ConfigError::InvalidFilter("lms needs at least one tap".into()));
                }
                if !learning_rate.is_finite() || *learning_rate <= 0.0 {
                    return Err(ConfigError::InvalidFilter(
                        "lms learning rate must be positive".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Named family of computations producing a typed analysis result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Basic,
    Spectrum,
    Peaks,
    Envelope,
    Periodicity,
    Trend,
    Anomaly,
    Chaos,
    Fractal,
}

impl AnalysisMode {
    /// Stable lowercase name, used in event topics.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Basic => "basic",
            AnalysisMode::Spectrum => "spectrum",
            AnalysisMode::Peaks => "peaks",
            AnalysisMode::Envelope => "envelope",
            AnalysisMode::Periodicity => "periodicity",
            AnalysisMode::Trend => "trend",
            AnalysisMode::Anomaly => "anomaly",
            AnalysisMode::Chaos => "chaos",
            AnalysisMode::Fractal => "fractal",
        }
    }

    pub fn all() -> [AnalysisMode; 9] {
        [
            AnalysisMode::Basic,
            AnalysisMode::Spectrum,
            AnalysisMode::Peaks,
            AnalysisMode::Envelope,
            AnalysisMode::Periodicity,
            AnalysisMode::Trend,
            AnalysisMode::Anomaly,
            AnalysisMode::Chaos,
            AnalysisMode::Fractal,
        ]
    }
}

/// Anomaly detection sensitivity. Selects the z-score gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// |z| > 2
    High,
    /// |z| > 3
    Normal,
    /// |z| > 4
    Low,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Sensitivity::Normal
    }
}

impl Sensitivity {
    pub fn z_threshold(&self) -> f64 {
        match self {
            Sensitivity::High => 2.0,
            Sensitivity::Normal => 3.0,
            Sensitivity::Low => 4.0,
        }
    }

    /// Derivative gate multiplier for pattern anomalies.
    pub fn derivative_factor(&self) -> f64 {
        match self {
            Sensitivity::High => 2.0,
            Sensitivity::Normal => 3.0,
            Sensitivity::Low => 5.0,
        }
    }
}

/// Default bounded history per signal.
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;

/// Static configuration of a registered signal.
///
/// Effectively immutable post-registration; changes go through
/// `reconfigure`, which is an exclusive write on the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    /// Advisory rate class for filter design and window sizing.
    pub sampling_rate_hint: SamplingRate,

    /// Ring buffer capacity. The buffer holds exactly this many most-recent
    /// samples.
    pub buffer_capacity: usize,

    /// Ordered filters applied at analysis time.
    pub filters: Vec<FilterSpec>,

    /// Enabled analyses, run by the processing loop each tick.
    pub analysis_modes: BTreeSet<AnalysisMode>,

    /// Anomaly sensitivity for the anomaly analysis mode.
    pub sensitivity: Sensitivity,

    /// Static descriptive mapping. Never interpreted by the core.
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hint: SamplingRate::Standard,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            filters: Vec::new(),
            analysis_modes: BTreeSet::new(),
            sensitivity: Sensitivity::Normal,
            metadata: HashMap::new(),
        }
    }
}

impl SignalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_rate(mut self, rate: SamplingRate) -> Self {
        self.sampling_rate_hint = rate;
        self
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.analysis_modes.insert(mode);
        self
    }

    pub fn with_modes(mut self, modes: impl IntoIterator<Item = AnalysisMode>) -> Self {
        self.analysis_modes.extend(modes);
        self
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: Sensitivity) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Validates the whole configuration. Fails without side effects.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        for filter in &self.filters {
            filter.validate()?;
        }
        Ok(())
    }
}

/// Configuration errors. Fail the configuring operation; no partial state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Signal id must be a non-empty string.
    EmptyId,
    /// Buffer capacity must be positive.
    ZeroCapacity,
    /// A filter specification carries invalid parameters.
    InvalidFilter(String),
    /// A numeric range is inverted or non-finite.
    InvalidRange(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "signal id must not be empty"),
            Self::ZeroCapacity => write!(f, "buffer capacity must be positive"),
            Self::InvalidFilter(msg) => write!(f, "invalid filter: {}", msg),
            Self::InvalidRange(msg) => write!(f, "invalid range: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SignalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = SignalConfig::new().with_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_bad_filter_rejected() {
        let config = SignalConfig::new().with_filter(FilterSpec::LowPass { cutoff_hz: -1.0 });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_butterworth_order_bounds() {
        assert!(FilterSpec::Butterworth {
            order: 4,
            cutoff: 0.2
        }
        .validate()
        .is_ok());
        assert!(FilterSpec::Butterworth {
            order: 5,
            cutoff: 0.2
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_sensitivity_thresholds() {
        assert_eq!(Sensitivity::High.z_threshold(), 2.0);
        assert_eq!(Sensitivity::Normal.z_threshold(), 3.0);
        assert_eq!(Sensitivity::Low.z_threshold(), 4.0);
    }

    #[test]
    fn test_mode_names_are_stable() {
        for mode in AnalysisMode::all() {
            assert!(!mode.as_str().is_empty());
        }
    }
}
