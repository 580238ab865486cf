//! Adaptive per-signal control: threshold state machines and auto-scalers.
//!
//! Controllers are owned by the [`ControllerBank`], keyed by signal id,
//! and mutated only under that signal's serialized execution context.

pub mod scaler;
pub mod threshold;

use std::collections::HashMap;
use std::sync::Mutex;

pub use scaler::{AutoScaler, OutlierPolicy, ScaleOutcome, ScalerConfig, ScalerMode};
pub use threshold::{
    ControlOutcome, ControlState, ThresholdConfig, ThresholdController, ThresholdStrategyKind,
};

/// Errors from control operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    /// No controller/scaler exists for the signal.
    NoController(String),
    /// The signal itself is not registered.
    UnknownSignal(String),
    /// Configuration rejected.
    InvalidConfig(String),
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoController(id) => write!(f, "no controller for signal '{}'", id),
            Self::UnknownSignal(id) => write!(f, "unknown signal '{}'", id),
            Self::InvalidConfig(msg) => write!(f, "invalid control config: {}", msg),
        }
    }
}

impl std::error::Error for ControlError {}

/// Owns every threshold controller and auto-scaler, keyed by signal id.
///
/// All mutation happens through the bank under its lock; callers never
/// hold controller references across calls.
#[derive(Default)]
pub struct ControllerBank {
    thresholds: Mutex<HashMap<String, ThresholdController>>,
    scalers: Mutex<HashMap<String, AutoScaler>>,
}

impl ControllerBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or replaces) a threshold controller for a signal.
    pub fn create_threshold(&self, id: &str, config: ThresholdConfig) -> Result<(), ControlError> {
        let controller = ThresholdController::new(config)?;
        self.thresholds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), controller);
        Ok(())
    }

    /// Installs (or replaces) an auto-scaler for a signal.
    pub fn create_scaler(&self, id: &str, config: ScalerConfig) -> Result<(), ControlError> {
        let scaler = AutoScaler::new(config)?;
        self.scalers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), scaler);
        Ok(())
    }

    /// Classifies a value against the signal's threshold.
    pub fn apply_control(&self, id: &str, value: f64) -> Result<ControlOutcome, ControlError> {
        let mut guard = self.thresholds.lock().unwrap_or_else(|e| e.into_inner());
        let controller = guard
            .get_mut(id)
            .ok_or_else(|| ControlError::NoController(id.to_string()))?;
        Ok(controller.apply_control(value))
    }

    /// Feeds adaptation feedback to both the threshold controller and the
    /// scaler of a signal, whichever exist. Errors only when neither does.
    pub fn update_adaptation(&self, id: &str, feedback: f64) -> Result<(), ControlError> {
        let mut any = false;
        {
            let mut guard = self.thresholds.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(controller) = guard.get_mut(id) {
                controller.update_adaptation(feedback);
                any = true;
            }
        }
        {
            let mut guard = self.scalers.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(scaler) = guard.get_mut(id) {
                scaler.update_adaptation(feedback);
                any = true;
            }
        }
        if any {
            Ok(())
        } else {
            Err(ControlError::NoController(id.to_string()))
        }
    }

    /// Scales a value through the signal's auto-scaler.
    pub fn apply_scaling(&self, id: &str, value: f64) -> Result<ScaleOutcome, ControlError> {
        let mut guard = self.scalers.lock().unwrap_or_else(|e| e.into_inner());
        let scaler = guard
            .get_mut(id)
            .ok_or_else(|| ControlError::NoController(id.to_string()))?;
        Ok(scaler.apply_scaling(value))
    }

    /// Current threshold of a signal's controller, if one exists.
    pub fn current_threshold(&self, id: &str) -> Option<f64> {
        self.thresholds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .map(|c| c.current_threshold())
    }

    /// True when the signal has a threshold controller installed.
    pub fn has_threshold(&self, id: &str) -> bool {
        self.thresholds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(id)
    }

    /// Destroys all control state for a signal. Idempotent; called on
    /// unregister.
    pub fn remove(&self, id: &str) {
        self.thresholds
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        self.scalers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bank_lifecycle() {
        let bank = ControllerBank::new();
        assert!(bank.apply_control("s", 1.0).is_err());

        bank.create_threshold("s", ThresholdConfig::default()).unwrap();
        assert!(bank.apply_control("s", 1.0).is_ok());
        assert!(bank.has_threshold("s"));

        bank.remove("s");
        assert!(bank.apply_control("s", 1.0).is_err());
        // Idempotent removal.
        bank.remove("s");
    }

    #[test]
    fn test_update_without_any_controller_errors() {
        let bank = ControllerBank::new();
        assert_eq!(
            bank.update_adaptation("ghost", 1.0),
            Err(ControlError::NoController("ghost".to_string()))
        );
    }
}
