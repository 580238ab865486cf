//! --------------------------
//! INFORMATION
//! --------------------------
//! Title: Signal Registry
//! Author: Carlos Eduardo Favini
//! Date: 2025-02-11
//! Version: 1.1.0
//! Description: Lifecycle of registered signals. Registration and
//! unregistration are serialized; sample ingest, snapshotting and config
//! reads are safe concurrently. Config is effectively immutable after
//! registration; changes go through reconfigure under exclusive write.
//! Layer: Core
//! Dependencies: dashmap, core, buffer, metrics
//! Affected Components: sampler, engine, system
//!
//! --------------------------
//! CHANGE LOG
//! --------------------------
//! 2025-02-11 - Carlos Eduardo Favini - Initial creation (v1.0.0)
//! 2025-02-25 - Carlos Eduardo Favini - Error flag and lease on entries (v1.1.0)
//! --------------------------

pub mod signal;

use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::core::types::SignalConfig;

pub use signal::{SignalEntry, SignalSummary};

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// The id is already registered.
    AlreadyRegistered(String),
    /// No signal with this id.
    NotFound(String),
    /// The configuration failed validation.
    InvalidConfig(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRegistered(id) => write!(f, "signal '{}' already registered", id),
            Self::NotFound(id) => write!(f, "signal '{}' not found", id),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Concurrent map of registered signals.
///
/// Each signal is exclusively owned by the registry; external code only
/// ever holds `Arc<SignalEntry>` handles whose interior state is guarded
/// by the entry's own locks.
#[derive(Default)]
pub struct SignalRegistry {
    signals: DashMap<String, Arc<SignalEntry>>,
    /// Serializes register/unregister/reconfigure against each other.
    write_lock: Mutex<()>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new signal. Fails without side effects when the id is
    /// taken or the config is invalid.
    pub fn register(
        &self,
        id: &str,
        config: SignalConfig,
    ) -> Result<Arc<SignalEntry>, RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::InvalidConfig("signal id must not be empty".into()));
        }
        config
            .validate()
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.signals.contains_key(id) {
            return Err(RegistryError::AlreadyRegistered(id.to_string()));
        }
        let entry = Arc::new(SignalEntry::new(id.to_string(), config));
        self.signals.insert(id.to_string(), Arc::clone(&entry));
        log::debug!("registered signal '{}'", id);
        Ok(entry)
    }

    /// Registers a derived signal (output of an aggregation pipeline).
    pub fn register_derived(
        &self,
        id: &str,
        config: SignalConfig,
    ) -> Result<Arc<SignalEntry>, RegistryError> {
        let entry = self.register(id, config)?;
        entry.mark_derived();
        Ok(entry)
    }

    /// Removes a signal and atomically releases its state. Idempotent:
    /// a missing id reports `NotFound` but leaves the registry unchanged.
    pub fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        match self.signals.remove(id) {
            Some((_, entry)) => {
                // In-flight analyses notice the entry is no longer current
                // and abandon their results.
                entry.invalidate();
                log::debug!("unregistered signal '{}'", id);
                Ok(())
            }
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    /// Replaces a signal's configuration under exclusive write. The
    /// buffer is resized in place; history within the new capacity is
    /// kept. Clears the error flag.
    pub fn reconfigure(&self, id: &str, config: SignalConfig) -> Result<(), RegistryError> {
        config
            .validate()
            .map_err(|e| RegistryError::InvalidConfig(e.to_string()))?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let entry = self
            .signals
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        entry.replace_config(config);
        Ok(())
    }

    /// Handle for sampling, snapshotting and cache reads.
    pub fn get(&self, id: &str) -> Option<Arc<SignalEntry>> {
        self.signals.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.signals.contains_key(id)
    }

    /// True while `entry` is the registry's current entry for its id.
    /// In-flight work re-checks this before publishing.
    pub fn is_current(&self, entry: &Arc<SignalEntry>) -> bool {
        self.signals
            .get(entry.id())
            .map(|current| Arc::ptr_eq(current.value(), entry))
            .unwrap_or(false)
    }

    /// Ids and summaries of every registered signal.
    pub fn list(&self) -> Vec<SignalSummary> {
        self.signals.iter().map(|e| e.value().summary()).collect()
    }

    /// Snapshot of the current entry handles, for loop iteration.
    pub fn entries(&self) -> Vec<Arc<SignalEntry>> {
        self.signals.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
