//! # Telemetry DSP Core
//!
//! Real-time telemetry processing core that treats every monitored metric
//! as a continuous analog signal subject to digital-signal-processing style
//! analysis.
//!
//! ## Architecture
//!
//! ```text
//! Producer → Sampler → Ring Buffer → Processing Loop
//!                                         │
//!                     ┌───────────────────┼───────────────────┐
//!                     ▼                   ▼                   ▼
//!                DSP Kernel        Pattern Detector    Adaptive Control
//!                     │                   │                   │
//!                     └───────────────────┼───────────────────┘
//!                                         ▼
//!                                     Event Bus → Subscribers
//! ```
//!
//! * **Core**: Primitive types, identifiers, clocks.
//! * **Buffer / Registry / Sampler**: Bounded per-signal history and ingest.
//! * **DSP / Detect**: Pure numeric kernel and the analyses built on it.
//! * **Control / Aggregate**: Adaptive thresholds, scalers, multi-signal fusion.
//! * **Engine / Bus / System**: Periodic driver, pub/sub egress, public facade.

// 1. Core Types (The Vocabulary)
pub mod core;

// 2. Bounded History (The Memory)
pub mod buffer;

// 3. Signal Lifecycle & Ingest
pub mod registry;
pub mod sampler;

// 4. Pure Numerics (The CPU)
pub mod dsp;

// 5. Analyses over Snapshots
pub mod detect;

// 6. Adaptive Threshold / Scaler State Machines
pub mod control;

// 7. Multi-Signal Alignment and Fusion
pub mod aggregate;

// 8. Periodic Cooperative Driver
pub mod engine;

// 9. Topic Pub/Sub Egress
pub mod bus;

// 10. Per-Signal Counters
pub mod metrics;

// 11. Public Facade
pub mod system;

// Re-exports for easier access to root concepts
pub use crate::core::types::{AnalysisMode, Sample, SamplingRate, SignalConfig};
pub use crate::detect::types::{AnalysisRecord, AnalysisResult};
pub use crate::system::TelemetryCore;
pub use uuid::Uuid;
