//! Core vocabulary: primitive types, identifiers, and clocks.

pub mod clock;
pub mod identifiers;
pub mod types;

pub use identifiers::{PipelineId, SubscriptionId};
pub use types::{AnalysisMode, FilterSpec, Sample, SamplingRate, Sensitivity, SignalConfig};
