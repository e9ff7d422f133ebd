//! A/B experiments: sticky weighted assignment, per-variant counters and
//! the lift comparison run once an experiment has enough visitors.

pub mod analysis;
pub mod framework;
pub mod types;

pub use framework::ExperimentFramework;
pub use types::{
    ConfidenceTier, EventKind, Experiment, ExperimentOutcome, ExperimentStatus, MetricWinner,
    Variation, VariantResults,
};
