//! Visitor journeys: raw interaction samples, path aggregation and the
//! frustration/heatmap passes that read them.

pub mod analyzer;
pub mod config;
pub mod frustration;
pub mod heatmap;
pub mod patterns;
pub mod samples;

pub use analyzer::{JourneyAnalyzer, JourneyInsights};
pub use config::JourneyConfig;
pub use frustration::{FrustrationKind, FrustrationSignal};
pub use patterns::{DropOffPoint, JourneyPattern, PATH_SEPARATOR};
pub use samples::{JourneySample, SampleBuffer, SampleKind};
