pub mod algorithm;
pub mod config;
pub mod rules;
pub mod scoring;

pub use algorithm::{MatchedSegment, SegmentationEngine};
pub use config::ScoringConfig;
pub use rules::{Criterion, SegmentRule};
