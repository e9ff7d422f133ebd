//! Rule-driven recommendations over a combined performance / journey /
//! segmentation snapshot.

pub mod framework;
pub mod rules;
pub mod snapshot;

pub use framework::{spawn_periodic_analysis, OptimizationFramework, Recommendation};
pub use rules::{default_rules, load_rules, Condition, RecommendationRule};
pub use snapshot::{JourneySummary, OptimizationSnapshot, PerformanceSummary, SegmentationSummary};
