use std::time::Duration;

use crate::journey::JourneyConfig;
use crate::segmentation::ScoringConfig;

/// Tunables for the in-page analytics layer.
#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// How many times to check for the collector before falling back
    pub backend_poll_attempts: u32,
    pub backend_poll_interval: Duration,

    /// Segment / conversion-probability decay pass
    pub reevaluation_interval: Duration,
    pub optimization_interval: Duration,

    /// Lead-score thresholds that emit `conversion_milestone` when crossed upward
    pub lead_milestones: Vec<u8>,

    pub journey: JourneyConfig,
    pub scoring: ScoringConfig,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            backend_poll_attempts: 20,
            backend_poll_interval: Duration::from_millis(100),
            reevaluation_interval: Duration::from_secs(30),
            optimization_interval: Duration::from_secs(30 * 60),
            lead_milestones: vec![25, 50, 75],
            journey: JourneyConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}
