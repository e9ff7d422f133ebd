use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::journey::{FrustrationKind, JourneyInsights};
use crate::models::UserProfile;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    /// Core Web Vitals keyed by short name (`lcp`, `cls`, ...)
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Bundle sizes in KB keyed by asset class
    #[serde(default)]
    pub bundle: BTreeMap<String, f64>,
    /// Lighthouse category scores, 0..=100
    #[serde(default)]
    pub lighthouse: BTreeMap<String, f64>,
    #[serde(default)]
    pub violations: usize,
    #[serde(default)]
    pub regressions: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JourneySummary {
    pub top_path: Option<String>,
    pub max_drop_off_rate: f64,
    pub drop_off_points: Vec<String>,
    pub rage_clicks: u64,
    pub rapid_scrolls: u64,
    pub form_abandonments: u64,
}

impl From<&JourneyInsights> for JourneySummary {
    fn from(insights: &JourneyInsights) -> Self {
        let count = |kind: FrustrationKind| {
            insights
                .frustration_counts
                .get(&kind)
                .copied()
                .unwrap_or(0)
        };
        Self {
            top_path: insights.common_paths.first().map(|p| p.path.clone()),
            max_drop_off_rate: insights
                .drop_off_points
                .iter()
                .map(|p| p.rate)
                .fold(0.0, f64::max),
            drop_off_points: insights
                .drop_off_points
                .iter()
                .map(|p| p.to.clone())
                .collect(),
            rage_clicks: count(FrustrationKind::RageClick),
            rapid_scrolls: count(FrustrationKind::RapidScroll),
            form_abandonments: count(FrustrationKind::FormAbandonment),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SegmentationSummary {
    pub segments: Vec<String>,
    pub lead_score: u8,
    pub conversion_probability: f64,
}

impl From<&UserProfile> for SegmentationSummary {
    fn from(profile: &UserProfile) -> Self {
        Self {
            segments: profile.segments.clone(),
            lead_score: profile.lead_score,
            conversion_probability: profile.conversion_probability,
        }
    }
}

/// Everything the optimization rules can look at, addressed by dotted
/// paths such as `performance.metrics.lcp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationSnapshot {
    pub captured_at: DateTime<Utc>,
    pub performance: Option<PerformanceSummary>,
    pub journey: Option<JourneySummary>,
    pub segmentation: Option<SegmentationSummary>,
}

impl OptimizationSnapshot {
    pub fn empty(captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            performance: None,
            journey: None,
            segmentation: None,
        }
    }

    pub fn source_count(&self) -> usize {
        [
            self.performance.is_some(),
            self.journey.is_some(),
            self.segmentation.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}
