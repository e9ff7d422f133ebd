use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Priority, UserProfile};
use crate::segmentation::{
    config::ScoringConfig,
    rules::{default_catalog, load_catalog, SegmentRule},
    scoring,
};

/// A catalog rule the profile currently satisfies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedSegment {
    pub id: String,
    pub name: String,
    pub priority: Priority,
    pub conversion_probability: f64,
}

impl From<&SegmentRule> for MatchedSegment {
    fn from(rule: &SegmentRule) -> Self {
        Self {
            id: rule.id.clone(),
            name: rule.name.clone(),
            priority: rule.priority,
            conversion_probability: rule.conversion_probability,
        }
    }
}

/// Evaluates profiles against an immutable rule catalog.
#[derive(Debug, Clone)]
pub struct SegmentationEngine {
    rules: Vec<SegmentRule>,
    config: ScoringConfig,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(default_catalog(), ScoringConfig::default())
    }
}

impl SegmentationEngine {
    pub fn new(rules: Vec<SegmentRule>, config: ScoringConfig) -> Self {
        Self { rules, config }
    }

    pub fn from_catalog_json(raw: &str, config: ScoringConfig) -> Result<Self> {
        Ok(Self::new(load_catalog(raw)?, config))
    }

    pub fn rules(&self) -> &[SegmentRule] {
        &self.rules
    }

    /// Matched segments in catalog order.
    pub fn evaluate(&self, profile: &UserProfile) -> Vec<MatchedSegment> {
        let facts = profile.facts();
        self.rules
            .iter()
            .filter(|rule| rule.matches(&facts))
            .map(MatchedSegment::from)
            .collect()
    }

    pub fn score(&self, profile: &UserProfile, segments: &[MatchedSegment]) -> u8 {
        scoring::lead_score(profile, segments, &self.config)
    }

    pub fn predict_conversion(
        &self,
        profile: &UserProfile,
        segments: &[MatchedSegment],
        now: DateTime<Utc>,
    ) -> f64 {
        scoring::predict_conversion(profile, segments, &self.config, now)
    }

    /// Recomputes every derived field from the current counters in one step.
    pub fn refresh(&self, profile: &mut UserProfile, now: DateTime<Utc>) -> Vec<MatchedSegment> {
        let segments = self.evaluate(profile);
        profile.lead_score = self.score(profile, &segments);
        profile.conversion_probability = self.predict_conversion(profile, &segments, now);
        profile.segments = segments.iter().map(|segment| segment.id.clone()).collect();
        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileUpdate;

    #[test]
    fn evaluation_is_deterministic() {
        let engine = SegmentationEngine::default();
        let now = Utc::now();
        let mut profile = UserProfile::new("u", now);
        profile.apply(
            &ProfileUpdate {
                page_views: 6,
                session_time_ms: 420_000,
                scroll_depth: Some(85),
                linkedin_clicks: 1,
                ..ProfileUpdate::default()
            },
            now,
        );

        let first = engine.evaluate(&profile);
        for _ in 0..5 {
            assert_eq!(engine.evaluate(&profile), first);
        }
        let ids: Vec<&str> = first.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["recruiter_interest", "engaged_explorers"]);
    }

    #[test]
    fn new_visitor_is_a_casual_browser() {
        let engine = SegmentationEngine::default();
        let profile = UserProfile::new("u", Utc::now());
        let ids: Vec<String> = engine.evaluate(&profile).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["casual_browsers".to_string()]);
    }

    #[test]
    fn refresh_keeps_derived_fields_in_range() {
        let engine = SegmentationEngine::default();
        let now = Utc::now();
        let mut profile = UserProfile::new("u", now);
        for _ in 0..50 {
            profile.apply(
                &ProfileUpdate {
                    page_views: 3,
                    clicks: 7,
                    resume_downloads: 1,
                    case_studies_completed: 1,
                    ..ProfileUpdate::default()
                },
                now,
            );
            engine.refresh(&mut profile, now);
            assert!(profile.lead_score <= 100);
            assert!((0.0..=1.0).contains(&profile.conversion_probability));
        }
        assert!(profile.segments.contains(&"high_value_leads".to_string()));
    }
}
