use chrono::{DateTime, Utc};

use crate::models::UserProfile;
use crate::segmentation::{algorithm::MatchedSegment, config::ScoringConfig};
use crate::utils::stats::clamp_unit;

/// Weighted engagement score scaled by the best matched segment, clamped to 0..=100.
pub fn lead_score(
    profile: &UserProfile,
    segments: &[MatchedSegment],
    config: &ScoringConfig,
) -> u8 {
    let behavior = &profile.behavior;

    let base = config.weight_page_view * profile.page_views as f64
        + config.weight_session_minute * profile.session_minutes()
        + config.weight_scroll_depth * f64::from(profile.max_scroll_depth)
        + config.weight_click * profile.total_clicks as f64;

    let bonus = config.bonus_linkedin_click * behavior.linkedin_clicks as f64
        + config.bonus_resume_download * behavior.resume_downloads as f64
        + config.bonus_case_study_view * behavior.case_study_views as f64
        + config.bonus_contact_page_visit * behavior.contact_page_visits as f64;

    let multiplier = segments
        .iter()
        .map(|segment| segment.priority)
        .max()
        .map(|priority| priority.score_multiplier())
        .unwrap_or(config.unsegmented_multiplier);

    ((base + bonus) * multiplier).round().clamp(0.0, 100.0) as u8
}

/// Best segment estimate nudged by how recently the visitor interacted.
pub fn predict_conversion(
    profile: &UserProfile,
    segments: &[MatchedSegment],
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> f64 {
    let base = segments
        .iter()
        .map(|segment| segment.conversion_probability)
        .fold(0.0_f64, f64::max);

    let idle_secs = (now - profile.last_updated).num_seconds();
    let adjustment = if idle_secs < config.recent_activity_secs {
        config.recent_activity_boost
    } else if idle_secs > config.stale_activity_secs {
        -config.stale_activity_penalty
    } else {
        0.0
    };

    clamp_unit(base + adjustment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::Duration;

    fn segment(priority: Priority, probability: f64) -> MatchedSegment {
        MatchedSegment {
            id: format!("{priority}"),
            name: String::new(),
            priority,
            conversion_probability: probability,
        }
    }

    #[test]
    fn highest_priority_segment_sets_the_multiplier() {
        let mut profile = UserProfile::new("u", Utc::now());
        profile.page_views = 5; // base 10
        let config = ScoringConfig::default();

        assert_eq!(lead_score(&profile, &[], &config), 10);
        let matched = [segment(Priority::Low, 0.1), segment(Priority::High, 0.2)];
        assert_eq!(lead_score(&profile, &matched, &config), 15);
    }

    #[test]
    fn lead_score_saturates_at_one_hundred() {
        let mut profile = UserProfile::new("u", Utc::now());
        profile.behavior.resume_downloads = 10;
        assert_eq!(lead_score(&profile, &[], &ScoringConfig::default()), 100);
    }

    #[test]
    fn conversion_decays_after_a_day_and_grows_within_the_hour() {
        let now = Utc::now();
        let config = ScoringConfig::default();
        let segments = [segment(Priority::High, 0.5)];
        let mut profile = UserProfile::new("u", now);

        let fresh = predict_conversion(&profile, &segments, &config, now + Duration::minutes(10));
        assert!((fresh - 0.6).abs() < 1e-9);

        let neutral = predict_conversion(&profile, &segments, &config, now + Duration::hours(5));
        assert!((neutral - 0.5).abs() < 1e-9);

        let stale = predict_conversion(&profile, &segments, &config, now + Duration::hours(30));
        assert!((stale - 0.3).abs() < 1e-9);

        profile.last_updated = now;
        assert_eq!(predict_conversion(&profile, &[], &config, now + Duration::days(3)), 0.0);
    }
}
