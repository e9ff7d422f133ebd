use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A visit ends after this much inactivity; the next interaction opens a new one.
pub const VISIT_GAP_MINUTES: i64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct BehaviorCounters {
    pub linkedin_clicks: u64,
    pub resume_downloads: u64,
    pub case_study_views: u64,
    pub case_studies_completed: u64,
    pub contact_page_visits: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub first_visit: DateTime<Utc>,
    pub last_visit: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub visit_count: u32,
    pub page_views: u64,
    pub session_time_ms: u64,
    pub total_clicks: u64,
    pub max_scroll_depth: u8,
    #[serde(default)]
    pub behavior: BehaviorCounters,
    /// Derived; rewritten by the segmentation engine after every change.
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(default)]
    pub lead_score: u8,
    #[serde(default)]
    pub conversion_probability: f64,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            first_visit: now,
            last_visit: now,
            last_updated: now,
            visit_count: 1,
            page_views: 0,
            session_time_ms: 0,
            total_clicks: 0,
            max_scroll_depth: 0,
            behavior: BehaviorCounters::default(),
            segments: Vec::new(),
            lead_score: 0,
            conversion_probability: 0.0,
        }
    }

    pub fn session_minutes(&self) -> f64 {
        self.session_time_ms as f64 / 60_000.0
    }

    /// Applies counter increments. Derived fields are left for the engine.
    pub fn apply(&mut self, update: &ProfileUpdate, now: DateTime<Utc>) {
        if now - self.last_updated > Duration::minutes(VISIT_GAP_MINUTES) {
            self.visit_count = self.visit_count.saturating_add(1);
            self.last_visit = now;
        }

        self.page_views = self.page_views.saturating_add(update.page_views);
        self.session_time_ms = self.session_time_ms.saturating_add(update.session_time_ms);
        self.total_clicks = self.total_clicks.saturating_add(update.clicks);
        if let Some(depth) = update.scroll_depth {
            self.max_scroll_depth = self.max_scroll_depth.max(depth.min(100));
        }

        let behavior = &mut self.behavior;
        behavior.linkedin_clicks = behavior.linkedin_clicks.saturating_add(update.linkedin_clicks);
        behavior.resume_downloads = behavior
            .resume_downloads
            .saturating_add(update.resume_downloads);
        behavior.case_study_views = behavior
            .case_study_views
            .saturating_add(update.case_study_views);
        behavior.case_studies_completed = behavior
            .case_studies_completed
            .saturating_add(update.case_studies_completed);
        behavior.contact_page_visits = behavior
            .contact_page_visits
            .saturating_add(update.contact_page_visits);

        self.last_updated = now;
    }

    /// Flattened view addressed by segment criteria paths.
    pub fn facts(&self) -> Value {
        let b = &self.behavior;
        json!({
            "page_views": self.page_views,
            "visit_count": self.visit_count,
            "session_time_secs": self.session_time_ms / 1000,
            "session_minutes": self.session_minutes(),
            "max_scroll_depth": self.max_scroll_depth,
            "total_clicks": self.total_clicks,
            "behavior": {
                "linkedin_clicks": b.linkedin_clicks,
                "resume_downloads": b.resume_downloads,
                "case_study_views": b.case_study_views,
                "case_studies_completed": b.case_studies_completed,
                "contact_page_visits": b.contact_page_visits,
                "linkedin_click": b.linkedin_clicks > 0,
                "resume_download": b.resume_downloads > 0,
                "case_study_complete": b.case_studies_completed > 0,
                "contact_page_visit": b.contact_page_visits > 0,
            },
        })
    }
}

/// Increments merged into a profile by a single tracked interaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub page_views: u64,
    pub session_time_ms: u64,
    pub clicks: u64,
    pub scroll_depth: Option<u8>,
    pub linkedin_clicks: u64,
    pub resume_downloads: u64,
    pub case_study_views: u64,
    pub case_studies_completed: u64,
    pub contact_page_visits: u64,
}

impl ProfileUpdate {
    pub fn page_view() -> Self {
        Self {
            page_views: 1,
            ..Self::default()
        }
    }

    pub fn click() -> Self {
        Self {
            clicks: 1,
            ..Self::default()
        }
    }

    pub fn scroll(depth: u8) -> Self {
        Self {
            scroll_depth: Some(depth),
            ..Self::default()
        }
    }

    pub fn time_on_page(ms: u64) -> Self {
        Self {
            session_time_ms: ms,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_depth_is_a_clamped_running_max() {
        let now = Utc::now();
        let mut profile = UserProfile::new("u", now);
        profile.apply(&ProfileUpdate::scroll(60), now);
        profile.apply(&ProfileUpdate::scroll(40), now);
        assert_eq!(profile.max_scroll_depth, 60);
        profile.apply(&ProfileUpdate::scroll(250), now);
        assert_eq!(profile.max_scroll_depth, 100);
    }

    #[test]
    fn long_gap_opens_a_new_visit() {
        let start = Utc::now();
        let mut profile = UserProfile::new("u", start);
        profile.apply(&ProfileUpdate::page_view(), start + Duration::minutes(5));
        assert_eq!(profile.visit_count, 1);

        let later = start + Duration::hours(3);
        profile.apply(&ProfileUpdate::page_view(), later);
        assert_eq!(profile.visit_count, 2);
        assert_eq!(profile.last_visit, later);
        assert_eq!(profile.first_visit, start);
    }

    #[test]
    fn facts_expose_behavior_flags() {
        let mut profile = UserProfile::new("u", Utc::now());
        profile.behavior.resume_downloads = 2;
        let facts = profile.facts();
        assert_eq!(facts["behavior"]["resume_download"], true);
        assert_eq!(facts["behavior"]["case_study_complete"], false);
    }
}
