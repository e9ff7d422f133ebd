/// Lead-score weights and conversion-recency adjustments.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub weight_page_view: f64,
    pub weight_session_minute: f64,
    pub weight_scroll_depth: f64,
    pub weight_click: f64,

    /// Behavior bonuses, per occurrence
    pub bonus_linkedin_click: f64,
    pub bonus_resume_download: f64,
    pub bonus_case_study_view: f64,
    pub bonus_contact_page_visit: f64,

    /// Multiplier when no segment matched
    pub unsegmented_multiplier: f64,

    /// Conversion probability nudges by time since the last interaction
    pub recent_activity_secs: i64,
    pub recent_activity_boost: f64,
    pub stale_activity_secs: i64,
    pub stale_activity_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_page_view: 2.0,
            weight_session_minute: 1.0,
            weight_scroll_depth: 0.5,
            weight_click: 0.5,
            bonus_linkedin_click: 10.0,
            bonus_resume_download: 25.0,
            bonus_case_study_view: 5.0,
            bonus_contact_page_visit: 8.0,
            unsegmented_multiplier: 1.0,
            recent_activity_secs: 60 * 60,
            recent_activity_boost: 0.1,
            stale_activity_secs: 24 * 60 * 60,
            stale_activity_penalty: 0.2,
        }
    }
}
