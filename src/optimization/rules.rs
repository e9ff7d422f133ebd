use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::log_warn;
use crate::models::Priority;
use crate::utils::paths;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "optimization";

/// A test over the snapshot document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    Above { path: String, value: f64 },
    Below { path: String, value: f64 },
    Present { path: String },
    NonEmpty { path: String },
    Contains { path: String, value: Value },
    All { conditions: Vec<Condition> },
    Any { conditions: Vec<Condition> },
}

impl Condition {
    pub fn holds(&self, document: &Value) -> bool {
        match self {
            Condition::Above { path, value } => {
                paths::resolve_f64(document, path).map_or(false, |actual| actual > *value)
            }
            Condition::Below { path, value } => {
                paths::resolve_f64(document, path).map_or(false, |actual| actual < *value)
            }
            Condition::Present { path } => {
                !matches!(paths::resolve(document, path), None | Some(Value::Null))
            }
            Condition::NonEmpty { path } => match paths::resolve(document, path) {
                Some(Value::Array(items)) => !items.is_empty(),
                Some(Value::Object(map)) => !map.is_empty(),
                Some(Value::String(s)) => !s.is_empty(),
                _ => false,
            },
            Condition::Contains { path, value } => match paths::resolve(document, path) {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            },
            Condition::All { conditions } => conditions.iter().all(|c| c.holds(document)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.holds(document)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRule {
    pub id: String,
    pub category: String,
    pub priority: Priority,
    pub condition: Condition,
    pub title: String,
    pub description: String,
    pub actions: Vec<String>,
    pub expected_impact: String,
    /// Snapshot paths copied verbatim into the recommendation
    pub metrics: Vec<String>,
}

pub fn load_rules(raw: &str) -> Result<Vec<RecommendationRule>> {
    serde_json::from_str(raw).context("failed to parse recommendation rules")
}

/// The built-in catalog. Kept as data so it can be dumped, edited and
/// loaded back with [`load_rules`].
pub fn default_rules() -> Vec<RecommendationRule> {
    let raw = json!([
        {
            "id": "slow_lcp",
            "category": "performance",
            "priority": "critical",
            "condition": {"op": "above", "path": "performance.metrics.lcp", "value": 2500.0},
            "title": "Improve Largest Contentful Paint",
            "description": "The largest above-the-fold element renders later than the 2.5 s budget.",
            "actions": [
                "Preload the hero image and serve it as AVIF/WebP",
                "Inline critical CSS for the first viewport",
                "Defer non-essential scripts"
            ],
            "expected_impact": "Faster perceived load and better search ranking",
            "metrics": ["performance.metrics.lcp"]
        },
        {
            "id": "layout_shift",
            "category": "performance",
            "priority": "high",
            "condition": {"op": "above", "path": "performance.metrics.cls", "value": 0.1},
            "title": "Reduce layout shift",
            "description": "Content moves after first paint, which misdirects clicks.",
            "actions": [
                "Reserve width/height for images and embeds",
                "Avoid injecting content above existing content"
            ],
            "expected_impact": "Fewer accidental clicks and rage clicks",
            "metrics": ["performance.metrics.cls"]
        },
        {
            "id": "slow_server_response",
            "category": "performance",
            "priority": "medium",
            "condition": {"op": "above", "path": "performance.metrics.ttfb", "value": 800.0},
            "title": "Speed up server response",
            "description": "Time to first byte exceeds 800 ms.",
            "actions": ["Serve pages from a CDN edge", "Enable compression and caching headers"],
            "expected_impact": "Every other paint metric improves with TTFB",
            "metrics": ["performance.metrics.ttfb"]
        },
        {
            "id": "heavy_javascript",
            "category": "performance",
            "priority": "high",
            "condition": {"op": "above", "path": "performance.bundle.js", "value": 600.0},
            "title": "Trim the JavaScript bundle",
            "description": "Shipped JavaScript exceeds the 600 KB budget.",
            "actions": ["Split the lightbox and analytics code", "Drop unused dependencies"],
            "expected_impact": "Shorter main-thread blocking and faster interaction",
            "metrics": ["performance.bundle.js", "performance.bundle.total"]
        },
        {
            "id": "weak_accessibility",
            "category": "accessibility",
            "priority": "medium",
            "condition": {"op": "below", "path": "performance.lighthouse.accessibility", "value": 95.0},
            "title": "Fix accessibility findings",
            "description": "The accessibility audit score is below 95.",
            "actions": ["Add missing alt text and labels", "Check colour contrast of captions"],
            "expected_impact": "Site usable by more visitors, including screen-reader users",
            "metrics": ["performance.lighthouse.accessibility"]
        },
        {
            "id": "journey_drop_off",
            "category": "user_experience",
            "priority": "high",
            "condition": {"op": "above", "path": "journey.max_drop_off_rate", "value": 0.5},
            "title": "Address journey drop-off",
            "description": "Most visitors leave after a specific step without converting.",
            "actions": [
                "Add a clear next step at the exit page",
                "Link related case studies at the end of each page"
            ],
            "expected_impact": "Longer journeys and more contact requests",
            "metrics": ["journey.max_drop_off_rate", "journey.drop_off_points"]
        },
        {
            "id": "rage_clicks",
            "category": "user_experience",
            "priority": "high",
            "condition": {"op": "above", "path": "journey.rage_clicks", "value": 0.0},
            "title": "Investigate rage clicks",
            "description": "Visitors repeatedly click the same spot, usually something that looks clickable.",
            "actions": ["Review the heatmap hot spots", "Make non-interactive images visibly static"],
            "expected_impact": "Less frustration on key pages",
            "metrics": ["journey.rage_clicks"]
        },
        {
            "id": "form_abandonment",
            "category": "conversion",
            "priority": "medium",
            "condition": {"op": "above", "path": "journey.form_abandonments", "value": 0.0},
            "title": "Simplify the contact form",
            "description": "Visitors start the contact form and leave without sending it.",
            "actions": ["Reduce required fields", "Offer email and LinkedIn as alternatives"],
            "expected_impact": "More completed contact requests",
            "metrics": ["journey.form_abandonments"]
        },
        {
            "id": "high_value_follow_up",
            "category": "conversion",
            "priority": "critical",
            "condition": {"op": "contains", "path": "segmentation.segments", "value": "high_value_leads"},
            "title": "Surface the contact call-to-action",
            "description": "This visitor downloaded the resume and finished a case study.",
            "actions": ["Show the contact banner", "Highlight availability and response time"],
            "expected_impact": "Converts a warm lead while they are still on the site",
            "metrics": ["segmentation.lead_score", "segmentation.conversion_probability"]
        },
        {
            "id": "low_engagement",
            "category": "engagement",
            "priority": "low",
            "condition": {"op": "all", "conditions": [
                {"op": "present", "path": "segmentation"},
                {"op": "below", "path": "segmentation.lead_score", "value": 20.0}
            ]},
            "title": "Lift early engagement",
            "description": "The visitor has barely interacted with the site.",
            "actions": ["Feature the strongest case study on the landing page"],
            "expected_impact": "More visitors reach the portfolio work",
            "metrics": ["segmentation.lead_score"]
        }
    ]);
    catalog_from(raw)
}

/// Falls back to an empty catalog, with a warning, when `raw` is not a rule list.
fn catalog_from(raw: Value) -> Vec<RecommendationRule> {
    match serde_json::from_value(raw) {
        Ok(rules) => rules,
        Err(err) => {
            log_warn!("built-in recommendation rules are malformed, none loaded: {err}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_catalog_yields_no_rules() {
        let raw = json!([{"id": "broken", "priority": "urgent"}]);
        assert!(catalog_from(raw).is_empty());
        assert_eq!(catalog_from(json!([])), Vec::new());
    }

    #[test]
    fn default_rules_parse() {
        let rules = default_rules();
        assert_eq!(rules.len(), 10);
        let raw = serde_json::to_string(&rules).unwrap();
        assert_eq!(load_rules(&raw).unwrap(), rules);
    }

    #[test]
    fn conditions_over_documents() {
        let doc = json!({
            "performance": {"metrics": {"lcp": 3100.0}},
            "segmentation": {"segments": ["returning_visitors"], "lead_score": 12},
            "journey": null
        });
        let above = Condition::Above { path: "performance.metrics.lcp".into(), value: 2500.0 };
        let missing = Condition::Above { path: "performance.metrics.cls".into(), value: 0.0 };
        let contains = Condition::Contains {
            path: "segmentation.segments".into(),
            value: json!("returning_visitors"),
        };
        let present_null = Condition::Present { path: "journey".into() };

        assert!(above.holds(&doc));
        assert!(!missing.holds(&doc));
        assert!(contains.holds(&doc));
        assert!(!present_null.holds(&doc));
        assert!(Condition::Any { conditions: vec![missing.clone(), above.clone()] }.holds(&doc));
        assert!(!Condition::All { conditions: vec![missing, above] }.holds(&doc));
    }
}
