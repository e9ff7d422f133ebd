use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::Priority;
use crate::utils::paths;

/// One test against a dotted path into the profile facts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Criterion {
    /// Inclusive bounds; an absent bound is open.
    Range {
        path: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Equals { path: String, value: Value },
}

impl Criterion {
    pub fn matches(&self, facts: &Value) -> bool {
        match self {
            Criterion::Range { path, min, max } => {
                let Some(actual) = paths::resolve_f64(facts, path) else {
                    return false;
                };
                min.map_or(true, |min| actual >= min) && max.map_or(true, |max| actual <= max)
            }
            Criterion::Equals { path, value } => match (paths::resolve(facts, path), value) {
                (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
                (Some(actual), expected) => actual == expected,
                (None, _) => false,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentRule {
    pub id: String,
    pub name: String,
    pub priority: Priority,
    pub criteria: Vec<Criterion>,
    pub conversion_probability: f64,
}

impl SegmentRule {
    /// All criteria must hold. A rule with no criteria never matches.
    pub fn matches(&self, facts: &Value) -> bool {
        !self.criteria.is_empty() && self.criteria.iter().all(|c| c.matches(facts))
    }
}

pub fn load_catalog(raw: &str) -> Result<Vec<SegmentRule>> {
    serde_json::from_str(raw).context("failed to parse segment catalog")
}

fn range(path: &str, min: Option<f64>, max: Option<f64>) -> Criterion {
    Criterion::Range {
        path: path.to_string(),
        min,
        max,
    }
}

fn equals(path: &str, value: Value) -> Criterion {
    Criterion::Equals {
        path: path.to_string(),
        value,
    }
}

fn rule(
    id: &str,
    name: &str,
    priority: Priority,
    conversion_probability: f64,
    criteria: Vec<Criterion>,
) -> SegmentRule {
    SegmentRule {
        id: id.to_string(),
        name: name.to_string(),
        priority,
        criteria,
        conversion_probability,
    }
}

pub fn default_catalog() -> Vec<SegmentRule> {
    vec![
        rule(
            "high_value_leads",
            "High-value leads",
            Priority::Critical,
            0.8,
            vec![
                equals("behavior.resume_download", json!(true)),
                equals("behavior.case_study_complete", json!(true)),
            ],
        ),
        rule(
            "recruiter_interest",
            "Recruiter interest",
            Priority::High,
            0.6,
            vec![
                equals("behavior.linkedin_click", json!(true)),
                range("page_views", Some(2.0), None),
            ],
        ),
        rule(
            "engaged_explorers",
            "Engaged explorers",
            Priority::High,
            0.45,
            vec![
                range("page_views", Some(4.0), None),
                range("session_time_secs", Some(300.0), None),
                range("max_scroll_depth", Some(70.0), Some(100.0)),
            ],
        ),
        rule(
            "case_study_readers",
            "Case-study readers",
            Priority::Medium,
            0.3,
            vec![range("behavior.case_study_views", Some(2.0), None)],
        ),
        rule(
            "returning_visitors",
            "Returning visitors",
            Priority::Medium,
            0.25,
            vec![range("visit_count", Some(2.0), None)],
        ),
        rule(
            "casual_browsers",
            "Casual browsers",
            Priority::Low,
            0.05,
            vec![
                range("page_views", None, Some(2.0)),
                range("session_time_secs", None, Some(60.0)),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_inclusive() {
        let facts = json!({"page_views": 4});
        assert!(range("page_views", Some(4.0), Some(4.0)).matches(&facts));
        assert!(!range("page_views", Some(4.1), None).matches(&facts));
        assert!(!range("missing", Some(0.0), None).matches(&facts));
    }

    #[test]
    fn equality_compares_numbers_by_value() {
        let facts = json!({"visit_count": 2});
        assert!(equals("visit_count", json!(2.0)).matches(&facts));
        assert!(!equals("visit_count", json!("2")).matches(&facts));
    }

    #[test]
    fn catalog_round_trips_through_json() {
        let raw = serde_json::to_string(&default_catalog()).unwrap();
        let loaded = load_catalog(&raw).unwrap();
        assert_eq!(loaded, default_catalog());
        assert!(raw.contains("\"kind\":\"range\""));
    }
}
