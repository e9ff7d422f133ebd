use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CONTROL: &str = "control";
pub const VARIANT_1: &str = "variant1";
pub const VARIANT_2: &str = "variant2";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Completed,
}

impl ExperimentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: String,
    pub name: String,
    /// Share of traffic, 0..=1; shares are normalised at assignment time
    pub traffic: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    View,
    Click,
    Conversion,
    EngagementTime,
    Visitor,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantResults {
    pub views: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub engagement_time_ms: u64,
    pub visitors: u64,
}

impl VariantResults {
    /// Per-visitor rate for the compared metrics.
    pub fn per_visitor(&self, metric: &str) -> f64 {
        let total = match metric {
            "views" => self.views,
            "clicks" => self.clicks,
            "conversions" => self.conversions,
            "engagementTime" => self.engagement_time_ms,
            _ => 0,
        };
        if self.visitors == 0 {
            0.0
        } else {
            total as f64 / self.visitors as f64
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricWinner {
    pub metric: String,
    /// `control`, `variant1`, or `no_clear_winner`
    pub winner: String,
    pub lift_percent: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentOutcome {
    pub metrics: Vec<MetricWinner>,
    /// `control`, `variant1`, or `tie`
    pub overall_winner: String,
    pub confidence: ConfidenceTier,
    pub total_participants: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub id: String,
    pub name: String,
    pub variations: Vec<Variation>,
    pub sample_size: u64,
    pub status: ExperimentStatus,
    pub results: BTreeMap<String, VariantResults>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outcome: Option<ExperimentOutcome>,
}

impl Experiment {
    /// Control plus two variants at the default 50/25/25 split.
    pub fn with_default_split(id: &str, name: &str, sample_size: u64, now: DateTime<Utc>) -> Self {
        Self::new(
            id,
            name,
            vec![
                Variation {
                    id: CONTROL.into(),
                    name: "Control".into(),
                    traffic: 0.5,
                },
                Variation {
                    id: VARIANT_1.into(),
                    name: "Variant 1".into(),
                    traffic: 0.25,
                },
                Variation {
                    id: VARIANT_2.into(),
                    name: "Variant 2".into(),
                    traffic: 0.25,
                },
            ],
            sample_size,
            now,
        )
    }

    pub fn new(
        id: &str,
        name: &str,
        variations: Vec<Variation>,
        sample_size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let results = variations
            .iter()
            .map(|v| (v.id.clone(), VariantResults::default()))
            .collect();
        Self {
            id: id.to_string(),
            name: name.to_string(),
            variations,
            sample_size,
            status: ExperimentStatus::Draft,
            results,
            created_at: now,
            started_at: None,
            outcome: None,
        }
    }

    pub fn total_visitors(&self) -> u64 {
        self.results.values().map(|r| r.visitors).sum()
    }

    /// Maps a uniform draw in `[0, 1)` onto the cumulative traffic cutoffs.
    pub fn bucket(&self, draw: f64) -> Option<&Variation> {
        let total: f64 = self.variations.iter().map(|v| v.traffic.max(0.0)).sum();
        if total <= 0.0 {
            return self.variations.first();
        }
        let mut cumulative = 0.0;
        for variation in &self.variations {
            cumulative += variation.traffic.max(0.0) / total;
            if draw < cumulative {
                return Some(variation);
            }
        }
        self.variations.last()
    }
}
