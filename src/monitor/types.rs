use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One measurement of a whole series, keyed by metric name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    /// Where the numbers came from (`lighthouse`, `http-probe`, `dist` ...)
    #[serde(default)]
    pub source: String,
    pub metrics: BTreeMap<String, f64>,
}

impl MetricSample {
    pub fn new(timestamp: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            timestamp,
            source: source.into(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with(mut self, metric: &str, value: f64) -> Self {
        self.metrics.insert(metric.to_string(), value);
        self
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics.get(metric).copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RegressionLevel {
    Warning,
    Error,
    Critical,
}

impl RegressionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegressionLevel::Warning => "warning",
            RegressionLevel::Error => "error",
            RegressionLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub metric: String,
    pub actual: f64,
    pub budget: f64,
    pub ratio: f64,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Regression {
    pub metric: String,
    pub current: f64,
    pub baseline: f64,
    /// Positive means worse, whichever direction the metric runs
    pub change_percent: f64,
    pub level: RegressionLevel,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warn,
    Fail,
}

/// The result of checking one sample against budgets and history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub series: String,
    pub sample: MetricSample,
    pub baseline: BTreeMap<String, f64>,
    pub violations: Vec<Violation>,
    pub regressions: Vec<Regression>,
    pub status: Status,
}

impl Evaluation {
    pub fn critical_count(&self) -> usize {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Critical)
            .count()
            + self
                .regressions
                .iter()
                .filter(|r| r.level == RegressionLevel::Critical)
                .count()
    }

    pub fn has_critical(&self) -> bool {
        self.critical_count() > 0
    }
}
