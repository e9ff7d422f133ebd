use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which way a metric gets worse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Timings and sizes: above budget is a violation
    LowerIsBetter,
    /// Audit scores: below budget is a violation
    HigherIsBetter,
}

/// Budget overshoot ratios. A ratio strictly above `critical` is critical,
/// above `high` is high, above `medium` is medium, anything else low.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SeverityScale {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

/// Relative change against the baseline, in percent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegressionThresholds {
    pub warning: f64,
    pub error: f64,
    pub critical: f64,
}

/// Everything that distinguishes one metric series from another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeriesConfig {
    pub name: String,
    pub unit: String,
    pub direction: Direction,
    pub budgets: BTreeMap<String, f64>,
    pub severity: SeverityScale,
    pub regression: RegressionThresholds,
    /// How many recent history entries feed the median baseline
    pub baseline_window: usize,
    pub history_cap: usize,
}

pub const HISTORY_CAP: usize = 100;

fn budgets(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
    entries
        .iter()
        .map(|(metric, budget)| (metric.to_string(), *budget))
        .collect()
}

impl SeriesConfig {
    pub fn web_vitals() -> Self {
        Self {
            name: "performance".into(),
            unit: "ms".into(),
            direction: Direction::LowerIsBetter,
            budgets: budgets(&[
                ("lcp", 2500.0),
                ("fid", 100.0),
                ("cls", 0.1),
                ("fcp", 1800.0),
                ("ttfb", 800.0),
            ]),
            severity: SeverityScale {
                critical: 2.0,
                high: 1.5,
                medium: 1.2,
            },
            regression: RegressionThresholds {
                warning: 5.0,
                error: 15.0,
                critical: 25.0,
            },
            baseline_window: 5,
            history_cap: HISTORY_CAP,
        }
    }

    pub fn bundle() -> Self {
        Self {
            name: "bundle-size".into(),
            unit: "KB".into(),
            direction: Direction::LowerIsBetter,
            budgets: budgets(&[
                ("js", 600.0),
                ("css", 300.0),
                ("images", 1000.0),
                ("fonts", 200.0),
                ("total", 2000.0),
            ]),
            severity: SeverityScale {
                critical: 1.5,
                high: 1.2,
                medium: 1.1,
            },
            regression: RegressionThresholds {
                warning: 5.0,
                error: 10.0,
                critical: 20.0,
            },
            baseline_window: 10,
            history_cap: HISTORY_CAP,
        }
    }

    pub fn lighthouse() -> Self {
        Self {
            name: "lighthouse".into(),
            unit: "score".into(),
            direction: Direction::HigherIsBetter,
            budgets: budgets(&[
                ("performance", 90.0),
                ("accessibility", 95.0),
                ("best-practices", 90.0),
                ("seo", 90.0),
            ]),
            severity: SeverityScale {
                critical: 1.5,
                high: 1.2,
                medium: 1.1,
            },
            regression: RegressionThresholds {
                warning: 5.0,
                error: 10.0,
                critical: 20.0,
            },
            baseline_window: 5,
            history_cap: HISTORY_CAP,
        }
    }

    /// How far past budget `actual` is, as a ratio >= 1 when violating.
    pub fn overshoot(&self, actual: f64, budget: f64) -> f64 {
        match self.direction {
            Direction::LowerIsBetter if budget > 0.0 => actual / budget,
            Direction::HigherIsBetter if actual > 0.0 => budget / actual,
            _ => f64::INFINITY,
        }
    }

    pub fn violates(&self, actual: f64, budget: f64) -> bool {
        match self.direction {
            Direction::LowerIsBetter => actual > budget,
            Direction::HigherIsBetter => actual < budget,
        }
    }

    /// Percent change from `baseline` to `current`, positive when worse.
    pub fn worsening_percent(&self, current: f64, baseline: f64) -> Option<f64> {
        if baseline == 0.0 {
            return None;
        }
        let change = match self.direction {
            Direction::LowerIsBetter => current - baseline,
            Direction::HigherIsBetter => baseline - current,
        };
        Some(change / baseline.abs() * 100.0)
    }
}

/// Partial override of a [`SeriesConfig`] as it appears in the settings
/// file. Budgets merge per metric; everything else replaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeriesOverrides {
    pub budgets: BTreeMap<String, f64>,
    pub severity: Option<SeverityScale>,
    pub regression: Option<RegressionThresholds>,
    pub baseline_window: Option<usize>,
    pub history_cap: Option<usize>,
}

impl SeriesOverrides {
    pub fn apply(&self, mut base: SeriesConfig) -> SeriesConfig {
        base.budgets
            .extend(self.budgets.iter().map(|(k, v)| (k.clone(), *v)));
        if let Some(severity) = self.severity {
            base.severity = severity;
        }
        if let Some(regression) = self.regression {
            base.regression = regression;
        }
        if let Some(window) = self.baseline_window {
            base.baseline_window = window.max(1);
        }
        if let Some(cap) = self.history_cap {
            base.history_cap = cap.max(1);
        }
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_merge_budgets_per_metric() {
        let overrides: SeriesOverrides =
            serde_json::from_str(r#"{"budgets": {"js": 450}, "baseline_window": 3}"#).unwrap();
        let config = overrides.apply(SeriesConfig::bundle());
        assert_eq!(config.budgets["js"], 450.0);
        assert_eq!(config.budgets["css"], 300.0);
        assert_eq!(config.baseline_window, 3);
        assert_eq!(config.history_cap, HISTORY_CAP);
    }

    #[test]
    fn direction_flips_overshoot_and_worsening() {
        let lighthouse = SeriesConfig::lighthouse();
        assert!(lighthouse.violates(80.0, 90.0));
        assert!(!lighthouse.violates(90.0, 90.0));
        assert!((lighthouse.overshoot(60.0, 90.0) - 1.5).abs() < 1e-9);
        assert_eq!(lighthouse.worsening_percent(90.0, 100.0), Some(10.0));

        let bundle = SeriesConfig::bundle();
        assert_eq!(bundle.worsening_percent(110.0, 100.0), Some(10.0));
        assert_eq!(bundle.worsening_percent(110.0, 0.0), None);
    }
}
