use std::collections::BTreeMap;

use super::{
    config::SeriesConfig,
    history::History,
    types::{Evaluation, MetricSample, Regression, RegressionLevel, Severity, Status, Violation},
};
use crate::utils::stats;
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "monitor";

/// Budget, baseline and regression checks over one metric series.
///
/// Web vitals, bundle sizes and Lighthouse scores all go through this type;
/// only their [`SeriesConfig`] differs.
pub struct MetricSeriesMonitor {
    config: SeriesConfig,
    history: History,
}

impl MetricSeriesMonitor {
    pub fn new(config: SeriesConfig) -> Self {
        let history = History::new(config.history_cap);
        Self { config, history }
    }

    pub fn with_history(config: SeriesConfig, history: History) -> Self {
        Self { config, history }
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn into_history(self) -> History {
        self.history
    }

    /// One violation per budgeted metric that is strictly past its budget.
    /// Metrics missing from the sample are not checked.
    pub fn check_budgets(&self, sample: &MetricSample) -> Vec<Violation> {
        self.config
            .budgets
            .iter()
            .filter_map(|(metric, budget)| {
                let actual = sample.get(metric)?;
                if !self.config.violates(actual, *budget) {
                    return None;
                }
                let ratio = self.config.overshoot(actual, *budget);
                Some(Violation {
                    metric: metric.clone(),
                    actual,
                    budget: *budget,
                    ratio,
                    severity: self.severity(ratio),
                })
            })
            .collect()
    }

    pub fn severity(&self, ratio: f64) -> Severity {
        let scale = &self.config.severity;
        if ratio > scale.critical {
            Severity::Critical
        } else if ratio > scale.high {
            Severity::High
        } else if ratio > scale.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    /// Median of each metric over the last `baseline_window` history entries.
    pub fn baseline(&self) -> BTreeMap<String, f64> {
        let mut metrics: Vec<&String> = self
            .history
            .iter()
            .flat_map(|sample| sample.metrics.keys())
            .collect();
        metrics.sort();
        metrics.dedup();

        metrics
            .into_iter()
            .filter_map(|metric| {
                let values = self
                    .history
                    .recent_values(metric, self.config.baseline_window);
                stats::median(&values).map(|median| (metric.clone(), median))
            })
            .collect()
    }

    pub fn detect_regressions(&self, sample: &MetricSample) -> Vec<Regression> {
        let baseline = self.baseline();
        self.regressions_against(sample, &baseline)
    }

    fn regressions_against(
        &self,
        sample: &MetricSample,
        baseline: &BTreeMap<String, f64>,
    ) -> Vec<Regression> {
        let thresholds = &self.config.regression;
        sample
            .metrics
            .iter()
            .filter_map(|(metric, current)| {
                let base = *baseline.get(metric)?;
                let change = self.config.worsening_percent(*current, base)?;
                let level = if change > thresholds.critical {
                    RegressionLevel::Critical
                } else if change > thresholds.error {
                    RegressionLevel::Error
                } else if change > thresholds.warning {
                    RegressionLevel::Warning
                } else {
                    return None;
                };
                Some(Regression {
                    metric: metric.clone(),
                    current: *current,
                    baseline: base,
                    change_percent: change,
                    level,
                })
            })
            .collect()
    }

    /// Checks the sample against budgets and the baseline computed from
    /// history *before* it, then appends it to history.
    pub fn evaluate(&mut self, sample: MetricSample) -> Evaluation {
        let baseline = self.baseline();
        let violations = self.check_budgets(&sample);
        let regressions = self.regressions_against(&sample, &baseline);

        let status = if violations
            .iter()
            .any(|v| v.severity >= Severity::High)
            || regressions
                .iter()
                .any(|r| r.level >= RegressionLevel::Error)
        {
            Status::Fail
        } else if violations.is_empty() && regressions.is_empty() {
            Status::Pass
        } else {
            Status::Warn
        };

        log_debug!(
            "{}: baseline over {} entries, {} metrics",
            self.config.name,
            self.history.len().min(self.config.baseline_window),
            baseline.len()
        );
        log_info!(
            "{}: {} violations, {} regressions",
            self.config.name,
            violations.len(),
            regressions.len()
        );

        self.history.push(sample.clone());
        Evaluation {
            series: self.config.name.clone(),
            sample,
            baseline,
            violations,
            regressions,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bundle_sample(js: f64, css: f64) -> MetricSample {
        MetricSample::new(Utc::now(), "dist").with("js", js).with("css", css)
    }

    #[test]
    fn budget_is_strictly_greater_than() {
        let monitor = MetricSeriesMonitor::new(SeriesConfig::bundle());
        assert!(monitor.check_budgets(&bundle_sample(600.0, 300.0)).is_empty());

        let over = monitor.check_budgets(&bundle_sample(601.0, 300.0));
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].metric, "js");
        assert_eq!(over[0].severity, Severity::Low);
    }

    #[test]
    fn bundle_severity_follows_ratio_scale() {
        let monitor = MetricSeriesMonitor::new(SeriesConfig::bundle());
        let violations = monitor.check_budgets(&bundle_sample(700.0, 100.0));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, Severity::Medium);

        assert_eq!(monitor.severity(1.3), Severity::High);
        assert_eq!(monitor.severity(1.6), Severity::Critical);
    }

    #[test]
    fn web_vitals_use_their_own_scale() {
        let monitor = MetricSeriesMonitor::new(SeriesConfig::web_vitals());
        let sample = MetricSample::new(Utc::now(), "probe")
            .with("lcp", 5200.0)
            .with("cls", 0.16)
            .with("ttfb", 700.0);
        let violations = monitor.check_budgets(&sample);
        let severity = |metric: &str| {
            violations
                .iter()
                .find(|v| v.metric == metric)
                .map(|v| v.severity)
        };
        assert_eq!(severity("lcp"), Some(Severity::Critical));
        assert_eq!(severity("cls"), Some(Severity::High));
        assert_eq!(severity("ttfb"), None);
    }

    #[test]
    fn lighthouse_scores_violate_below_budget() {
        let monitor = MetricSeriesMonitor::new(SeriesConfig::lighthouse());
        let sample = MetricSample::new(Utc::now(), "lighthouse")
            .with("performance", 95.0)
            .with("accessibility", 80.0);
        let violations = monitor.check_budgets(&sample);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].metric, "accessibility");
        assert_eq!(violations[0].severity, Severity::Medium);
    }

    #[test]
    fn regression_against_median_of_window() {
        let mut monitor = MetricSeriesMonitor::new(SeriesConfig::web_vitals());
        let start = Utc::now();
        // outlier in the middle does not move the median
        for (i, lcp) in [2000.0, 2000.0, 9000.0, 2000.0, 2000.0].iter().enumerate() {
            monitor.evaluate(
                MetricSample::new(start + Duration::minutes(i as i64), "probe").with("lcp", *lcp),
            );
        }
        assert_eq!(monitor.baseline().get("lcp"), Some(&2000.0));

        let steady = MetricSample::new(start, "probe").with("lcp", 2080.0);
        assert!(monitor.detect_regressions(&steady).is_empty());

        let slower = MetricSample::new(start, "probe").with("lcp", 2400.0);
        let regressions = monitor.detect_regressions(&slower);
        assert_eq!(regressions.len(), 1);
        assert_eq!(regressions[0].level, RegressionLevel::Error);

        let much_slower = MetricSample::new(start, "probe").with("lcp", 2600.0);
        assert_eq!(
            monitor.detect_regressions(&much_slower)[0].level,
            RegressionLevel::Critical
        );
    }

    #[test]
    fn first_evaluation_has_no_baseline() {
        let mut monitor = MetricSeriesMonitor::new(SeriesConfig::bundle());
        let evaluation = monitor.evaluate(bundle_sample(500.0, 100.0));
        assert!(evaluation.baseline.is_empty());
        assert_eq!(evaluation.status, Status::Pass);
        assert_eq!(monitor.history().len(), 1);
    }

    #[test]
    fn history_never_exceeds_cap() {
        let mut monitor = MetricSeriesMonitor::new(SeriesConfig::bundle());
        for i in 0..130 {
            monitor.evaluate(bundle_sample(400.0 + i as f64, 100.0));
        }
        assert_eq!(monitor.history().len(), 100);
        assert_eq!(
            monitor.history().iter().next().and_then(|s| s.get("js")),
            Some(430.0)
        );
    }
}
