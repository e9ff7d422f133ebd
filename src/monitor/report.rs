use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::{Evaluation, Status};

/// Everything one monitor run produced, as written to the JSON export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub monitor: String,
    pub generated_at: DateTime<Utc>,
    pub evaluations: Vec<Evaluation>,
    /// Measurement problems that were recovered from
    pub warnings: Vec<String>,
}

impl MonitorReport {
    pub fn new(monitor: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            monitor: monitor.to_string(),
            generated_at,
            evaluations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        self.evaluations
            .iter()
            .map(|e| e.status)
            .fold(Status::Pass, |worst, status| match (worst, status) {
                (Status::Fail, _) | (_, Status::Fail) => Status::Fail,
                (Status::Warn, _) | (_, Status::Warn) => Status::Warn,
                _ => Status::Pass,
            })
    }

    pub fn critical_count(&self) -> usize {
        self.evaluations.iter().map(Evaluation::critical_count).sum()
    }

    pub fn has_critical(&self) -> bool {
        self.critical_count() > 0
    }

    /// `reports/<monitor>-<timestamp>.json`
    pub fn export_json(&self, reports_dir: &Path) -> Result<PathBuf> {
        let path = reports_dir.join(format!(
            "{}-{}.json",
            self.monitor,
            self.generated_at.format("%Y%m%dT%H%M%SZ")
        ));
        write_file(&path, &serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// `reports/<monitor>-junit.xml`
    pub fn export_junit(&self, reports_dir: &Path) -> Result<PathBuf> {
        let path = reports_dir.join(format!("{}-junit.xml", self.monitor));
        write_file(&path, &self.to_junit())?;
        Ok(path)
    }

    /// One test case per budgeted metric; violations and regressions at
    /// error level or above are failures.
    pub fn to_junit(&self) -> String {
        let mut cases = Vec::new();
        for evaluation in &self.evaluations {
            let mut metrics: Vec<&String> = evaluation.sample.metrics.keys().collect();
            metrics.sort();
            for metric in metrics {
                let mut failures = Vec::new();
                for violation in evaluation.violations.iter().filter(|v| &v.metric == metric) {
                    failures.push(format!(
                        "{} budget exceeded: {:.2} vs {:.2} ({})",
                        metric,
                        violation.actual,
                        violation.budget,
                        violation.severity.as_str()
                    ));
                }
                for regression in evaluation.regressions.iter().filter(|r| &r.metric == metric) {
                    failures.push(format!(
                        "{} regressed {:.1}% against baseline {:.2} ({})",
                        metric,
                        regression.change_percent,
                        regression.baseline,
                        regression.level.as_str()
                    ));
                }
                cases.push((evaluation.series.clone(), metric.clone(), failures));
            }
        }

        let failures = cases.iter().filter(|(_, _, f)| !f.is_empty()).count();
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            out,
            "<testsuites><testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"0\" timestamp=\"{}\">",
            xml_escape(&self.monitor),
            cases.len(),
            failures,
            self.generated_at.to_rfc3339()
        );
        for (series, metric, failures) in &cases {
            let _ = write!(
                out,
                "<testcase classname=\"{}\" name=\"{}\">",
                xml_escape(series),
                xml_escape(metric)
            );
            if !failures.is_empty() {
                let detail = failures.join("; ");
                let _ = write!(
                    out,
                    "<failure message=\"{}\">{}</failure>",
                    xml_escape(&detail),
                    xml_escape(&detail)
                );
            }
            out.push_str("</testcase>\n");
        }
        out.push_str("</testsuite></testsuites>\n");
        out
    }

    /// Human-readable stdout report.
    pub fn to_console(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} report ({})",
            self.monitor,
            self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        for warning in &self.warnings {
            let _ = writeln!(out, "  ! {warning}");
        }

        for evaluation in &self.evaluations {
            let _ = writeln!(
                out,
                "\n[{}] source: {}",
                evaluation.series,
                if evaluation.sample.source.is_empty() {
                    "unknown"
                } else {
                    &evaluation.sample.source
                }
            );
            for (metric, value) in &evaluation.sample.metrics {
                let mark = if evaluation.violations.iter().any(|v| &v.metric == metric) {
                    "FAIL"
                } else {
                    "ok"
                };
                match evaluation.baseline.get(metric) {
                    Some(baseline) => {
                        let _ = writeln!(
                            out,
                            "  {mark:>4}  {metric:<16} {value:>10.2}  (baseline {baseline:.2})"
                        );
                    }
                    None => {
                        let _ = writeln!(out, "  {mark:>4}  {metric:<16} {value:>10.2}");
                    }
                }
            }
            for violation in &evaluation.violations {
                let _ = writeln!(
                    out,
                    "  {} budget violation: {} {:.2} > {:.2} (x{:.2})",
                    violation.severity.as_str().to_uppercase(),
                    violation.metric,
                    violation.actual,
                    violation.budget,
                    violation.ratio
                );
            }
            for regression in &evaluation.regressions {
                let _ = writeln!(
                    out,
                    "  {} regression: {} {:+.1}% vs baseline {:.2}",
                    regression.level.as_str().to_uppercase(),
                    regression.metric,
                    regression.change_percent,
                    regression.baseline
                );
            }
        }

        let status = match self.status() {
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
        };
        let _ = writeln!(
            out,
            "\nStatus: {status} ({} critical issue{})",
            self.critical_count(),
            if self.critical_count() == 1 { "" } else { "s" }
        );
        out
    }
}

pub fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
}
