use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::{
    config::SeriesConfig,
    history::History,
    report::xml_escape,
    series::MetricSeriesMonitor,
    types::{Evaluation, MetricSample},
};
use crate::optimization::{
    OptimizationFramework, OptimizationSnapshot, PerformanceSummary, Recommendation,
};

const PALETTE: [&str; 6] = ["#2563eb", "#dc2626", "#16a34a", "#d97706", "#7c3aed", "#0891b2"];
const CHART_JS: &str = "https://cdn.jsdelivr.net/npm/chart.js@4";

/// One series as the dashboard shows it: its history and the latest
/// evaluation of the newest entry.
pub struct DashboardSeries {
    pub config: SeriesConfig,
    pub history: History,
}

impl DashboardSeries {
    /// Re-evaluates the newest entry against the ones before it.
    pub fn latest_evaluation(&self) -> Option<Evaluation> {
        let latest = self.history.latest()?.clone();
        let mut earlier = History::new(self.history.cap());
        let count = self.history.len();
        for sample in self.history.iter().take(count.saturating_sub(1)) {
            earlier.push(sample.clone());
        }
        Some(MetricSeriesMonitor::with_history(self.config.clone(), earlier).evaluate(latest))
    }

    /// Chart.js line chart config: one dataset per metric plus a dashed
    /// budget line where one exists.
    pub fn chart_config(&self) -> Value {
        let labels: Vec<String> = self
            .history
            .iter()
            .map(|s| s.timestamp.format("%m-%d %H:%M").to_string())
            .collect();

        let mut metrics: Vec<&String> = self
            .history
            .iter()
            .flat_map(|s: &MetricSample| s.metrics.keys())
            .collect();
        metrics.sort();
        metrics.dedup();

        let mut datasets = Vec::new();
        for (i, metric) in metrics.iter().enumerate() {
            let color = PALETTE[i % PALETTE.len()];
            let data: Vec<Value> = self
                .history
                .iter()
                .map(|s| s.get(metric).map_or(Value::Null, |v| json!(v)))
                .collect();
            datasets.push(json!({
                "label": metric,
                "data": data,
                "borderColor": color,
                "fill": false,
                "tension": 0.2,
            }));
            if let Some(budget) = self.config.budgets.get(*metric) {
                datasets.push(json!({
                    "label": format!("{metric} budget"),
                    "data": vec![budget; labels.len()],
                    "borderColor": color,
                    "borderDash": [6, 4],
                    "pointRadius": 0,
                    "fill": false,
                }));
            }
        }

        json!({
            "type": "line",
            "data": {"labels": labels, "datasets": datasets},
            "options": {
                "responsive": true,
                "plugins": {"title": {"display": true, "text": format!("{} ({})", self.config.name, self.config.unit)}},
                "scales": {"y": {"beginAtZero": true}},
            },
        })
    }
}

/// Latest numbers of every series folded into what the optimization rules read.
pub fn performance_summary(evaluations: &[Evaluation]) -> PerformanceSummary {
    let mut summary = PerformanceSummary::default();
    for evaluation in evaluations {
        let target = match evaluation.series.as_str() {
            "bundle-size" => &mut summary.bundle,
            "lighthouse" => &mut summary.lighthouse,
            _ => &mut summary.metrics,
        };
        target.extend(evaluation.sample.metrics.iter().map(|(k, v)| (k.clone(), *v)));
        summary.violations += evaluation.violations.len();
        summary.regressions += evaluation.regressions.len();
    }
    summary
}

pub fn recommendations_for(
    evaluations: &[Evaluation],
    framework: &OptimizationFramework,
    now: DateTime<Utc>,
) -> Vec<Recommendation> {
    let mut snapshot = OptimizationSnapshot::empty(now);
    if !evaluations.is_empty() {
        snapshot.performance = Some(performance_summary(evaluations));
    }
    framework.analyze(&snapshot, now)
}

/// Static HTML page with one chart per series, the latest violations and
/// the recommendation list. Chart configs are embedded as JSON.
pub fn render(
    series: &[DashboardSeries],
    recommendations: &[Recommendation],
    now: DateTime<Utc>,
) -> String {
    let mut body = String::new();

    for entry in series {
        let id = entry.config.name.replace(|c: char| !c.is_ascii_alphanumeric(), "-");
        let _ = writeln!(body, "<section class=\"series\">");
        let _ = writeln!(body, "  <h2>{}</h2>", xml_escape(&entry.config.name));

        if entry.history.is_empty() {
            let _ = writeln!(body, "  <p class=\"empty\">No measurements recorded yet.</p>");
            let _ = writeln!(body, "</section>");
            continue;
        }

        let config = entry.chart_config().to_string().replace("</", "<\\/");
        let _ = writeln!(body, "  <canvas id=\"chart-{id}\"></canvas>");
        let _ = writeln!(
            body,
            "  <script type=\"application/json\" data-chart=\"chart-{id}\">{config}</script>"
        );

        if let Some(evaluation) = entry.latest_evaluation() {
            let _ = writeln!(
                body,
                "  <p>{} entries, latest from {}</p>",
                entry.history.len(),
                xml_escape(&evaluation.sample.source)
            );
            if evaluation.violations.is_empty() && evaluation.regressions.is_empty() {
                let _ = writeln!(body, "  <p class=\"ok\">All budgets met.</p>");
            } else {
                let _ = writeln!(body, "  <ul class=\"issues\">");
                for v in &evaluation.violations {
                    let _ = writeln!(
                        body,
                        "    <li class=\"{}\">{}: {:.2} over budget {:.2}</li>",
                        v.severity.as_str(),
                        xml_escape(&v.metric),
                        v.actual,
                        v.budget
                    );
                }
                for r in &evaluation.regressions {
                    let _ = writeln!(
                        body,
                        "    <li class=\"{}\">{}: {:+.1}% against baseline {:.2}</li>",
                        r.level.as_str(),
                        xml_escape(&r.metric),
                        r.change_percent,
                        r.baseline
                    );
                }
                let _ = writeln!(body, "  </ul>");
            }
        }
        let _ = writeln!(body, "</section>");
    }

    let _ = writeln!(body, "<section class=\"recommendations\">\n  <h2>Recommendations</h2>");
    if recommendations.is_empty() {
        let _ = writeln!(body, "  <p class=\"ok\">Nothing to act on.</p>");
    }
    for rec in recommendations {
        let _ = writeln!(
            body,
            "  <article class=\"{}\">\n    <h3>{}</h3>\n    <p>{}</p>\n    <p class=\"meta\">{} &middot; confidence {:.0}% &middot; {}</p>\n    <ol>",
            rec.priority.as_str(),
            xml_escape(&rec.title),
            xml_escape(&rec.description),
            rec.priority.as_str(),
            rec.confidence * 100.0,
            xml_escape(&rec.expected_impact)
        );
        for action in &rec.actions {
            let _ = writeln!(body, "      <li>{}</li>", xml_escape(action));
        }
        let _ = writeln!(body, "    </ol>\n  </article>");
    }
    let _ = writeln!(body, "</section>");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Performance Dashboard</title>
    <script src="{CHART_JS}"></script>
    <style>
        body {{ font-family: system-ui, sans-serif; margin: 24px; color: #1f2937; }}
        section {{ margin-bottom: 32px; }}
        canvas {{ max-width: 960px; }}
        .critical {{ color: #b91c1c; font-weight: 600; }}
        .high, .error {{ color: #dc2626; }}
        .medium, .warning {{ color: #d97706; }}
        .ok {{ color: #15803d; }}
        .meta {{ color: #6b7280; font-size: 0.9em; }}
    </style>
</head>
<body>
    <h1>Performance Dashboard</h1>
    <p class="meta">Generated {generated}</p>
{body}
    <script>
        document.querySelectorAll('script[data-chart]').forEach(function (node) {{
            var canvas = document.getElementById(node.dataset.chart);
            new Chart(canvas, JSON.parse(node.textContent));
        }});
    </script>
</body>
</html>
"#,
        generated = now.format("%Y-%m-%d %H:%M UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bundle_series() -> DashboardSeries {
        let start = Utc::now() - Duration::days(2);
        let mut history = History::new(100);
        for (i, js) in [500.0, 520.0, 760.0].iter().enumerate() {
            history.push(
                MetricSample::new(start + Duration::hours(i as i64), "dist")
                    .with("js", *js)
                    .with("css", 120.0),
            );
        }
        DashboardSeries {
            config: SeriesConfig::bundle(),
            history,
        }
    }

    #[test]
    fn latest_entry_is_judged_against_earlier_ones() {
        let evaluation = bundle_series().latest_evaluation().unwrap();
        assert_eq!(evaluation.sample.get("js"), Some(760.0));
        assert_eq!(evaluation.baseline.get("js"), Some(&510.0));
        assert_eq!(evaluation.violations.len(), 1);
        assert_eq!(evaluation.regressions[0].metric, "js");
    }

    #[test]
    fn chart_config_has_metric_and_budget_lines() {
        let config = bundle_series().chart_config();
        let labels: Vec<&str> = config["data"]["datasets"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["label"].as_str())
            .collect();
        assert_eq!(labels, vec!["css", "css budget", "js", "js budget"]);
        assert_eq!(config["data"]["labels"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn page_embeds_charts_and_recommendations() {
        let series = vec![
            bundle_series(),
            DashboardSeries {
                config: SeriesConfig::lighthouse(),
                history: History::new(100),
            },
        ];
        let now = Utc::now();
        let evaluations: Vec<Evaluation> =
            series.iter().filter_map(DashboardSeries::latest_evaluation).collect();
        let recs = recommendations_for(&evaluations, &OptimizationFramework::default(), now);
        assert!(recs.iter().any(|r| r.id == "rec_heavy_javascript"));

        let html = render(&series, &recs, now);
        assert!(html.contains("data-chart=\"chart-bundle-size\""));
        assert!(html.contains("No measurements recorded yet."));
        assert!(html.contains("Trim the JavaScript bundle"));
    }
}
