//! The monitor runs behind each binary, kept here so they can be driven
//! from tests without spawning processes.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};

use super::{
    bundle::{bundle_sample, kilobytes, largest, scan_dist},
    config::SeriesConfig,
    dashboard::{self, DashboardSeries},
    history::History,
    report::{write_file, MonitorReport},
    series::MetricSeriesMonitor,
    sources::{measure_with_fallback, HttpProbeSource, LighthouseReportSource, HTTP_PROBE_SOURCE},
    types::{Evaluation, MetricSample},
};
use crate::optimization::OptimizationFramework;
use crate::settings::MonitorSettings;
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "monitor";

/// Process exit codes shared by the binaries.
pub const EXIT_OK: i32 = 0;
pub const EXIT_CRITICAL: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    pub export: bool,
    pub junit: bool,
}

/// Evaluates a sample against the series' persisted history and saves the
/// updated history.
pub fn evaluate_series(
    config: &SeriesConfig,
    settings: &MonitorSettings,
    sample: MetricSample,
) -> Result<Evaluation> {
    let path = settings.paths.history_file(&config.name);
    let history = History::load(&path, config.history_cap)?;
    let mut monitor = MetricSeriesMonitor::with_history(config.clone(), history);
    let evaluation = monitor.evaluate(sample);
    monitor.history().save(&path)?;
    Ok(evaluation)
}

/// Sizes the build output. A missing dist directory is a load error.
pub fn run_bundle(
    settings: &MonitorSettings,
    dist: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<MonitorReport> {
    let dist = dist.unwrap_or(settings.paths.dist_dir.as_path());
    let files = scan_dist(dist)?;
    log_info!("scanned {} files in {}", files.len(), dist.display());

    let mut report = MonitorReport::new(&settings.bundle.name, now);
    let evaluation = evaluate_series(&settings.bundle, settings, bundle_sample(&files, now))?;
    if !evaluation.violations.is_empty() {
        for file in largest(&files, 3) {
            report.warnings.push(format!(
                "large asset {} ({:.1} KB)",
                file.path.display(),
                kilobytes(file.bytes)
            ));
        }
    }
    report.evaluations.push(evaluation);
    Ok(report)
}

/// Measures the live site. Measurement failures end up as report warnings,
/// never as errors; only history and settings problems are fatal.
pub async fn run_performance(
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> Result<MonitorReport> {
    let mut report = MonitorReport::new(&settings.web_vitals.name, now);

    let probe = match HttpProbeSource::new(
        &settings.probe.base_url,
        settings.probe.pages.clone(),
        settings.probe.timeout(),
    ) {
        Ok(probe) => probe,
        Err(err) => {
            log_warn!("{err}");
            report.warnings.push(err.to_string());
            return Ok(report);
        }
    };
    let lighthouse = settings
        .probe
        .lighthouse_report
        .as_ref()
        .map(|path| LighthouseReportSource::new(path.clone()));

    let measurement = match measure_with_fallback(lighthouse.as_ref(), &probe, now).await {
        Ok(measurement) => measurement,
        Err(err) => {
            log_warn!("no measurement taken: {err}");
            report.warnings.push(format!("no measurement taken: {err}"));
            return Ok(report);
        }
    };
    if lighthouse.is_some() && measurement.vitals.source == HTTP_PROBE_SOURCE {
        report
            .warnings
            .push("Lighthouse report unusable; used HTTP probe timings".into());
    }

    // Empty samples would take a baseline slot without carrying a value.
    if measurement.vitals.metrics.is_empty() {
        log_warn!("no web vitals in {} measurement", measurement.vitals.source);
        report.warnings.push(format!(
            "no web vitals in {} measurement; history left unchanged",
            measurement.vitals.source
        ));
    } else {
        report
            .evaluations
            .push(evaluate_series(&settings.web_vitals, settings, measurement.vitals)?);
    }
    if let Some(scores) = measurement.scores.filter(|s| !s.metrics.is_empty()) {
        report
            .evaluations
            .push(evaluate_series(&settings.lighthouse, settings, scores)?);
    }
    Ok(report)
}

/// Writes the optional JSON / JUnit files. Returns what was written.
pub fn write_outputs(
    report: &MonitorReport,
    settings: &MonitorSettings,
    options: OutputOptions,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if options.export {
        written.push(report.export_json(&settings.paths.reports_dir)?);
    }
    if options.junit {
        written.push(report.export_junit(&settings.paths.reports_dir)?);
    }
    Ok(written)
}

pub fn exit_code(report: &MonitorReport, ci: bool) -> i32 {
    if ci && report.has_critical() {
        EXIT_CRITICAL
    } else {
        EXIT_OK
    }
}

/// Renders the dashboard from the persisted histories.
pub fn build_dashboard(
    settings: &MonitorSettings,
    output: Option<&Path>,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let series = [&settings.web_vitals, &settings.bundle, &settings.lighthouse]
        .into_iter()
        .map(|config| {
            let history =
                History::load(&settings.paths.history_file(&config.name), config.history_cap)?;
            Ok(DashboardSeries {
                config: config.clone(),
                history,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let evaluations: Vec<Evaluation> = series
        .iter()
        .filter_map(DashboardSeries::latest_evaluation)
        .collect();
    let recommendations =
        dashboard::recommendations_for(&evaluations, &OptimizationFramework::default(), now);

    let path = output
        .unwrap_or(settings.paths.dashboard_output.as_path())
        .to_path_buf();
    write_file(&path, &dashboard::render(&series, &recommendations, now))?;
    log_info!(
        "dashboard written to {} ({} recommendations)",
        path.display(),
        recommendations.len()
    );
    Ok(path)
}
