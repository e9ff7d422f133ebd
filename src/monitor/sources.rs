use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::types::MetricSample;
use crate::utils::{paths, stats};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "monitor::sources";

/// Audit ids in a Lighthouse report and the vital each one maps to.
const LIGHTHOUSE_AUDITS: [(&str, &str); 5] = [
    ("largest-contentful-paint", "lcp"),
    ("max-potential-fid", "fid"),
    ("cumulative-layout-shift", "cls"),
    ("first-contentful-paint", "fcp"),
    ("server-response-time", "ttfb"),
];

pub const HTTP_PROBE_SOURCE: &str = "http-probe";

const LIGHTHOUSE_CATEGORIES: [&str; 4] = ["performance", "accessibility", "best-practices", "seo"];

#[derive(Debug, Error)]
pub enum MeasurementError {
    #[error("measurement source unavailable: {0}")]
    Unavailable(String),
    #[error("measurement timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not parse measurement: {0}")]
    Parse(String),
}

/// Web vitals plus, when the audit tool produced them, category scores.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub vitals: MetricSample,
    pub scores: Option<MetricSample>,
}

/// Reads the JSON report written by a Lighthouse run.
pub struct LighthouseReportSource {
    path: PathBuf,
}

impl LighthouseReportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn measure(&self, now: DateTime<Utc>) -> Result<Measurement, MeasurementError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            MeasurementError::Unavailable(format!("{}: {err}", self.path.display()))
        })?;
        parse_lighthouse_report(&raw, now)
    }
}

pub fn parse_lighthouse_report(
    raw: &str,
    now: DateTime<Utc>,
) -> Result<Measurement, MeasurementError> {
    let report: Value =
        serde_json::from_str(raw).map_err(|err| MeasurementError::Parse(err.to_string()))?;

    let mut vitals = MetricSample::new(now, "lighthouse");
    for (audit, metric) in LIGHTHOUSE_AUDITS {
        if let Some(value) = paths::resolve_f64(&report, &format!("audits.{audit}.numericValue")) {
            vitals.metrics.insert(metric.to_string(), value);
        }
    }

    let mut scores = MetricSample::new(now, "lighthouse");
    for category in LIGHTHOUSE_CATEGORIES {
        if let Some(score) = paths::resolve_f64(&report, &format!("categories.{category}.score")) {
            scores.metrics.insert(category.to_string(), (score * 100.0).round());
        }
    }

    if vitals.metrics.is_empty() && scores.metrics.is_empty() {
        return Err(MeasurementError::Parse(
            "report has neither audits nor category scores".into(),
        ));
    }

    Ok(Measurement {
        vitals,
        scores: (!scores.metrics.is_empty()).then_some(scores),
    })
}

/// Local fallback: times plain HTTP fetches of the site's pages.
///
/// Reports `ttfb` (until response headers) and `load` (until the body is
/// fully read), each the median across pages.
pub struct HttpProbeSource {
    client: reqwest::Client,
    base_url: String,
    pages: Vec<String>,
    timeout: Duration,
}

impl HttpProbeSource {
    pub fn new(
        base_url: &str,
        pages: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, MeasurementError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| MeasurementError::Unavailable(err.to_string()))?;
        let pages = if pages.is_empty() {
            vec!["/".to_string()]
        } else {
            pages
        };
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pages,
            timeout,
        })
    }

    pub async fn measure(&self, now: DateTime<Utc>) -> Result<MetricSample, MeasurementError> {
        let mut ttfb = Vec::with_capacity(self.pages.len());
        let mut load = Vec::with_capacity(self.pages.len());

        for page in &self.pages {
            let url = format!("{}/{}", self.base_url, page.trim_start_matches('/'));
            let (first_byte, complete) =
                match tokio::time::timeout(self.timeout, self.fetch(&url)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(MeasurementError::Timeout(self.timeout)),
                };
            ttfb.push(first_byte);
            load.push(complete);
        }

        let mut sample = MetricSample::new(now, HTTP_PROBE_SOURCE);
        if let Some(value) = stats::median(&ttfb) {
            sample.metrics.insert("ttfb".into(), value);
        }
        if let Some(value) = stats::median(&load) {
            sample.metrics.insert("load".into(), value);
        }
        Ok(sample)
    }

    async fn fetch(&self, url: &str) -> Result<(f64, f64), MeasurementError> {
        let started = Instant::now();
        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                MeasurementError::Timeout(self.timeout)
            } else {
                MeasurementError::Unavailable(format!("{url}: {err}"))
            }
        })?;
        let first_byte = started.elapsed().as_secs_f64() * 1000.0;

        let status = response.status();
        if !status.is_success() {
            return Err(MeasurementError::Unavailable(format!("{url}: HTTP {status}")));
        }
        response
            .bytes()
            .await
            .map_err(|err| MeasurementError::Unavailable(format!("{url}: {err}")))?;
        Ok((first_byte, started.elapsed().as_secs_f64() * 1000.0))
    }
}

/// Uses the Lighthouse report when there is one and it parses; otherwise
/// logs why and probes the site directly. Single attempt each.
pub async fn measure_with_fallback(
    lighthouse: Option<&LighthouseReportSource>,
    probe: &HttpProbeSource,
    now: DateTime<Utc>,
) -> Result<Measurement, MeasurementError> {
    if let Some(source) = lighthouse {
        match source.measure(now).await {
            Ok(measurement) => {
                log_info!("using Lighthouse report {}", source.path().display());
                return Ok(measurement);
            }
            Err(err) => log_warn!("{err}; falling back to HTTP probe"),
        }
    }

    let vitals = probe.measure(now).await?;
    Ok(Measurement {
        vitals,
        scores: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    const REPORT: &str = r#"{
        "categories": {
            "performance": {"score": 0.87},
            "accessibility": {"score": 0.96},
            "best-practices": {"score": 1.0},
            "seo": {"score": null}
        },
        "audits": {
            "largest-contentful-paint": {"numericValue": 2710.4},
            "cumulative-layout-shift": {"numericValue": 0.02},
            "server-response-time": {"numericValue": 120}
        }
    }"#;

    async fn serve(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn parses_audits_and_scores() {
        let measurement = parse_lighthouse_report(REPORT, Utc::now()).unwrap();
        assert_eq!(measurement.vitals.get("lcp"), Some(2710.4));
        assert_eq!(measurement.vitals.get("ttfb"), Some(120.0));
        assert_eq!(measurement.vitals.get("fid"), None);

        let scores = measurement.scores.unwrap();
        assert_eq!(scores.get("performance"), Some(87.0));
        assert_eq!(scores.get("best-practices"), Some(100.0));
        assert_eq!(scores.get("seo"), None);
    }

    #[test]
    fn rejects_reports_without_data() {
        assert!(matches!(
            parse_lighthouse_report("{}", Utc::now()),
            Err(MeasurementError::Parse(_))
        ));
        assert!(matches!(
            parse_lighthouse_report("nope", Utc::now()),
            Err(MeasurementError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn probe_times_each_page() {
        let base = serve("<html></html>").await;
        let probe = HttpProbeSource::new(
            &base,
            vec!["/".into(), "/about".into()],
            Duration::from_secs(5),
        )
        .unwrap();

        let sample = probe.measure(Utc::now()).await.unwrap();
        assert_eq!(sample.source, "http-probe");
        let ttfb = sample.get("ttfb").unwrap();
        let load = sample.get("load").unwrap();
        assert!(ttfb >= 0.0 && load >= ttfb);
    }

    #[tokio::test]
    async fn probe_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let probe = HttpProbeSource::new(
            &format!("http://{addr}"),
            Vec::new(),
            Duration::from_millis(100),
        )
        .unwrap();
        assert!(matches!(
            probe.measure(Utc::now()).await,
            Err(MeasurementError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn missing_report_falls_back_to_probe() {
        let base = serve("ok").await;
        let probe = HttpProbeSource::new(&base, Vec::new(), Duration::from_secs(5)).unwrap();
        let report = LighthouseReportSource::new("/nonexistent/lighthouse.json");

        let measurement = measure_with_fallback(Some(&report), &probe, Utc::now())
            .await
            .unwrap();
        assert_eq!(measurement.vitals.source, "http-probe");
        assert!(measurement.scores.is_none());
    }
}
