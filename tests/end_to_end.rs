use std::{fs, sync::Arc, time::Duration};

use chrono::Utc;
use portfolio_analytics_lib::{
    analytics::{AnalyticsClient, AnalyticsConfig, Consent, EventSink, RecordingBackend, SinkMode},
    models::ProfileUpdate,
    monitor::{runner, MetricSample, MetricSeriesMonitor, SeriesConfig, Severity},
    profile::UserProfileStore,
    segmentation::SegmentationEngine,
    settings::MonitorSettings,
    storage::{MemoryStore, SqliteStore},
};
use serde_json::{json, Map, Value};
use tempfile::tempdir;

fn params(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn events_before_consent_flush_in_order() {
    let backend = Arc::new(RecordingBackend::loaded());
    let sink = EventSink::new(backend.clone(), Arc::new(MemoryStore::new()));
    assert_eq!(sink.consent(), Consent::Denied);

    sink.track("page_view", params(json!({"page": "/"})));
    sink.track("case_study_view", params(json!({"id": "checkout"})));
    sink.track("resume_download", params(json!({})));
    assert!(backend.events().is_empty());
    assert_eq!(sink.queued(), 3);

    sink.set_consent(Consent::Granted);
    assert_eq!(
        backend.names(),
        vec!["page_view", "case_study_view", "resume_download"]
    );
    assert_eq!(sink.queued(), 0);
}

#[tokio::test]
async fn collector_that_never_loads_drains_to_fallback() {
    let backend = Arc::new(RecordingBackend::default());
    let store = Arc::new(MemoryStore::new());
    let client = AnalyticsClient::new(
        AnalyticsConfig {
            backend_poll_attempts: 3,
            backend_poll_interval: Duration::from_millis(5),
            ..AnalyticsConfig::default()
        },
        store,
        backend.clone(),
    );
    client.set_consent(Consent::Granted);
    client.track_page_view("/", Utc::now());
    assert!(client.sink().queued() >= 1);

    assert_eq!(client.connect().await, SinkMode::Fallback);
    assert_eq!(client.sink().queued(), 0);
    assert!(backend.events().is_empty());
}

#[test]
fn high_value_lead_profile_scores_from_formula() {
    let engine = Arc::new(SegmentationEngine::default());
    let profiles = UserProfileStore::new(Arc::new(MemoryStore::new()), engine.clone());
    let id = profiles.get_or_create_id();
    let now = Utc::now();

    let update = ProfileUpdate {
        page_views: 5,
        session_time_ms: 400_000,
        scroll_depth: Some(80),
        linkedin_clicks: 1,
        resume_downloads: 1,
        case_studies_completed: 1,
        ..ProfileUpdate::default()
    };
    let profile = profiles.update_at(&id, &update, now);

    assert!(profile.segments.iter().any(|s| s == "high_value_leads"));

    // 2*5 + 400/60 + 0.5*80 + 0.5*0, + 10*1 + 25*1, x2.0 for a critical segment
    let expected = ((2.0 * 5.0 + 400.0 / 60.0 + 40.0 + 10.0 + 25.0) * 2.0_f64)
        .round()
        .min(100.0) as u8;
    assert_eq!(profile.lead_score, expected);
    assert_eq!(profile.lead_score, 100);

    let segments = engine.evaluate(&profile);
    assert_eq!(engine.score(&profile, &segments), profile.lead_score);
    assert!(profile.conversion_probability <= 1.0);
    assert!(profile.conversion_probability >= 0.8);
}

#[test]
fn profile_survives_a_reload_from_sqlite() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("analytics.db");
    let engine = Arc::new(SegmentationEngine::default());
    let now = Utc::now();

    let (id, written) = {
        let store = Arc::new(SqliteStore::open(path.clone()).unwrap());
        let profiles = UserProfileStore::new(store, engine.clone());
        let id = profiles.get_or_create_id();
        profiles.update_at(&id, &ProfileUpdate::page_view(), now);
        let written = profiles.update_at(&id, &ProfileUpdate::scroll(64), now);
        (id, written)
    };

    let store = Arc::new(SqliteStore::open(path.clone()).unwrap());
    let profiles = UserProfileStore::new(store, engine);
    assert_eq!(profiles.get_or_create_id(), id);
    assert_eq!(profiles.load_at(&id, now), written);
}

#[test]
fn bundle_over_budget_reports_one_medium_violation() {
    let mut config = SeriesConfig::bundle();
    config.budgets.retain(|metric, _| metric == "js" || metric == "css");
    let mut monitor = MetricSeriesMonitor::new(config);

    let evaluation = monitor.evaluate(
        MetricSample::new(Utc::now(), "dist")
            .with("js", 700.0)
            .with("css", 100.0),
    );
    assert_eq!(evaluation.violations.len(), 1);
    assert_eq!(evaluation.violations[0].metric, "js");
    assert_eq!(evaluation.violations[0].severity, Severity::Medium);
}

#[test]
fn bundle_monitor_run_against_a_dist_directory() {
    let dir = tempdir().unwrap();
    let dist = dir.path().join("dist");
    fs::create_dir_all(dist.join("assets")).unwrap();
    fs::write(dist.join("assets/app.js"), vec![0u8; 700 * 1024]).unwrap();
    fs::write(dist.join("assets/site.css"), vec![0u8; 100 * 1024]).unwrap();

    let config_path = dir.path().join("performance.config.json");
    fs::write(
        &config_path,
        serde_json::to_string(&json!({
            "paths": {
                "dist_dir": dist,
                "reports_dir": dir.path().join("reports"),
                "history_dir": dir.path().join("reports/history"),
                "dashboard_output": dir.path().join("reports/dashboard.html"),
            }
        }))
        .unwrap(),
    )
    .unwrap();
    let settings = MonitorSettings::resolve(Some(&config_path)).unwrap();

    let report = runner::run_bundle(&settings, None, Utc::now()).unwrap();
    let evaluation = &report.evaluations[0];
    assert_eq!(evaluation.violations.len(), 1);
    assert_eq!(evaluation.violations[0].severity, Severity::Medium);
    assert_eq!(runner::exit_code(&report, true), runner::EXIT_OK);

    let written = runner::write_outputs(
        &report,
        &settings,
        runner::OutputOptions {
            export: true,
            junit: true,
        },
    )
    .unwrap();
    let junit = fs::read_to_string(&written[1]).unwrap();
    assert!(junit.contains("failures=\"1\""));

    let dashboard = runner::build_dashboard(&settings, None, Utc::now()).unwrap();
    let html = fs::read_to_string(dashboard).unwrap();
    assert!(html.contains("chart-bundle-size"));
    assert!(html.contains("Trim the JavaScript bundle"));
}
