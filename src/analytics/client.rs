use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{
    config::AnalyticsConfig,
    sink::{AnalyticsBackend, Consent, EventSink, SinkMode},
};
use crate::experiments::{EventKind, ExperimentFramework};
use crate::journey::{
    FrustrationSignal, JourneyAnalyzer, JourneyInsights, JourneySample, SampleKind,
};
use crate::models::{ProfileUpdate, UserProfile};
use crate::optimization::{
    spawn_periodic_analysis, JourneySummary, OptimizationFramework, OptimizationSnapshot,
    PerformanceSummary, Recommendation, SegmentationSummary,
};
use crate::profile::UserProfileStore;
use crate::segmentation::{rules::default_catalog, SegmentationEngine};
use crate::storage::KeyValueStore;
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "analytics";

/// Tracked visitor actions that feed the behavior counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    LinkedinClick,
    ResumeDownload,
    CaseStudyView,
    CaseStudyComplete,
    ContactPageVisit,
}

impl Behavior {
    pub fn event_name(&self) -> &'static str {
        match self {
            Behavior::LinkedinClick => "linkedin_click",
            Behavior::ResumeDownload => "resume_download",
            Behavior::CaseStudyView => "case_study_view",
            Behavior::CaseStudyComplete => "case_study_complete",
            Behavior::ContactPageVisit => "contact_page_visit",
        }
    }

    fn update(&self) -> ProfileUpdate {
        let mut update = ProfileUpdate::default();
        match self {
            Behavior::LinkedinClick => update.linkedin_clicks = 1,
            Behavior::ResumeDownload => update.resume_downloads = 1,
            Behavior::CaseStudyView => update.case_study_views = 1,
            Behavior::CaseStudyComplete => update.case_studies_completed = 1,
            Behavior::ContactPageVisit => update.contact_page_visits = 1,
        }
        update
    }
}

/// The analytics entry point for one browser.
///
/// Constructed once and handed to whatever needs it; all methods take
/// `&self` so it can sit behind an `Arc` shared with the periodic tasks.
pub struct AnalyticsClient {
    config: AnalyticsConfig,
    sink: EventSink,
    profiles: UserProfileStore,
    journey: Mutex<JourneyAnalyzer>,
    experiments: ExperimentFramework,
    optimization: Arc<OptimizationFramework>,
    performance: Mutex<Option<PerformanceSummary>>,
    user_id: String,
}

impl AnalyticsClient {
    pub fn new(
        config: AnalyticsConfig,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn AnalyticsBackend>,
    ) -> Self {
        let engine = Arc::new(SegmentationEngine::new(
            default_catalog(),
            config.scoring.clone(),
        ));
        Self::with_parts(
            config,
            store.clone(),
            backend,
            engine,
            ExperimentFramework::new(store),
            OptimizationFramework::default(),
        )
    }

    pub fn with_parts(
        config: AnalyticsConfig,
        store: Arc<dyn KeyValueStore>,
        backend: Arc<dyn AnalyticsBackend>,
        engine: Arc<SegmentationEngine>,
        experiments: ExperimentFramework,
        optimization: OptimizationFramework,
    ) -> Self {
        let profiles = UserProfileStore::new(store.clone(), engine);
        let user_id = profiles.get_or_create_id();
        log_info!("analytics client ready for {user_id}");

        Self {
            sink: EventSink::new(backend, store),
            journey: Mutex::new(JourneyAnalyzer::new(config.journey.clone())),
            profiles,
            experiments,
            optimization: Arc::new(optimization),
            performance: Mutex::new(None),
            user_id,
            config,
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn profiles(&self) -> &UserProfileStore {
        &self.profiles
    }

    pub fn experiments(&self) -> &ExperimentFramework {
        &self.experiments
    }

    pub fn optimization(&self) -> Arc<OptimizationFramework> {
        self.optimization.clone()
    }

    pub fn profile(&self) -> UserProfile {
        self.profiles.load(&self.user_id)
    }

    /// Waits for the collector script, then flushes whatever consent allows.
    pub async fn connect(&self) -> SinkMode {
        self.sink
            .wait_for_backend(
                self.config.backend_poll_attempts,
                self.config.backend_poll_interval,
            )
            .await
    }

    pub fn set_consent(&self, consent: Consent) {
        self.sink.set_consent(consent);
    }

    pub fn track_page_view(&self, page: &str, at: DateTime<Utc>) {
        let signals = self.with_journey(|journey| {
            journey.record(JourneySample::new(
                SampleKind::PageView {
                    page: page.to_string(),
                },
                at,
            ))
        });
        self.forward_signals(&signals);

        let mut update = ProfileUpdate::page_view();
        if page.contains("contact") {
            update.contact_page_visits = 1;
        }
        self.sink.track(
            "page_view",
            params(json!({"page": page, "user_id": self.user_id})),
        );
        self.apply_update(&update, at);
    }

    pub fn track_click(&self, x: f64, y: f64, element: Option<&str>, at: DateTime<Utc>) {
        let mut sample = JourneySample::click(x, y, at);
        if let Some(element) = element {
            sample = sample.with_element(element);
        }
        let signals = self.with_journey(|journey| journey.record(sample));
        self.forward_signals(&signals);
        self.apply_update(&ProfileUpdate::click(), at);
    }

    /// Scroll position as a percentage. Reports the deepest quarter of the
    /// page newly reached, if any.
    pub fn track_scroll(&self, depth: f64, at: DateTime<Utc>) {
        let signals = self.with_journey(|journey| journey.record(JourneySample::scroll(depth, at)));
        self.forward_signals(&signals);

        let previous = self.profile().max_scroll_depth;
        let depth = depth.clamp(0.0, 100.0).round() as u8;
        self.apply_update(&ProfileUpdate::scroll(depth), at);

        if let Some(quarter) = [25u8, 50, 75, 100]
            .into_iter()
            .rev()
            .find(|q| previous < *q && depth >= *q)
        {
            self.sink.track("scroll_depth", params(json!({"percent": quarter})));
        }
    }

    pub fn track_attention(&self, x: f64, y: f64, dwell_ms: u64, element: &str, at: DateTime<Utc>) {
        let sample =
            JourneySample::new(SampleKind::Attention { x, y, dwell_ms }, at).with_element(element);
        self.with_journey(|journey| journey.record(sample));
    }

    pub fn track_time_on_page(&self, ms: u64, at: DateTime<Utc>) {
        self.apply_update(&ProfileUpdate::time_on_page(ms), at);
        self.sink
            .track("time_on_page", params(json!({"milliseconds": ms})));
    }

    pub fn track_form_start(&self, form: &str, at: DateTime<Utc>) {
        let sample = JourneySample::new(
            SampleKind::FormStart {
                form: form.to_string(),
            },
            at,
        );
        self.with_journey(|journey| journey.record(sample));
    }

    pub fn track_form_submit(&self, form: &str, at: DateTime<Utc>) {
        let sample = JourneySample::new(
            SampleKind::FormSubmit {
                form: form.to_string(),
            },
            at,
        );
        self.with_journey(|journey| journey.record(sample));
        self.sink.track("form_submit", params(json!({"form": form})));
    }

    pub fn track_behavior(&self, behavior: Behavior, at: DateTime<Utc>) {
        self.sink.track(
            behavior.event_name(),
            params(json!({"user_id": self.user_id})),
        );
        self.apply_update(&behavior.update(), at);
    }

    /// A completed goal (contact form sent, resume downloaded ...). Marks the
    /// open journey as converted and counts it for every experiment the
    /// visitor is enrolled in.
    pub fn track_conversion(&self, goal: &str, at: DateTime<Utc>) {
        self.with_journey(|journey| journey.mark_conversion());
        self.sink.track(
            "conversion",
            params(json!({"goal": goal, "user_id": self.user_id})),
        );
        for experiment_id in self.enrolled_experiments() {
            self.record_experiment_event(&experiment_id, EventKind::Conversion, 1, at);
        }
        self.refresh_recommendations(at);
    }

    /// Enrolls the visitor (sticky) and reports the exposure.
    pub fn enter_experiment(&self, experiment_id: &str, at: DateTime<Utc>) -> Option<String> {
        let variant = self
            .experiments
            .assign_variant_at(&self.user_id, experiment_id, at)?;
        self.record_experiment_event(experiment_id, EventKind::View, 1, at);
        self.sink.track(
            "experiment_view",
            params(json!({"experiment_id": experiment_id, "variant": variant})),
        );
        Some(variant)
    }

    /// Counts an event against the visitor's variant. Ignored when the
    /// visitor is not enrolled.
    pub fn record_experiment_event(
        &self,
        experiment_id: &str,
        kind: EventKind,
        amount: u64,
        at: DateTime<Utc>,
    ) {
        let Some(variant) = self.experiments.user_variant(&self.user_id, experiment_id) else {
            return;
        };
        if let Err(err) =
            self.experiments
                .record_event_at(experiment_id, &variant, kind, amount, at)
        {
            log_debug!("experiment event dropped: {err:#}");
        }
    }

    /// Closes the current page sequence; open forms are reported as abandoned.
    pub fn end_session(&self, at: DateTime<Utc>) {
        let signals = self.with_journey(|journey| journey.end_journey(at));
        self.forward_signals(&signals);
    }

    pub fn set_performance(&self, summary: PerformanceSummary) {
        *lock(&self.performance) = Some(summary);
    }

    pub fn journey_insights(&self) -> JourneyInsights {
        self.with_journey(|journey| journey.insights())
    }

    pub fn snapshot(&self, at: DateTime<Utc>) -> OptimizationSnapshot {
        let profile = self.profile();
        OptimizationSnapshot {
            captured_at: at,
            performance: lock(&self.performance).clone(),
            journey: Some(JourneySummary::from(&self.journey_insights())),
            segmentation: Some(SegmentationSummary::from(&profile)),
        }
    }

    pub fn refresh_recommendations(&self, at: DateTime<Utc>) -> usize {
        let snapshot = self.snapshot(at);
        self.optimization.refresh(&snapshot, at)
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        self.optimization.recommendations()
    }

    /// Recomputes segments and conversion probability with no new activity.
    pub fn reevaluate(&self, at: DateTime<Utc>) {
        let before = self.profile();
        let after = self.profiles.reevaluate_at(&self.user_id, at);
        self.announce_changes(&before, &after, at);
    }

    fn apply_update(&self, update: &ProfileUpdate, at: DateTime<Utc>) {
        let before = self.profile();
        let after = self.profiles.update_at(&self.user_id, update, at);
        self.announce_changes(&before, &after, at);
    }

    fn announce_changes(&self, before: &UserProfile, after: &UserProfile, at: DateTime<Utc>) {
        let mut reanalyze = false;

        if before.segments != after.segments {
            self.sink.track(
                "user_segment_updated",
                params(json!({
                    "segments": after.segments,
                    "lead_score": after.lead_score,
                    "conversion_probability": after.conversion_probability,
                })),
            );
            reanalyze |= OptimizationFramework::should_reanalyze("user_segment_updated");
        }

        for milestone in &self.config.lead_milestones {
            if before.lead_score < *milestone && after.lead_score >= *milestone {
                self.sink.track(
                    "conversion_milestone",
                    params(json!({"milestone": milestone, "lead_score": after.lead_score})),
                );
                reanalyze |= OptimizationFramework::should_reanalyze("conversion_milestone");
            }
        }

        if reanalyze {
            self.refresh_recommendations(at);
        }
    }

    fn forward_signals(&self, signals: &[FrustrationSignal]) {
        for signal in signals {
            self.sink.track(
                signal.kind.event_name(),
                params(json!({
                    "page": signal.page,
                    "element": signal.element,
                    "detail": signal.detail,
                })),
            );
        }
    }

    fn enrolled_experiments(&self) -> Vec<String> {
        self.experiments.experiments_for(&self.user_id)
    }

    fn with_journey<R>(&self, f: impl FnOnce(&mut JourneyAnalyzer) -> R) -> R {
        f(&mut lock(&self.journey))
    }
}

fn params(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Re-evaluates the visitor's segments every `period` so conversion
/// probability decays while they are idle.
pub fn spawn_reevaluation(
    client: Arc<AnalyticsClient>,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately; skip it so the pass runs after one period
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => client.reevaluate(Utc::now()),
                _ = cancel_token.cancelled() => {
                    log_info!("segment re-evaluation stopped");
                    break;
                }
            }
        }
    })
}

/// Starts both background timers for a client: segment re-evaluation and
/// the periodic optimization pass. Both stop when `cancel_token` fires.
pub fn spawn_background(
    client: &Arc<AnalyticsClient>,
    cancel_token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let reevaluation = spawn_reevaluation(
        client.clone(),
        client.config.reevaluation_interval,
        cancel_token.clone(),
    );
    let source = client.clone();
    let analysis = spawn_periodic_analysis(
        client.optimization(),
        move || source.snapshot(Utc::now()),
        client.config.optimization_interval,
        cancel_token,
    );
    vec![reevaluation, analysis]
}
