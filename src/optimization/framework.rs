use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{
    rules::{default_rules, RecommendationRule},
    snapshot::OptimizationSnapshot,
};
use crate::models::Priority;
use crate::utils::paths;
use crate::{log_debug, log_info, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "optimization";

/// Events that make the current recommendation list stale.
pub const REANALYZE_EVENTS: [&str; 2] = ["conversion_milestone", "user_segment_updated"];

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub rule_id: String,
    pub category: String,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub actions: Vec<String>,
    pub expected_impact: String,
    pub metrics: BTreeMap<String, Value>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    fn from_rule(
        rule: &RecommendationRule,
        document: &Value,
        confidence: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let metrics = rule
            .metrics
            .iter()
            .filter_map(|path| {
                paths::resolve(document, path).map(|value| (path.clone(), value.clone()))
            })
            .collect();

        Self {
            id: format!("rec_{}", rule.id),
            rule_id: rule.id.clone(),
            category: rule.category.clone(),
            priority: rule.priority,
            title: rule.title.clone(),
            description: rule.description.clone(),
            actions: rule.actions.clone(),
            expected_impact: rule.expected_impact.clone(),
            metrics,
            confidence,
            created_at: now,
        }
    }
}

/// Confidence in `[0.1, 1.0]` from data completeness, snapshot age and priority.
pub fn confidence(snapshot: &OptimizationSnapshot, priority: Priority, now: DateTime<Utc>) -> f64 {
    let age = now.signed_duration_since(snapshot.captured_at);
    let recency = if age < chrono::Duration::hours(1) {
        0.2
    } else if age < chrono::Duration::hours(24) {
        0.1
    } else {
        0.0
    };
    let base = 0.5 + 0.1 * snapshot.source_count() as f64 + recency;
    (base * priority.confidence_multiplier()).clamp(0.1, 1.0)
}

/// Stable: equal weight and confidence keep their input order.
pub fn prioritize(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.priority
            .weight()
            .cmp(&a.priority.weight())
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
}

/// Rule table evaluation plus the session's accumulated recommendation list.
pub struct OptimizationFramework {
    rules: Vec<RecommendationRule>,
    recommendations: Mutex<Vec<Recommendation>>,
}

impl Default for OptimizationFramework {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl OptimizationFramework {
    pub fn new(rules: Vec<RecommendationRule>) -> Self {
        Self {
            rules,
            recommendations: Mutex::new(Vec::new()),
        }
    }

    pub fn rules(&self) -> &[RecommendationRule] {
        &self.rules
    }

    /// Every rule whose condition holds, prioritized. Does not touch the
    /// accumulated list.
    pub fn analyze(
        &self,
        snapshot: &OptimizationSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let document = match serde_json::to_value(snapshot) {
            Ok(document) => document,
            Err(err) => {
                log_warn!("snapshot could not be serialized, skipping analysis: {err}");
                return Vec::new();
            }
        };

        let mut fired: Vec<Recommendation> = self
            .rules
            .iter()
            .filter(|rule| rule.condition.holds(&document))
            .map(|rule| {
                let score = confidence(snapshot, rule.priority, now);
                Recommendation::from_rule(rule, &document, score, now)
            })
            .collect();
        prioritize(&mut fired);

        log_debug!(
            "{} of {} rules fired ({} data sources)",
            fired.len(),
            self.rules.len(),
            snapshot.source_count()
        );
        fired
    }

    /// Analyzes and merges into the session list. Ids already present are
    /// kept as they were. Returns the number of new entries.
    pub fn refresh(&self, snapshot: &OptimizationSnapshot, now: DateTime<Utc>) -> usize {
        let fresh = self.analyze(snapshot, now);
        let mut current = lock(&self.recommendations);
        let known: HashSet<String> = current.iter().map(|r| r.id.clone()).collect();

        let before = current.len();
        current.extend(fresh.into_iter().filter(|r| !known.contains(&r.id)));
        prioritize(&mut current);

        let added = current.len() - before;
        if added > 0 {
            log_info!("{added} new recommendations ({} total)", current.len());
        }
        added
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        lock(&self.recommendations).clone()
    }

    pub fn should_reanalyze(event_name: &str) -> bool {
        REANALYZE_EVENTS.contains(&event_name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Re-runs [`OptimizationFramework::refresh`] every `period` with a fresh
/// snapshot until `cancel_token` fires. The first pass runs immediately.
pub fn spawn_periodic_analysis<F>(
    framework: Arc<OptimizationFramework>,
    snapshot_source: F,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()>
where
    F: Fn() -> OptimizationSnapshot + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = snapshot_source();
                    framework.refresh(&snapshot, Utc::now());
                }
                _ = cancel_token.cancelled() => {
                    log_info!("periodic optimization analysis stopped");
                    break;
                }
            }
        }
    })
}
