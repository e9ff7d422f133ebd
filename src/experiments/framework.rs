use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use super::{
    analysis,
    types::{EventKind, Experiment, ExperimentStatus, CONTROL, VARIANT_1},
};
use crate::storage::{self, get_typed, set_typed, KeyValueStore};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "experiments";

/// Control plus up to two variants.
const MAX_VARIATIONS: usize = 3;

/// user id -> experiment id -> variation id
type Assignments = BTreeMap<String, BTreeMap<String, String>>;

pub struct ExperimentFramework {
    store: Arc<dyn KeyValueStore>,
    experiments: Mutex<HashMap<String, Experiment>>,
    assignments: Mutex<Assignments>,
    rng: Mutex<StdRng>,
}

impl ExperimentFramework {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    pub fn with_rng(store: Arc<dyn KeyValueStore>, rng: StdRng) -> Self {
        let assignments = match get_typed::<Assignments>(store.as_ref(), storage::ASSIGNMENTS_KEY) {
            Ok(found) => found.unwrap_or_default(),
            Err(err) => {
                log_warn!("ignoring unreadable variant assignments: {err}");
                Assignments::default()
            }
        };
        Self {
            store,
            experiments: Mutex::new(HashMap::new()),
            assignments: Mutex::new(assignments),
            rng: Mutex::new(rng),
        }
    }

    /// Registers an experiment. A persisted experiment with the same id wins,
    /// so reloading a page resumes rather than resets it.
    pub fn create(&self, experiment: Experiment) -> Result<Experiment> {
        if experiment.variations.is_empty() {
            bail!("experiment '{}' has no variations", experiment.id);
        }
        if experiment.variations.len() > MAX_VARIATIONS {
            bail!(
                "experiment '{}' has {} variations, at most {MAX_VARIATIONS} allowed",
                experiment.id,
                experiment.variations.len()
            );
        }
        for required in [CONTROL, VARIANT_1] {
            if !experiment.variations.iter().any(|v| v.id == required) {
                bail!("experiment '{}' is missing the '{required}' variation", experiment.id);
            }
        }
        if experiment.sample_size == 0 {
            bail!("experiment '{}' needs a positive sample size", experiment.id);
        }

        let mut experiments = lock(&self.experiments);
        if let Some(existing) = self.cached_or_stored(&mut experiments, &experiment.id) {
            return Ok(existing.clone());
        }
        self.persist(&experiment);
        experiments.insert(experiment.id.clone(), experiment.clone());
        Ok(experiment)
    }

    pub fn get(&self, experiment_id: &str) -> Option<Experiment> {
        let mut experiments = lock(&self.experiments);
        self.cached_or_stored(&mut experiments, experiment_id).cloned()
    }

    pub fn start(&self, experiment_id: &str) -> Result<Experiment> {
        self.transition(experiment_id, |experiment, now| {
            if experiment.status != ExperimentStatus::Draft {
                bail!(
                    "cannot start experiment '{}' from {}",
                    experiment.id,
                    experiment.status.as_str()
                );
            }
            experiment.status = ExperimentStatus::Running;
            experiment.started_at = Some(now);
            Ok(())
        })
    }

    /// Ends a running experiment before it reaches its sample size.
    pub fn stop(&self, experiment_id: &str) -> Result<Experiment> {
        self.transition(experiment_id, |experiment, now| {
            if experiment.status != ExperimentStatus::Running {
                bail!(
                    "cannot stop experiment '{}' from {}",
                    experiment.id,
                    experiment.status.as_str()
                );
            }
            complete(experiment, now);
            Ok(())
        })
    }

    /// Sticky assignment: the first call draws a bucket, later calls return it.
    /// Returns `None` for unknown experiments and for new visitors of an
    /// experiment that is not running.
    pub fn assign_variant(&self, user_id: &str, experiment_id: &str) -> Option<String> {
        self.assign_variant_at(user_id, experiment_id, Utc::now())
    }

    pub fn assign_variant_at(
        &self,
        user_id: &str,
        experiment_id: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if let Some(existing) = self.user_variant(user_id, experiment_id) {
            return Some(existing);
        }

        let experiment = self.get(experiment_id)?;
        if experiment.status != ExperimentStatus::Running {
            return None;
        }

        let draw: f64 = lock(&self.rng).gen();
        let variant = experiment.bucket(draw)?.id.clone();

        {
            let mut assignments = lock(&self.assignments);
            assignments
                .entry(user_id.to_string())
                .or_default()
                .insert(experiment_id.to_string(), variant.clone());
            if let Err(err) =
                set_typed(self.store.as_ref(), storage::ASSIGNMENTS_KEY, &*assignments)
            {
                log_warn!("variant assignment kept in memory only: {err}");
            }
        }

        if let Err(err) =
            self.record_event_at(experiment_id, &variant, EventKind::Visitor, 1, now)
        {
            log_warn!("could not count visitor for '{experiment_id}': {err:#}");
        }
        log_info!("assigned {user_id} to {variant} in {experiment_id}");
        Some(variant)
    }

    pub fn user_variant(&self, user_id: &str, experiment_id: &str) -> Option<String> {
        lock(&self.assignments)
            .get(user_id)
            .and_then(|per_user| per_user.get(experiment_id))
            .cloned()
    }

    /// Experiments the visitor has been assigned to.
    pub fn experiments_for(&self, user_id: &str) -> Vec<String> {
        lock(&self.assignments)
            .get(user_id)
            .map(|per_user| per_user.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record_event(
        &self,
        experiment_id: &str,
        variant_id: &str,
        kind: EventKind,
        amount: u64,
    ) -> Result<ExperimentStatus> {
        self.record_event_at(experiment_id, variant_id, kind, amount, Utc::now())
    }

    /// Adds `amount` to the variant's counter (milliseconds for engagement
    /// time, 1 for everything else). Events for experiments that are not
    /// running are ignored. Reaching the sample size completes the experiment.
    pub fn record_event_at(
        &self,
        experiment_id: &str,
        variant_id: &str,
        kind: EventKind,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<ExperimentStatus> {
        let mut experiments = lock(&self.experiments);
        let experiment = self
            .cached_or_stored(&mut experiments, experiment_id)
            .ok_or_else(|| anyhow!("unknown experiment '{experiment_id}'"))?;

        if experiment.status != ExperimentStatus::Running {
            log_warn!(
                "ignoring {kind:?} for {} experiment '{experiment_id}'",
                experiment.status.as_str()
            );
            return Ok(experiment.status);
        }

        let results = experiment
            .results
            .get_mut(variant_id)
            .ok_or_else(|| {
                anyhow!("experiment '{experiment_id}' has no variation '{variant_id}'")
            })?;
        let counter = match kind {
            EventKind::View => &mut results.views,
            EventKind::Click => &mut results.clicks,
            EventKind::Conversion => &mut results.conversions,
            EventKind::EngagementTime => &mut results.engagement_time_ms,
            EventKind::Visitor => &mut results.visitors,
        };
        *counter = counter.saturating_add(amount);

        if experiment.total_visitors() >= experiment.sample_size {
            complete(experiment, now);
            log_info!(
                "experiment '{experiment_id}' completed: winner {}",
                experiment
                    .outcome
                    .as_ref()
                    .map(|o| o.overall_winner.as_str())
                    .unwrap_or("n/a")
            );
        }

        let status = experiment.status;
        let snapshot = experiment.clone();
        drop(experiments);
        self.persist(&snapshot);
        Ok(status)
    }

    fn transition<F>(&self, experiment_id: &str, apply: F) -> Result<Experiment>
    where
        F: FnOnce(&mut Experiment, DateTime<Utc>) -> Result<()>,
    {
        let mut experiments = lock(&self.experiments);
        let experiment = self
            .cached_or_stored(&mut experiments, experiment_id)
            .ok_or_else(|| anyhow!("unknown experiment '{experiment_id}'"))?;
        apply(experiment, Utc::now())?;
        let snapshot = experiment.clone();
        drop(experiments);
        self.persist(&snapshot);
        Ok(snapshot)
    }

    fn cached_or_stored<'a>(
        &self,
        experiments: &'a mut HashMap<String, Experiment>,
        experiment_id: &str,
    ) -> Option<&'a mut Experiment> {
        if !experiments.contains_key(experiment_id) {
            let key = storage::experiment_key(experiment_id);
            match get_typed::<Experiment>(self.store.as_ref(), &key) {
                Ok(Some(stored)) => {
                    experiments.insert(experiment_id.to_string(), stored);
                }
                Ok(None) => return None,
                Err(err) => {
                    log_warn!("ignoring unreadable experiment '{experiment_id}': {err}");
                    return None;
                }
            }
        }
        experiments.get_mut(experiment_id)
    }

    fn persist(&self, experiment: &Experiment) {
        let key = storage::experiment_key(&experiment.id);
        if let Err(err) = set_typed(self.store.as_ref(), &key, experiment) {
            log_warn!("experiment '{}' kept in memory only: {err}", experiment.id);
        }
    }
}

/// Freezes the counters and computes the outcome.
fn complete(experiment: &mut Experiment, now: DateTime<Utc>) {
    experiment.status = ExperimentStatus::Completed;
    experiment.outcome = Some(analysis::analyze(experiment, now));
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiments::types::Variation;
    use crate::storage::MemoryStore;

    fn framework(store: Arc<dyn KeyValueStore>) -> ExperimentFramework {
        ExperimentFramework::with_rng(store, StdRng::seed_from_u64(7))
    }

    fn running(framework: &ExperimentFramework, sample_size: u64) {
        framework
            .create(Experiment::with_default_split("cta", "CTA copy", sample_size, Utc::now()))
            .unwrap();
        framework.start("cta").unwrap();
    }

    #[test]
    fn assignment_is_sticky_and_persisted() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let first = framework(store.clone());
        running(&first, 1_000);

        let variant = first.assign_variant("u1", "cta").expect("assigned");
        for _ in 0..10 {
            assert_eq!(first.assign_variant("u1", "cta").as_deref(), Some(variant.as_str()));
        }

        let reloaded = framework(store);
        assert_eq!(reloaded.user_variant("u1", "cta"), Some(variant.clone()));
        assert_eq!(reloaded.assign_variant("u1", "cta"), Some(variant));
        assert_eq!(reloaded.get("cta").unwrap().total_visitors(), 1);
    }

    #[test]
    fn draft_experiments_do_not_assign() {
        let fw = framework(Arc::new(MemoryStore::new()));
        fw.create(Experiment::with_default_split("cta", "CTA", 10, Utc::now()))
            .unwrap();
        assert_eq!(fw.assign_variant("u1", "cta"), None);
        assert_eq!(fw.assign_variant("u1", "missing"), None);
    }

    #[test]
    fn status_only_moves_forward() {
        let fw = framework(Arc::new(MemoryStore::new()));
        running(&fw, 10);
        assert!(fw.start("cta").is_err());
        fw.stop("cta").unwrap();
        assert!(fw.start("cta").is_err());
        assert!(fw.stop("cta").is_err());
        assert_eq!(fw.get("cta").unwrap().status, ExperimentStatus::Completed);
    }

    #[test]
    fn reaching_sample_size_completes_and_freezes_counters() {
        let fw = framework(Arc::new(MemoryStore::new()));
        running(&fw, 4);

        fw.record_event("cta", CONTROL, EventKind::Visitor, 2).unwrap();
        fw.record_event("cta", CONTROL, EventKind::Conversion, 1).unwrap();
        fw.record_event("cta", VARIANT_1, EventKind::Conversion, 1).unwrap();
        let status = fw
            .record_event("cta", VARIANT_1, EventKind::Visitor, 2)
            .unwrap();
        assert_eq!(status, ExperimentStatus::Completed);

        let frozen = fw.get("cta").unwrap();
        fw.record_event("cta", VARIANT_1, EventKind::Conversion, 5).unwrap();
        assert_eq!(fw.get("cta").unwrap().results, frozen.results);

        let outcome = frozen.outcome.expect("outcome");
        assert_eq!(outcome.total_participants, 4);
        assert_eq!(outcome.overall_winner, "tie");
    }

    #[test]
    fn unknown_variation_is_an_error() {
        let fw = framework(Arc::new(MemoryStore::new()));
        running(&fw, 10);
        assert!(fw.record_event("cta", "variant9", EventKind::Click, 1).is_err());
    }

    fn variation(id: &str, traffic: f64) -> Variation {
        Variation {
            id: id.into(),
            name: id.into(),
            traffic,
        }
    }

    #[test]
    fn create_requires_control_and_first_variant() {
        let fw = framework(Arc::new(MemoryStore::new()));
        let unnamed = Experiment::new(
            "cta",
            "CTA",
            vec![variation("a", 0.5), variation("b", 0.5)],
            4,
            Utc::now(),
        );
        assert!(fw.create(unnamed).is_err());
        assert!(fw.get("cta").is_none());

        let crowded = Experiment::new(
            "cta",
            "CTA",
            vec![
                variation(CONTROL, 0.25),
                variation(VARIANT_1, 0.25),
                variation("variant2", 0.25),
                variation("variant3", 0.25),
            ],
            4,
            Utc::now(),
        );
        assert!(fw.create(crowded).is_err());

        let pair = Experiment::new(
            "cta",
            "CTA",
            vec![variation(CONTROL, 0.5), variation(VARIANT_1, 0.5)],
            4,
            Utc::now(),
        );
        assert_eq!(fw.create(pair).unwrap().variations.len(), 2);
    }

    #[test]
    fn assignment_rates_follow_the_split() {
        let fw = framework(Arc::new(MemoryStore::new()));
        running(&fw, 1_000_000);
        let mut control = 0;
        for i in 0..2_000 {
            if fw.assign_variant(&format!("u{i}"), "cta").as_deref() == Some(CONTROL) {
                control += 1;
            }
        }
        assert!((850..1_150).contains(&control), "control got {control}");
    }
}
