use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{ProfileUpdate, UserProfile};
use crate::segmentation::SegmentationEngine;
use crate::storage::{self, get_typed, set_typed, KeyValueStore};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "profile";

/// Per-browser visitor profiles.
///
/// The in-memory copy is authoritative for the running session; durable
/// storage is written after every change and may fail without affecting it.
pub struct UserProfileStore {
    store: Arc<dyn KeyValueStore>,
    engine: Arc<SegmentationEngine>,
    cache: Mutex<HashMap<String, UserProfile>>,
    user_id: Mutex<Option<String>>,
}

impl UserProfileStore {
    pub fn new(store: Arc<dyn KeyValueStore>, engine: Arc<SegmentationEngine>) -> Self {
        Self {
            store,
            engine,
            cache: Mutex::new(HashMap::new()),
            user_id: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &SegmentationEngine {
        &self.engine
    }

    /// Returns this browser's id, generating and persisting it on first use.
    pub fn get_or_create_id(&self) -> String {
        let mut cached = lock(&self.user_id);
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let stored = match self.store.get(storage::USER_ID_KEY) {
            Ok(Some(Value::String(id))) if !id.is_empty() => Some(id),
            Ok(_) => None,
            Err(err) => {
                log_warn!("could not read stored user id: {err}");
                None
            }
        };

        let id = stored.unwrap_or_else(|| {
            let id = format!("user_{}", Uuid::new_v4().simple());
            if let Err(err) = self
                .store
                .set(storage::USER_ID_KEY, Value::String(id.clone()))
            {
                log_warn!("could not persist user id, it will not survive a reload: {err}");
            }
            log_info!("generated user id {id}");
            id
        });

        *cached = Some(id.clone());
        id
    }

    /// Never fails: unknown or unreadable profiles come back fresh and zeroed.
    pub fn load(&self, user_id: &str) -> UserProfile {
        self.load_at(user_id, Utc::now())
    }

    pub fn load_at(&self, user_id: &str, now: DateTime<Utc>) -> UserProfile {
        let mut cache = lock(&self.cache);
        self.cached_or_stored(&mut cache, user_id, now).clone()
    }

    pub fn update(&self, user_id: &str, update: &ProfileUpdate) -> UserProfile {
        self.update_at(user_id, update, Utc::now())
    }

    /// Merges the increments, recomputes derived fields and persists.
    pub fn update_at(
        &self,
        user_id: &str,
        update: &ProfileUpdate,
        now: DateTime<Utc>,
    ) -> UserProfile {
        let mut cache = lock(&self.cache);
        let profile = self.cached_or_stored(&mut cache, user_id, now);
        profile.apply(update, now);
        self.engine.refresh(profile, now);
        let snapshot = profile.clone();
        drop(cache);

        self.persist(&snapshot);
        snapshot
    }

    /// Re-derives segments and conversion probability without new activity,
    /// so probabilities decay while the visitor is idle.
    pub fn reevaluate_at(&self, user_id: &str, now: DateTime<Utc>) -> UserProfile {
        let mut cache = lock(&self.cache);
        let profile = self.cached_or_stored(&mut cache, user_id, now);
        self.engine.refresh(profile, now);
        let snapshot = profile.clone();
        drop(cache);

        self.persist(&snapshot);
        snapshot
    }

    pub fn cached_user_ids(&self) -> Vec<String> {
        lock(&self.cache).keys().cloned().collect()
    }

    fn cached_or_stored<'a>(
        &self,
        cache: &'a mut HashMap<String, UserProfile>,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> &'a mut UserProfile {
        cache.entry(user_id.to_string()).or_insert_with(|| {
            match get_typed::<UserProfile>(self.store.as_ref(), &storage::profile_key(user_id)) {
                Ok(Some(profile)) => profile,
                Ok(None) => self.fresh(user_id, now),
                Err(err) => {
                    log_warn!("discarding unreadable profile for {user_id}: {err}");
                    self.fresh(user_id, now)
                }
            }
        })
    }

    fn fresh(&self, user_id: &str, now: DateTime<Utc>) -> UserProfile {
        let mut profile = UserProfile::new(user_id, now);
        self.engine.refresh(&mut profile, now);
        profile
    }

    fn persist(&self, profile: &UserProfile) {
        let key = storage::profile_key(&profile.user_id);
        if let Err(err) = set_typed(self.store.as_ref(), &key, profile) {
            log_warn!("profile for {} kept in memory only: {err}", profile.user_id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
