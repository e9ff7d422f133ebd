//! Durable key/value persistence for the analytics layer.
//!
//! Every caller goes through [`KeyValueStore`]; nothing else touches the backing
//! storage. Writes are last-write-wins.

mod memory;
mod migrations;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const USER_ID_KEY: &str = "portfolio_user_id";
pub const CONSENT_KEY: &str = "analytics_consent";
pub const ASSIGNMENTS_KEY: &str = "ab_assignments";

pub fn profile_key(user_id: &str) -> String {
    format!("portfolio_profile_{user_id}")
}

pub fn experiment_key(experiment_id: &str) -> String {
    format!("ab_experiment_{experiment_id}")
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded writing '{key}' ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to (de)serialize '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Shallow-merges the fields of `patch` into the object stored at `key`.
    /// A missing or non-object value is replaced by `patch`.
    fn merge(&self, key: &str, patch: Value) -> StorageResult<Value> {
        let merged = match (self.get(key)?, patch) {
            (Some(Value::Object(mut current)), Value::Object(fields)) => {
                for (field, value) in fields {
                    current.insert(field, value);
                }
                Value::Object(current)
            }
            (_, patch) => patch,
        };
        self.set(key, merged.clone())?;
        Ok(merged)
    }
}

/// Typed read. A value that no longer matches `T` is reported rather than
/// silently discarded so callers can decide whether to start fresh.
pub fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Serialization {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub fn set_typed<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let value = serde_json::to_value(value).map_err(|source| StorageError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overlays_fields_on_existing_object() {
        let store = MemoryStore::new();
        store.set("k", json!({"a": 1, "b": 2})).unwrap();

        let merged = store.merge("k", json!({"b": 3, "c": 4})).unwrap();

        assert_eq!(merged, json!({"a": 1, "b": 3, "c": 4}));
        assert_eq!(store.get("k").unwrap(), Some(merged));
    }

    #[test]
    fn merge_replaces_non_object_values() {
        let store = MemoryStore::new();
        store.set("k", json!("granted")).unwrap();

        let merged = store.merge("k", json!({"a": 1})).unwrap();
        assert_eq!(merged, json!({"a": 1}));
    }

    #[test]
    fn typed_read_reports_shape_mismatch() {
        let store = MemoryStore::new();
        store.set("k", json!("not a number")).unwrap();

        let err = get_typed::<u64>(&store, "k").unwrap_err();
        assert!(matches!(err, StorageError::Serialization { .. }));
    }
}
