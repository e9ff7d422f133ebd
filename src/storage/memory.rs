use std::{
    collections::HashMap,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde_json::Value;

use super::{KeyValueStore, StorageError, StorageResult};

/// In-process store. With a quota it behaves like a browser origin whose
/// local storage is nearly full: writes that would exceed it are rejected.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: None,
        }
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let guard = self.read();
        match guard.get(key) {
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|source| StorageError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let serialized = serde_json::to_string(&value).map_err(|source| {
            StorageError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;

        let mut guard = self.write();
        if let Some(quota) = self.quota_bytes {
            let used: usize = guard
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = key.len() + serialized.len();
            let available = quota.saturating_sub(used);
            if needed > available {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    available,
                });
            }
        }
        guard.insert(key.to_string(), serialized);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn quota_rejects_oversized_writes_and_keeps_previous_value() {
        let store = MemoryStore::with_quota(32);
        store.set("a", json!("small")).unwrap();

        let err = store
            .set("a", json!("this value is far too large for the quota"))
            .unwrap_err();

        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
        assert_eq!(store.get("a").unwrap(), Some(json!("small")));
    }

    #[test]
    fn overwriting_a_key_does_not_count_its_old_value() {
        let store = MemoryStore::with_quota(16);
        store.set("a", json!("123456789")).unwrap();
        store.set("a", json!("987654321")).unwrap();
        assert_eq!(store.len(), 1);
    }
}
