use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::{migrations::run_migrations, KeyValueStore, StorageError, StorageResult};

type StoreTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum StoreCommand {
    Execute(StoreTask),
    Shutdown,
}

struct StoreInner {
    sender: Mutex<mpsc::Sender<StoreCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            let sender = match self.sender.lock() {
                Ok(sender) => sender,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Err(err) = sender.send(StoreCommand::Shutdown) {
                error!("Failed to send shutdown to store thread: {err}");
            }
            drop(sender);
            if let Err(join_err) = handle.join() {
                error!("Failed to join store thread: {join_err:?}");
            }
        }
    }
}

/// SQLite-backed [`KeyValueStore`]. A single worker thread owns the
/// connection, so every write from every handle is serialized through it.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
    path: Arc<PathBuf>,
}

impl SqliteStore {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory {}", parent.display())
                })?;
            }
        }
        Self::spawn(path.clone(), move || Connection::open(&path))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::spawn(PathBuf::from(":memory:"), Connection::open_in_memory)
    }

    fn spawn<F>(path: PathBuf, connect: F) -> Result<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::channel::<StoreCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();

        let worker = thread::Builder::new()
            .name("portfolio-store".into())
            .spawn(move || {
                let mut conn = match connect() {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(
                            anyhow::Error::new(err).context("failed to open SQLite store")
                        ));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run store migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("Store initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        StoreCommand::Execute(task) => task(&mut conn),
                        StoreCommand::Shutdown => break,
                    }
                }

                info!("Store thread shutting down");
            })
            .with_context(|| "failed to spawn store worker thread")?;

        ready_rx
            .recv()
            .context("store worker exited before signaling readiness")??;

        info!("Key/value store opened at {}", path.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                sender: Mutex::new(command_tx),
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Runs `task` on the store thread and blocks until it replies.
    fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = mpsc::channel();

        let command = StoreCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("Store caller dropped before receiving result");
            }
        }));

        {
            let sender = match self.inner.sender.lock() {
                Ok(sender) => sender,
                Err(poisoned) => poisoned.into_inner(),
            };
            sender
                .send(command)
                .map_err(|err| anyhow!("failed to send command to store thread: {err}"))?;
        }

        reply_rx
            .recv()
            .map_err(|_| anyhow!("store thread terminated unexpectedly"))?
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let lookup = key.to_string();
        let raw = self
            .execute(move |conn| {
                conn.query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![lookup],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .context("failed to read key")
            })
            .map_err(|err| StorageError::Unavailable(format!("{err:#}")))?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
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
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, serialized, Utc::now().to_rfc3339()],
            )
            .context("failed to write key")?;
            Ok(())
        })
        .map_err(StorageError::Backend)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
                .context("failed to delete key")?;
            Ok(())
        })
        .map_err(StorageError::Backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn values_survive_reopening_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("analytics.sqlite3");

        {
            let store = SqliteStore::open(path.clone()).expect("open store");
            store.set("profile", json!({"page_views": 3})).unwrap();
        }

        let reopened = SqliteStore::open(path).expect("reopen store");
        assert_eq!(
            reopened.get("profile").unwrap(),
            Some(json!({"page_views": 3}))
        );
    }

    #[test]
    fn remove_and_merge_go_through_the_worker() {
        let store = SqliteStore::open_in_memory().expect("open store");
        store.set("a", json!({"x": 1})).unwrap();
        store.merge("a", json!({"y": 2})).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!({"x": 1, "y": 2})));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }
}
