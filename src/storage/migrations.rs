use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema steps; entry `n` moves the store from `user_version` n to n + 1.
const STEPS: &[&str] = &["CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );"];

fn schema_version() -> i32 {
    STEPS.len() as i32
}

/// Brings the store up to the latest schema in one transaction. Stores
/// written by a newer build are refused rather than downgraded.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let stored: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read store schema version")?;
    let target = schema_version();

    if stored > target {
        bail!("store schema v{stored} was written by a newer build (this build knows v{target})");
    }
    let pending = STEPS.get(stored.max(0) as usize..).unwrap_or_default();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to begin schema upgrade")?;
    for (offset, step) in pending.iter().enumerate() {
        let version = stored + offset as i32 + 1;
        tx.execute_batch(step)
            .with_context(|| format!("schema step v{version} failed"))?;
    }
    tx.pragma_update(None, "user_version", target)
        .context("failed to record store schema version")?;
    tx.commit().context("failed to commit schema upgrade")
}
