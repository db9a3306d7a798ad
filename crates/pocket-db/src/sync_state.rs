//! Key/value bookkeeping for remote backup sync.

use sqlx::SqlitePool;

use pocket_core::{Error, Result};

/// Key under which the last pull cursor is stored.
pub const KEY_PULL_CURSOR: &str = "pull_cursor";

/// Key under which the time of the last successful push is stored (RFC 3339).
pub const KEY_LAST_PUSH_AT: &str = "last_push_at";

/// SQLite repository for sync state.
#[derive(Clone)]
pub struct SqliteSyncStateRepository {
    pool: SqlitePool,
}

impl SqliteSyncStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT value FROM sync_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_state (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}
