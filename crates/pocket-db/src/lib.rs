//! # pocket-db
//!
//! SQLite database layer for the Pocket capture pipeline.
//!
//! Provides repositories for captures, derived entities (schedules, todos,
//! notes), tags, sync bookkeeping, and the durable work queue.
//!
//! ## Example
//!
//! ```ignore
//! use pocket_db::Database;
//!
//! let db = Database::connect("sqlite://pocket.db?mode=rwc").await?;
//! let capture = db.captures.get(capture_id).await?;
//! ```

mod codec;
pub mod captures;
pub mod notes;
pub mod pool;
pub mod queue;
pub mod schedules;
pub mod sync_state;
pub mod tags;
pub mod todos;

#[cfg(test)]
pub(crate) mod test_fixtures;

use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use pocket_core::{Error, Result};

pub use captures::SqliteCaptureRepository;
pub use notes::SqliteNoteRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use queue::SqliteQueueRepository;
pub use schedules::SqliteScheduleRepository;
pub use sync_state::{SqliteSyncStateRepository, KEY_LAST_PUSH_AT, KEY_PULL_CURSOR};
pub use tags::SqliteTagRepository;
pub use todos::SqliteTodoRepository;

/// Run embedded migrations against a pool.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
    Ok(())
}

/// Combined database access with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: SqlitePool,
    /// Capture repository.
    pub captures: SqliteCaptureRepository,
    /// Schedule repository.
    pub schedules: SqliteScheduleRepository,
    /// Todo repository.
    pub todos: SqliteTodoRepository,
    /// Note repository.
    pub notes: SqliteNoteRepository,
    /// Tag repository.
    pub tags: SqliteTagRepository,
    /// Work queue.
    pub queue: SqliteQueueRepository,
    /// Backup sync bookkeeping.
    pub sync_state: SqliteSyncStateRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            captures: SqliteCaptureRepository::new(pool.clone()),
            schedules: SqliteScheduleRepository::new(pool.clone()),
            todos: SqliteTodoRepository::new(pool.clone()),
            notes: SqliteNoteRepository::new(pool.clone()),
            tags: SqliteTagRepository::new(pool.clone()),
            queue: SqliteQueueRepository::new(pool.clone()),
            sync_state: SqliteSyncStateRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to the given URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(PoolConfig::default().database_url(url)).await
    }

    /// Connect with custom pool configuration and run migrations.
    pub async fn connect_with_config(config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(config).await?;
        migrate(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Fresh private in-memory database with the schema applied.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Permanently delete a capture and everything derived from it.
    ///
    /// Rows go in a fixed order (todo, schedule, note, tag links, extracted
    /// entities, capture) inside one transaction. Returns false when the
    /// capture did not exist.
    pub async fn hard_delete_capture(&self, capture_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        self.todos.delete_by_capture_tx(&mut tx, capture_id).await?;
        self.schedules.delete_by_capture_tx(&mut tx, capture_id).await?;
        self.notes.delete_by_capture_tx(&mut tx, capture_id).await?;
        self.tags.unlink_all_tx(&mut tx, capture_id).await?;

        sqlx::query("DELETE FROM capture_entities WHERE capture_id = ?")
            .bind(capture_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        let deleted = sqlx::query("DELETE FROM captures WHERE id = ?")
            .bind(capture_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?
            .rows_affected()
            > 0;

        tx.commit().await.map_err(Error::Database)?;

        if deleted {
            info!(
                subsystem = "db",
                component = "captures",
                op = "hard_delete",
                capture_id = %capture_id,
                "Capture permanently deleted"
            );
        }
        Ok(deleted)
    }
}
