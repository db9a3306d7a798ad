//! Durable work queue backed by the `queue_items` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use pocket_core::{
    defaults, new_v7, Error, QueueAction, QueueItem, QueueRepository, QueueStats, QueueStatus,
    Result,
};

use crate::codec::{from_millis, opt_from_millis, parse_enum, parse_uuid, to_millis};

const ITEM_COLUMNS: &str = "id, action, payload, retry_count, max_retries, status, last_error, \
                            next_retry_at, created_at, started_at";

/// SQLite implementation of QueueRepository.
#[derive(Clone)]
pub struct SqliteQueueRepository {
    pool: SqlitePool,
    /// Wakes the worker when new work arrives.
    notify: Arc<Notify>,
}

impl SqliteQueueRepository {
    /// Create a new repository with its own notify handle.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Create a new repository sharing an existing notify handle.
    pub fn with_notify(pool: SqlitePool, notify: Arc<Notify>) -> Self {
        Self { pool, notify }
    }

    /// Get the notification handle for event-driven waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn row_to_item(row: &SqliteRow) -> Result<QueueItem> {
        let id: String = row.try_get("id")?;
        let action: String = row.try_get("action")?;
        let status: String = row.try_get("status")?;
        Ok(QueueItem {
            id: parse_uuid(&id)?,
            action: parse_enum(&action)?,
            payload: row.try_get("payload")?,
            retry_count: row.try_get("retry_count")?,
            max_retries: row.try_get("max_retries")?,
            status: parse_enum(&status)?,
            last_error: row.try_get("last_error")?,
            next_retry_at: opt_from_millis(row.try_get("next_retry_at")?),
            created_at: from_millis(row.try_get("created_at")?),
            started_at: opt_from_millis(row.try_get("started_at")?),
        })
    }
}

#[async_trait]
impl QueueRepository for SqliteQueueRepository {
    async fn enqueue(&self, action: QueueAction, payload: &str) -> Result<QueueItem> {
        let item = QueueItem {
            id: new_v7(),
            action,
            payload: payload.to_string(),
            retry_count: 0,
            max_retries: defaults::QUEUE_MAX_RETRIES,
            status: QueueStatus::Pending,
            last_error: None,
            next_retry_at: None,
            created_at: Utc::now(),
            started_at: None,
        };

        sqlx::query(
            "INSERT INTO queue_items (id, action, payload, retry_count, max_retries, status, created_at)
             VALUES (?, ?, ?, 0, ?, 'pending', ?)",
        )
        .bind(item.id.to_string())
        .bind(action.as_str())
        .bind(payload)
        .bind(item.max_retries)
        .bind(to_millis(item.created_at))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "queue",
            op = "enqueue",
            item_id = %item.id,
            action = %action,
            "Queue item enqueued"
        );

        // Fire-and-forget: a missed wake is covered by the worker's poll.
        self.notify.notify_one();
        Ok(item)
    }

    async fn claim_next_pending(&self) -> Result<Option<QueueItem>> {
        let now = to_millis(Utc::now());

        // The outer status check makes the update a compare-and-set, so a
        // concurrent claimer that picked the same id updates nothing.
        let sql = format!(
            "UPDATE queue_items
             SET status = 'processing', started_at = ?
             WHERE id = (
                 SELECT id FROM queue_items
                 WHERE status = 'pending'
                   AND (next_retry_at IS NULL OR next_retry_at <= ?)
                 ORDER BY created_at ASC, id ASC
                 LIMIT 1
             )
             AND status = 'pending'
             RETURNING {ITEM_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn mark_done(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM queue_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE queue_items
             SET status = 'failed', last_error = ?, next_retry_at = NULL, started_at = NULL
             WHERE id = ?",
        )
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("queue item {id}")));
        }
        Ok(())
    }

    async fn record_retryable_failure(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<QueueStatus> {
        // Right-hand sides see the pre-update row, so the increment and the
        // budget check happen in one statement.
        let status: Option<String> = sqlx::query_scalar(
            "UPDATE queue_items
             SET retry_count = retry_count + 1,
                 last_error = ?,
                 started_at = NULL,
                 status = CASE WHEN retry_count + 1 < max_retries THEN 'pending' ELSE 'failed' END,
                 next_retry_at = CASE WHEN retry_count + 1 < max_retries THEN ? ELSE NULL END
             WHERE id = ?
             RETURNING status",
        )
        .bind(error)
        .bind(to_millis(next_retry_at))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match status {
            Some(s) => parse_enum(&s),
            None => Err(Error::NotFound(format!("queue item {id}"))),
        }
    }

    async fn reset_all_processing_to_pending(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE queue_items SET status = 'pending', started_at = NULL
             WHERE status = 'processing'",
        )
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let count = result.rows_affected();
        if count > 0 {
            info!(
                subsystem = "db",
                component = "queue",
                op = "reset_processing",
                row_count = count,
                "Recovered orphaned queue items"
            );
        }
        Ok(count)
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM queue_items WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn list_by_status(&self, status: QueueStatus) -> Result<Vec<QueueItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items WHERE status = ?
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(Self::row_to_item).collect()
    }

    async fn failed_for_payload(
        &self,
        action: QueueAction,
        payload: &str,
    ) -> Result<Option<QueueItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM queue_items
             WHERE action = ? AND payload = ? AND status = 'failed'
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(action.as_str())
            .bind(payload)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM queue_items GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            match parse_enum::<QueueStatus>(&status)? {
                QueueStatus::Pending => stats.pending = count,
                QueueStatus::Processing => stats.processing = count,
                QueueStatus::Failed => stats.failed = count,
            }
        }
        Ok(stats)
    }

    async fn retry_failed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE queue_items
             SET status = 'pending', retry_count = 0, last_error = NULL, next_retry_at = NULL
             WHERE id = ? AND status = 'failed'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let requeued = result.rows_affected() > 0;
        if requeued {
            self.notify.notify_one();
        }
        Ok(requeued)
    }
}
