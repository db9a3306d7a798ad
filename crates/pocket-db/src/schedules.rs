//! Schedule repository.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use pocket_core::{CalendarSyncStatus, Error, Result, Schedule};

use crate::codec::{
    from_millis, opt_from_millis, opt_parse_enum, opt_to_millis, parse_enum, parse_uuid,
    to_millis,
};

const SCHEDULE_COLUMNS: &str = "id, capture_id, title, start_time, end_time, location, \
                                is_all_day, confidence, calendar_sync_status, remote_event_id, \
                                created_at, updated_at";

/// SQLite repository for schedules.
#[derive(Clone)]
pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &SqliteRow) -> Result<Schedule> {
        let id: String = row.try_get("id")?;
        let capture_id: String = row.try_get("capture_id")?;
        let status: String = row.try_get("calendar_sync_status")?;
        Ok(Schedule {
            id: parse_uuid(&id)?,
            capture_id: parse_uuid(&capture_id)?,
            title: row.try_get("title")?,
            start_time: opt_from_millis(row.try_get("start_time")?),
            end_time: opt_from_millis(row.try_get("end_time")?),
            location: row.try_get("location")?,
            is_all_day: row.try_get("is_all_day")?,
            confidence: opt_parse_enum(row.try_get("confidence")?)?,
            calendar_sync_status: parse_enum(&status)?,
            remote_event_id: row.try_get("remote_event_id")?,
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
        })
    }

    /// Insert a schedule. Fails if the capture already has one.
    pub async fn insert(&self, schedule: &Schedule) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        Self::insert_on(&mut conn, schedule).await
    }

    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        schedule: &Schedule,
    ) -> Result<()> {
        Self::insert_on(&mut **tx, schedule).await
    }

    async fn insert_on(conn: &mut sqlx::SqliteConnection, schedule: &Schedule) -> Result<()> {
        sqlx::query(
            "INSERT INTO schedules (id, capture_id, title, start_time, end_time, location,
                                    is_all_day, confidence, calendar_sync_status,
                                    remote_event_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(schedule.id.to_string())
        .bind(schedule.capture_id.to_string())
        .bind(&schedule.title)
        .bind(opt_to_millis(schedule.start_time))
        .bind(opt_to_millis(schedule.end_time))
        .bind(&schedule.location)
        .bind(schedule.is_all_day)
        .bind(schedule.confidence.map(|c| c.as_str()))
        .bind(schedule.calendar_sync_status.as_str())
        .bind(&schedule.remote_event_id)
        .bind(to_millis(schedule.created_at))
        .bind(to_millis(schedule.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Get a schedule by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Schedule>> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    /// Get the schedule derived from a capture.
    pub async fn get_by_capture(&self, capture_id: Uuid) -> Result<Option<Schedule>> {
        let sql = format!("SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE capture_id = ?");
        let row = sqlx::query(&sql)
            .bind(capture_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    /// Every timed schedule linked to a remote event, wherever its local
    /// start now falls.
    pub async fn list_linked(&self) -> Result<Vec<Schedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules
             WHERE remote_event_id IS NOT NULL
               AND start_time IS NOT NULL
             ORDER BY start_time ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(Self::row_to_schedule).collect()
    }

    /// Schedules in a given calendar state.
    pub async fn list_by_status(&self, status: CalendarSyncStatus) -> Result<Vec<Schedule>> {
        let sql = format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE calendar_sync_status = ?
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(Self::row_to_schedule).collect()
    }

    /// Set the calendar state, and the remote id when one is given.
    pub async fn update_sync_status(
        &self,
        id: Uuid,
        status: CalendarSyncStatus,
        remote_event_id: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE schedules
             SET calendar_sync_status = ?,
                 remote_event_id = COALESCE(?, remote_event_id),
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(remote_event_id)
        .bind(to_millis(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    /// Record a successful calendar write: status synced, the remote id, and
    /// the title the event was written with.
    pub async fn mark_synced(&self, id: Uuid, remote_event_id: &str, title: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE schedules
             SET calendar_sync_status = 'synced', remote_event_id = ?, title = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(remote_event_id)
        .bind(title)
        .bind(to_millis(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    /// Overwrite the event fields with values from the remote calendar.
    pub async fn update_from_remote(
        &self,
        id: Uuid,
        title: &str,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
        location: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE schedules
             SET title = ?, start_time = ?, end_time = ?, location = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(title)
        .bind(to_millis(start_time))
        .bind(opt_to_millis(end_time))
        .bind(location)
        .bind(to_millis(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("schedule {id}")));
        }
        Ok(())
    }

    /// Delete the schedule of a capture inside an open transaction.
    pub async fn delete_by_capture_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM schedules WHERE capture_id = ?")
            .bind(capture_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
