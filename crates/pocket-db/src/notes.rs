//! Note repository.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use pocket_core::{Error, Note, NoteFolder, Result};

use crate::codec::{from_millis, parse_enum, parse_uuid, to_millis};

/// SQLite repository for notes.
#[derive(Clone)]
pub struct SqliteNoteRepository {
    pool: SqlitePool,
}

impl SqliteNoteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_note(row: &SqliteRow) -> Result<Note> {
        let id: String = row.try_get("id")?;
        let capture_id: String = row.try_get("capture_id")?;
        let folder: String = row.try_get("folder")?;
        Ok(Note {
            id: parse_uuid(&id)?,
            capture_id: parse_uuid(&capture_id)?,
            folder: parse_enum(&folder)?,
            body: row.try_get("body")?,
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
        })
    }

    pub async fn insert(&self, note: &Note) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        Self::insert_on(&mut conn, note).await
    }

    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        note: &Note,
    ) -> Result<()> {
        Self::insert_on(&mut **tx, note).await
    }

    async fn insert_on(conn: &mut sqlx::SqliteConnection, note: &Note) -> Result<()> {
        sqlx::query(
            "INSERT INTO notes (id, capture_id, folder, body, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(note.id.to_string())
        .bind(note.capture_id.to_string())
        .bind(note.folder.as_str())
        .bind(&note.body)
        .bind(to_millis(note.created_at))
        .bind(to_millis(note.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn get_by_capture(&self, capture_id: Uuid) -> Result<Option<Note>> {
        let row = sqlx::query(
            "SELECT id, capture_id, folder, body, created_at, updated_at
             FROM notes WHERE capture_id = ?",
        )
        .bind(capture_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_note).transpose()
    }

    /// Notes filed in a folder, newest first.
    pub async fn list_in_folder(&self, folder: NoteFolder) -> Result<Vec<Note>> {
        let rows = sqlx::query(
            "SELECT id, capture_id, folder, body, created_at, updated_at
             FROM notes WHERE folder = ? ORDER BY created_at DESC",
        )
        .bind(folder.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        rows.iter().map(Self::row_to_note).collect()
    }

    pub async fn delete_by_capture_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notes WHERE capture_id = ?")
            .bind(capture_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
