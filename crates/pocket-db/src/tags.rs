//! Tag repository. Tag names are unique case-insensitively.

use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use pocket_core::{new_v7, Error, Result, Tag};

use crate::codec::parse_uuid;

/// SQLite repository for tags and capture-tag links.
#[derive(Clone)]
pub struct SqliteTagRepository {
    pool: SqlitePool,
}

impl SqliteTagRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Find a tag by name or create it.
    pub async fn get_or_create_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        name: &str,
    ) -> Result<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("tag name is blank".to_string()));
        }

        sqlx::query("INSERT INTO tags (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
            .bind(new_v7().to_string())
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let (id, stored): (String, String) =
            sqlx::query_as("SELECT id, name FROM tags WHERE name = ?")
                .bind(name)
                .fetch_one(&mut **tx)
                .await
                .map_err(Error::Database)?;

        Ok(Tag {
            id: parse_uuid(&id)?,
            name: stored,
        })
    }

    /// Link a tag to a capture. Linking twice is a no-op.
    pub async fn link_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
        tag_id: Uuid,
    ) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO capture_tags (capture_id, tag_id) VALUES (?, ?)")
            .bind(capture_id.to_string())
            .bind(tag_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Names of the tags linked to a capture, alphabetical.
    pub async fn tags_for_capture(&self, capture_id: Uuid) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT t.name FROM tags t
             JOIN capture_tags ct ON ct.tag_id = t.id
             WHERE ct.capture_id = ?
             ORDER BY t.name COLLATE NOCASE",
        )
        .bind(capture_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    pub async fn unlink_all_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM capture_tags WHERE capture_id = ?")
            .bind(capture_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
