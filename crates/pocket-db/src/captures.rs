//! Capture repository and extracted-entity storage.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use pocket_core::{
    Capture, ClassifiedType, Confidence, Error, ExtractedEntity, Result,
};

use crate::codec::{
    from_millis, opt_from_millis, opt_parse_enum, opt_parse_uuid, parse_enum, parse_uuid,
    to_millis,
};

const CAPTURE_COLUMNS: &str = "id, original_text, ai_title, source, classified_type, confidence, \
                               is_confirmed, parent_capture_id, created_at, updated_at, \
                               classification_completed_at";

/// SQLite repository for captures.
#[derive(Clone)]
pub struct SqliteCaptureRepository {
    pool: SqlitePool,
}

impl SqliteCaptureRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_capture(row: &SqliteRow) -> Result<Capture> {
        let id: String = row.try_get("id")?;
        let source: String = row.try_get("source")?;
        let classified_type: String = row.try_get("classified_type")?;
        Ok(Capture {
            id: parse_uuid(&id)?,
            original_text: row.try_get("original_text")?,
            ai_title: row.try_get("ai_title")?,
            source: parse_enum(&source)?,
            classified_type: parse_enum(&classified_type)?,
            confidence: opt_parse_enum(row.try_get("confidence")?)?,
            is_confirmed: row.try_get("is_confirmed")?,
            parent_capture_id: opt_parse_uuid(row.try_get("parent_capture_id")?)?,
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
            classification_completed_at: opt_from_millis(
                row.try_get("classification_completed_at")?,
            ),
        })
    }

    /// Insert a new capture.
    pub async fn insert(&self, capture: &Capture) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        Self::insert_on(&mut conn, capture).await
    }

    /// Insert a new capture inside an open transaction.
    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture: &Capture,
    ) -> Result<()> {
        Self::insert_on(&mut **tx, capture).await
    }

    async fn insert_on(conn: &mut sqlx::SqliteConnection, capture: &Capture) -> Result<()> {
        sqlx::query(
            "INSERT INTO captures (id, original_text, ai_title, source, classified_type,
                                   confidence, is_confirmed, parent_capture_id, created_at,
                                   updated_at, classification_completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(capture.id.to_string())
        .bind(&capture.original_text)
        .bind(&capture.ai_title)
        .bind(capture.source.as_str())
        .bind(capture.classified_type.as_str())
        .bind(capture.confidence.map(|c| c.as_str()))
        .bind(capture.is_confirmed)
        .bind(capture.parent_capture_id.map(|id| id.to_string()))
        .bind(to_millis(capture.created_at))
        .bind(to_millis(capture.updated_at))
        .bind(capture.classification_completed_at.map(to_millis))
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Get a capture by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Capture>> {
        let sql = format!("SELECT {CAPTURE_COLUMNS} FROM captures WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_capture).transpose()
    }

    /// Get a capture by id inside an open transaction.
    pub async fn get_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
    ) -> Result<Option<Capture>> {
        let sql = format!("SELECT {CAPTURE_COLUMNS} FROM captures WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut **tx)
            .await
            .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_capture).transpose()
    }

    /// Children created by splitting a capture, oldest first.
    pub async fn list_children(&self, parent_id: Uuid) -> Result<Vec<Capture>> {
        let sql = format!(
            "SELECT {CAPTURE_COLUMNS} FROM captures WHERE parent_capture_id = ?
             ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(parent_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(Self::row_to_capture).collect()
    }

    /// All captures, oldest first.
    pub async fn list_all(&self) -> Result<Vec<Capture>> {
        let sql = format!("SELECT {CAPTURE_COLUMNS} FROM captures ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.iter().map(Self::row_to_capture).collect()
    }

    /// Record a classification on a still-temporary capture.
    ///
    /// Type, confidence and completion time are written together, and only
    /// while the capture is `temp`. Returns false when the capture is missing
    /// or already classified.
    pub async fn update_classification_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: Uuid,
        classified_type: ClassifiedType,
        confidence: Confidence,
        ai_title: Option<&str>,
    ) -> Result<bool> {
        if classified_type == ClassifiedType::Temp {
            return Err(Error::InvalidInput(
                "classification result cannot be temp".to_string(),
            ));
        }
        let now = to_millis(Utc::now());
        let result = sqlx::query(
            "UPDATE captures
             SET classified_type = ?, confidence = ?, ai_title = ?,
                 classification_completed_at = ?, updated_at = ?
             WHERE id = ? AND classified_type = 'temp'",
        )
        .bind(classified_type.as_str())
        .bind(confidence.as_str())
        .bind(ai_title)
        .bind(now)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a remote edit if it is newer than the local row.
    ///
    /// Returns false when the capture is missing or the local copy is newer.
    pub async fn apply_remote_update(
        &self,
        id: Uuid,
        ai_title: Option<&str>,
        is_confirmed: bool,
        remote_updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE captures SET ai_title = ?, is_confirmed = ?, updated_at = ?
             WHERE id = ? AND updated_at < ?",
        )
        .bind(ai_title)
        .bind(is_confirmed)
        .bind(to_millis(remote_updated_at))
        .bind(id.to_string())
        .bind(to_millis(remote_updated_at))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace every extracted entity of a capture.
    pub async fn replace_entities_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
        entities: &[ExtractedEntity],
    ) -> Result<()> {
        sqlx::query("DELETE FROM capture_entities WHERE capture_id = ?")
            .bind(capture_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        for entity in entities {
            sqlx::query(
                "INSERT INTO capture_entities (capture_id, entity_type, value, normalized_value)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(capture_id.to_string())
            .bind(&entity.entity_type)
            .bind(&entity.value)
            .bind(&entity.normalized_value)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    /// Extracted entities of a capture in insertion order.
    pub async fn entities(&self, capture_id: Uuid) -> Result<Vec<ExtractedEntity>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT entity_type, value, normalized_value FROM capture_entities
             WHERE capture_id = ? ORDER BY id ASC",
        )
        .bind(capture_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|(entity_type, value, normalized_value)| ExtractedEntity {
                entity_type,
                value,
                normalized_value,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::memory_db;
    use pocket_core::CaptureSource;

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = memory_db().await;
        let capture = Capture::new_temp("Team sync tomorrow 3pm", CaptureSource::Voice);
        db.captures.insert(&capture).await.unwrap();

        let loaded = db.captures.get(capture.id).await.unwrap().unwrap();
        assert_eq!(loaded.original_text, "Team sync tomorrow 3pm");
        assert_eq!(loaded.source, CaptureSource::Voice);
        assert!(loaded.is_temp());
        assert!(loaded.confidence.is_none());
    }

    #[tokio::test]
    async fn test_update_classification_only_once() {
        let db = memory_db().await;
        let capture = Capture::new_temp("buy milk", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();

        let mut tx = db.pool.begin().await.unwrap();
        let first = db
            .captures
            .update_classification_tx(&mut tx, capture.id, ClassifiedType::Todo, Confidence::High, Some("Buy milk"))
            .await
            .unwrap();
        let second = db
            .captures
            .update_classification_tx(&mut tx, capture.id, ClassifiedType::Note, Confidence::Low, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(first);
        assert!(!second);
        let loaded = db.captures.get(capture.id).await.unwrap().unwrap();
        assert_eq!(loaded.classified_type, ClassifiedType::Todo);
        assert_eq!(loaded.confidence, Some(Confidence::High));
        assert!(loaded.classification_completed_at.is_some());
        assert_eq!(loaded.ai_title.as_deref(), Some("Buy milk"));
    }

    #[tokio::test]
    async fn test_update_classification_rejects_temp() {
        let db = memory_db().await;
        let capture = Capture::new_temp("x", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();

        let mut tx = db.pool.begin().await.unwrap();
        let err = db
            .captures
            .update_classification_tx(&mut tx, capture.id, ClassifiedType::Temp, Confidence::Low, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_schema_rejects_half_classified_capture() {
        let db = memory_db().await;
        let mut capture = Capture::new_temp("x", CaptureSource::App);
        capture.confidence = Some(Confidence::High);
        assert!(db.captures.insert(&capture).await.is_err());
    }

    #[tokio::test]
    async fn test_replace_entities() {
        let db = memory_db().await;
        let capture = Capture::new_temp("lunch with Ana at noon", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();

        let first = vec![ExtractedEntity {
            entity_type: "person".into(),
            value: "Ana".into(),
            normalized_value: None,
        }];
        let second = vec![ExtractedEntity {
            entity_type: "time".into(),
            value: "noon".into(),
            normalized_value: Some("12:00".into()),
        }];

        let mut tx = db.pool.begin().await.unwrap();
        db.captures.replace_entities_tx(&mut tx, capture.id, &first).await.unwrap();
        db.captures.replace_entities_tx(&mut tx, capture.id, &second).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.captures.entities(capture.id).await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_apply_remote_update_last_writer_wins() {
        let db = memory_db().await;
        let capture = Capture::new_temp("x", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();

        let older = capture.updated_at - chrono::Duration::minutes(1);
        assert!(!db
            .captures
            .apply_remote_update(capture.id, Some("old"), true, older)
            .await
            .unwrap());

        let newer = capture.updated_at + chrono::Duration::minutes(1);
        assert!(db
            .captures
            .apply_remote_update(capture.id, Some("new"), true, newer)
            .await
            .unwrap());

        let loaded = db.captures.get(capture.id).await.unwrap().unwrap();
        assert_eq!(loaded.ai_title.as_deref(), Some("new"));
        assert!(loaded.is_confirmed);
    }
}
