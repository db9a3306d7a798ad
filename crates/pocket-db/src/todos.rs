//! Todo repository.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use pocket_core::{Error, Result, Todo};

use crate::codec::{from_millis, opt_from_millis, opt_to_millis, parse_uuid, to_millis};

/// SQLite repository for todos.
#[derive(Clone)]
pub struct SqliteTodoRepository {
    pool: SqlitePool,
}

impl SqliteTodoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_todo(row: &SqliteRow) -> Result<Todo> {
        let id: String = row.try_get("id")?;
        let capture_id: String = row.try_get("capture_id")?;
        Ok(Todo {
            id: parse_uuid(&id)?,
            capture_id: parse_uuid(&capture_id)?,
            deadline: opt_from_millis(row.try_get("deadline")?),
            deadline_source: row.try_get("deadline_source")?,
            is_completed: row.try_get("is_completed")?,
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
        })
    }

    pub async fn insert(&self, todo: &Todo) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        Self::insert_on(&mut conn, todo).await
    }

    pub async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        todo: &Todo,
    ) -> Result<()> {
        Self::insert_on(&mut **tx, todo).await
    }

    async fn insert_on(conn: &mut sqlx::SqliteConnection, todo: &Todo) -> Result<()> {
        sqlx::query(
            "INSERT INTO todos (id, capture_id, deadline, deadline_source, is_completed,
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(todo.id.to_string())
        .bind(todo.capture_id.to_string())
        .bind(opt_to_millis(todo.deadline))
        .bind(&todo.deadline_source)
        .bind(todo.is_completed)
        .bind(to_millis(todo.created_at))
        .bind(to_millis(todo.updated_at))
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    pub async fn get_by_capture(&self, capture_id: Uuid) -> Result<Option<Todo>> {
        let row = sqlx::query(
            "SELECT id, capture_id, deadline, deadline_source, is_completed, created_at, updated_at
             FROM todos WHERE capture_id = ?",
        )
        .bind(capture_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;
        row.as_ref().map(Self::row_to_todo).transpose()
    }

    pub async fn delete_by_capture_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM todos WHERE capture_id = ?")
            .bind(capture_id.to_string())
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}
