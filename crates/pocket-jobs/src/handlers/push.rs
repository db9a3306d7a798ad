//! Backup push: send a capture and its derived entities to the backup
//! service.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use pocket_core::{
    BackupService, Capture, QueueAction, Result, SyncChange, SyncEntityType, SyncOperation,
};
use pocket_db::{Database, KEY_LAST_PUSH_AT};

use crate::handler::{HandlerResult, QueueContext, QueueHandler};

pub struct SyncPushHandler {
    db: Database,
    backup: Arc<dyn BackupService>,
    device_id: String,
}

impl SyncPushHandler {
    pub fn new(db: Database, backup: Arc<dyn BackupService>, device_id: impl Into<String>) -> Self {
        Self {
            db,
            backup,
            device_id: device_id.into(),
        }
    }

    /// Changes describing the capture's current state.
    ///
    /// A capture created after the last successful push is new to the
    /// backup; anything older is an update.
    async fn snapshot(&self, capture_id: Uuid) -> Result<Vec<SyncChange>> {
        let Some(capture) = self.db.captures.get(capture_id).await? else {
            return Ok(vec![SyncChange {
                entity_type: SyncEntityType::Capture,
                operation: SyncOperation::Delete,
                entity_id: capture_id,
                data: serde_json::Value::Null,
                updated_at: Utc::now(),
            }]);
        };

        let last_push = self
            .db
            .sync_state
            .get(KEY_LAST_PUSH_AT)
            .await?
            .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
            .map(|t| t.with_timezone(&Utc));
        let operation = match last_push {
            Some(at) if capture.created_at <= at => SyncOperation::Update,
            _ => SyncOperation::Create,
        };

        let mut changes = vec![change(
            SyncEntityType::Capture,
            operation,
            capture.id,
            &capture,
            capture.updated_at,
        )?];
        changes.extend(self.derived_changes(&capture, operation).await?);
        Ok(changes)
    }

    async fn derived_changes(
        &self,
        capture: &Capture,
        operation: SyncOperation,
    ) -> Result<Vec<SyncChange>> {
        let mut changes = Vec::new();
        if let Some(s) = self.db.schedules.get_by_capture(capture.id).await? {
            changes.push(change(SyncEntityType::Schedule, operation, s.id, &s, s.updated_at)?);
        }
        if let Some(t) = self.db.todos.get_by_capture(capture.id).await? {
            changes.push(change(SyncEntityType::Todo, operation, t.id, &t, t.updated_at)?);
        }
        if let Some(n) = self.db.notes.get_by_capture(capture.id).await? {
            changes.push(change(SyncEntityType::Note, operation, n.id, &n, n.updated_at)?);
        }
        Ok(changes)
    }

    async fn push(&self, capture_id: Uuid) -> Result<usize> {
        let started = Utc::now();
        let changes = self.snapshot(capture_id).await?;
        self.backup.push(&self.device_id, &changes).await?;
        self.db
            .sync_state
            .set(KEY_LAST_PUSH_AT, &started.to_rfc3339())
            .await?;
        Ok(changes.len())
    }
}

fn change<T: Serialize>(
    entity_type: SyncEntityType,
    operation: SyncOperation,
    entity_id: Uuid,
    entity: &T,
    updated_at: DateTime<Utc>,
) -> Result<SyncChange> {
    Ok(SyncChange {
        entity_type,
        operation,
        entity_id,
        data: serde_json::to_value(entity)?,
        updated_at,
    })
}

#[async_trait]
impl QueueHandler for SyncPushHandler {
    fn action(&self) -> QueueAction {
        QueueAction::SyncPush
    }

    async fn execute(&self, ctx: QueueContext) -> HandlerResult {
        let Some(capture_id) = ctx.capture_id() else {
            return HandlerResult::Failed(format!("Invalid capture id: {:?}", ctx.payload()));
        };

        match self.push(capture_id).await {
            Ok(count) => {
                info!(
                    subsystem = "jobs",
                    component = "sync_push",
                    capture_id = %capture_id,
                    row_count = count,
                    "Pushed capture to backup"
                );
                HandlerResult::Success
            }
            Err(e) => HandlerResult::from_error(&e),
        }
    }
}
