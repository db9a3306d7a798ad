//! Backup pull: apply remote capture changes made on other devices.
//!
//! Remote edits win only when newer than the local row. Pulling the same
//! page twice is harmless, so a failed pull is simply retried from the
//! stored cursor.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use pocket_core::{
    BackupService, Capture, QueueAction, Result, SyncChange, SyncEntityType, SyncOperation,
};
use pocket_db::{Database, KEY_PULL_CURSOR};

use crate::handler::{HandlerResult, QueueContext, QueueHandler};

/// Capture fields that may be edited remotely.
#[derive(Debug, Deserialize)]
struct RemoteCaptureEdit {
    #[serde(default)]
    ai_title: Option<String>,
    #[serde(default)]
    is_confirmed: bool,
}

/// Counts from one pull.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PullSummary {
    pub applied: usize,
    pub skipped: usize,
}

pub struct SyncPullHandler {
    db: Database,
    backup: Arc<dyn BackupService>,
    device_id: String,
}

impl SyncPullHandler {
    pub fn new(db: Database, backup: Arc<dyn BackupService>, device_id: impl Into<String>) -> Self {
        Self {
            db,
            backup,
            device_id: device_id.into(),
        }
    }

    /// Pull one page from the stored cursor, apply it, and advance the cursor.
    pub async fn pull(&self) -> Result<PullSummary> {
        let cursor = self.db.sync_state.get(KEY_PULL_CURSOR).await?;
        let page = self.backup.pull(&self.device_id, cursor.as_deref()).await?;

        let mut summary = PullSummary::default();
        for change in &page.changes {
            if self.apply_change(change).await? {
                summary.applied += 1;
            } else {
                summary.skipped += 1;
            }
        }

        if let Some(next) = page.next_cursor.as_deref() {
            self.db.sync_state.set(KEY_PULL_CURSOR, next).await?;
        }
        Ok(summary)
    }

    /// Returns whether the change altered local state.
    async fn apply_change(&self, change: &SyncChange) -> Result<bool> {
        if change.entity_type != SyncEntityType::Capture {
            debug!(
                entity_type = %change.entity_type,
                entity_id = %change.entity_id,
                "Remote change for derived entity ignored"
            );
            return Ok(false);
        }

        match change.operation {
            SyncOperation::Delete => self.db.hard_delete_capture(change.entity_id).await,
            SyncOperation::Create | SyncOperation::Update => {
                if self.db.captures.get(change.entity_id).await?.is_none() {
                    return self.insert_remote(change).await;
                }
                let edit: RemoteCaptureEdit = match serde_json::from_value(change.data.clone()) {
                    Ok(edit) => edit,
                    Err(e) => {
                        warn!(entity_id = %change.entity_id, error = %e, "Malformed remote capture");
                        return Ok(false);
                    }
                };
                self.db
                    .captures
                    .apply_remote_update(
                        change.entity_id,
                        edit.ai_title.as_deref(),
                        edit.is_confirmed,
                        change.updated_at,
                    )
                    .await
            }
        }
    }

    async fn insert_remote(&self, change: &SyncChange) -> Result<bool> {
        match serde_json::from_value::<Capture>(change.data.clone()) {
            Ok(capture) if capture.id == change.entity_id => {
                self.db.captures.insert(&capture).await?;
                Ok(true)
            }
            Ok(_) => {
                warn!(entity_id = %change.entity_id, "Remote capture id mismatch");
                Ok(false)
            }
            Err(e) => {
                warn!(entity_id = %change.entity_id, error = %e, "Malformed remote capture");
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl QueueHandler for SyncPullHandler {
    fn action(&self) -> QueueAction {
        QueueAction::SyncPull
    }

    async fn execute(&self, _ctx: QueueContext) -> HandlerResult {
        match self.pull().await {
            Ok(summary) => {
                info!(
                    subsystem = "jobs",
                    component = "sync_pull",
                    applied = summary.applied,
                    skipped = summary.skipped,
                    "Pulled remote changes"
                );
                HandlerResult::Success
            }
            Err(e) => HandlerResult::from_error(&e),
        }
    }
}
