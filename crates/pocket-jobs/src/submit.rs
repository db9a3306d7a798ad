//! Capture submission: the entry point for new user input.

use tracing::{info, warn};
use uuid::Uuid;

use pocket_core::{
    Capture, CaptureSource, ClassificationStatus, Error, QueueAction, QueueRepository, Result,
};
use pocket_db::Database;

/// Saves captures and queues them for classification.
#[derive(Clone)]
pub struct CaptureSubmissionService {
    db: Database,
}

impl CaptureSubmissionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Save `text` as a temporary capture and queue its classification.
    ///
    /// Returns as soon as both are stored; classification happens in the
    /// background. Blank text is rejected without writing anything.
    pub async fn submit(&self, text: &str, source: CaptureSource) -> Result<Capture> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("capture text is blank".to_string()));
        }

        let capture = Capture::new_temp(text, source);
        self.db.captures.insert(&capture).await?;

        if let Err(e) = self
            .db
            .queue
            .enqueue(QueueAction::Classify, &capture.id.to_string())
            .await
        {
            // Without a queue item the capture would stay temp forever.
            warn!(capture_id = %capture.id, error = %e, "Enqueue failed, removing capture");
            self.db.hard_delete_capture(capture.id).await?;
            return Err(e);
        }

        info!(
            subsystem = "jobs",
            component = "submit",
            op = "submit",
            capture_id = %capture.id,
            source = %source,
            "Capture submitted"
        );
        Ok(capture)
    }

    /// Where a capture is in classification.
    ///
    /// `Failed` means the capture is still temp and its classify item is
    /// terminally failed; the user can retry with [`Self::retry_classification`].
    pub async fn classification_status(&self, capture_id: Uuid) -> Result<ClassificationStatus> {
        let capture = self
            .db
            .captures
            .get(capture_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("capture {capture_id}")))?;
        if !capture.is_temp() {
            return Ok(ClassificationStatus::Completed);
        }

        let failed = self
            .db
            .queue
            .failed_for_payload(QueueAction::Classify, &capture_id.to_string())
            .await?;
        Ok(if failed.is_some() {
            ClassificationStatus::Failed
        } else {
            ClassificationStatus::Pending
        })
    }

    /// Re-queue a failed classification with a fresh retry budget.
    ///
    /// Returns false when there is no failed classification to retry.
    pub async fn retry_classification(&self, capture_id: Uuid) -> Result<bool> {
        let failed = self
            .db
            .queue
            .failed_for_payload(QueueAction::Classify, &capture_id.to_string())
            .await?;
        match failed {
            Some(item) => self.db.queue.retry_failed(item.id).await,
            None => Ok(false),
        }
    }
}
