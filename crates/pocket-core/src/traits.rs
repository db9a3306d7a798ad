//! Core traits for Pocket abstractions.
//!
//! The queue store and every external collaborator sit behind a trait so the
//! worker and sync logic can run against SQLite and real services in the app,
//! and against in-memory doubles in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// QUEUE STORE
// =============================================================================

/// Durable store of deferred work items.
#[async_trait]
pub trait QueueRepository: Send + Sync {
    /// Insert a pending item and wake the worker.
    async fn enqueue(&self, action: QueueAction, payload: &str) -> Result<QueueItem>;

    /// Atomically move the oldest claimable pending item to processing.
    ///
    /// Two concurrent callers never receive the same item.
    async fn claim_next_pending(&self) -> Result<Option<QueueItem>>;

    /// Remove a successfully processed item.
    async fn mark_done(&self, id: Uuid) -> Result<()>;

    /// Move an item to the terminal failed state.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Count a retryable failure. The item returns to pending (claimable at
    /// `next_retry_at`) while attempts remain, else becomes failed. Returns
    /// the resulting status.
    async fn record_retryable_failure(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<QueueStatus>;

    /// Return every processing item to pending. Run once at startup, before
    /// the first claim, to recover items orphaned by a crash.
    async fn reset_all_processing_to_pending(&self) -> Result<u64>;

    /// Get an item by id.
    async fn get(&self, id: Uuid) -> Result<Option<QueueItem>>;

    /// List items in a given state, oldest first.
    async fn list_by_status(&self, status: QueueStatus) -> Result<Vec<QueueItem>>;

    /// Most recent failed item for an action and payload, if any.
    async fn failed_for_payload(
        &self,
        action: QueueAction,
        payload: &str,
    ) -> Result<Option<QueueItem>>;

    /// Counts by status.
    async fn stats(&self) -> Result<QueueStats>;

    /// Re-queue a failed item with a fresh retry budget. Returns false when
    /// the item is missing or not failed.
    async fn retry_failed(&self, id: Uuid) -> Result<bool>;
}

// =============================================================================
// EXTERNAL COLLABORATORS
// =============================================================================

/// Remote classification service.
#[async_trait]
pub trait ClassificationService: Send + Sync {
    /// Classify capture text.
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}

/// External calendar API.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Create an event and return its remote id.
    async fn create_event(&self, event: &NewCalendarEvent) -> Result<String>;

    /// Delete an event by remote id.
    async fn delete_event(&self, remote_id: &str) -> Result<()>;

    /// List events overlapping a time range.
    async fn list_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;
}

/// User-facing notifications. Calls must not block.
pub trait NotificationSink: Send + Sync {
    /// A schedule is waiting for the user to approve a calendar write.
    fn notify_suggestion(&self, schedule_id: Uuid, title: &str);

    /// A schedule was written to the calendar without asking.
    fn notify_auto_sync(&self, schedule_id: Uuid, title: &str);
}

/// Synchronous reads of user preferences.
pub trait PreferenceStore: Send + Sync {
    fn calendar_enabled(&self) -> bool;
    fn calendar_mode(&self) -> CalendarMode;
    fn notifications_enabled(&self) -> bool;
}

/// Remote backup of captures and derived entities.
#[async_trait]
pub trait BackupService: Send + Sync {
    /// Upload a batch of local changes.
    async fn push(&self, device_id: &str, changes: &[SyncChange]) -> Result<()>;

    /// Fetch remote changes since `cursor` (all changes when `None`).
    async fn pull(&self, device_id: &str, cursor: Option<&str>) -> Result<SyncPullPage>;
}
