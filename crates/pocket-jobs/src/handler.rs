//! Queue handlers, one per queue action.

use async_trait::async_trait;
use uuid::Uuid;

use pocket_core::{Error, QueueAction, QueueItem};

/// Context provided to queue handlers.
pub struct QueueContext {
    /// The claimed item being processed.
    pub item: QueueItem,
}

impl QueueContext {
    pub fn new(item: QueueItem) -> Self {
        Self { item }
    }

    /// The payload parsed as a capture id.
    pub fn capture_id(&self) -> Option<Uuid> {
        self.item.capture_id()
    }

    pub fn payload(&self) -> &str {
        &self.item.payload
    }
}

/// Result of handling one queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerResult {
    /// Done; the item is removed from the queue.
    Success,
    /// Will not succeed on retry; the item becomes terminally failed.
    Failed(String),
    /// Transient problem; retried with backoff while attempts remain.
    Retry(String),
}

impl HandlerResult {
    /// Map an error to a result by its retry class.
    pub fn from_error(error: &Error) -> Self {
        if error.is_retryable() {
            Self::Retry(error.to_string())
        } else {
            Self::Failed(error.to_string())
        }
    }
}

impl<T> From<pocket_core::Result<T>> for HandlerResult {
    fn from(result: pocket_core::Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Trait for queue handlers.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// The action this handler processes.
    fn action(&self) -> QueueAction;

    /// Process the item.
    async fn execute(&self, ctx: QueueContext) -> HandlerResult;

    /// Check if this handler can process the given action.
    fn can_handle(&self, action: QueueAction) -> bool {
        self.action() == action
    }
}

/// Handler that succeeds without doing anything.
pub struct NoOpHandler {
    action: QueueAction,
}

impl NoOpHandler {
    pub fn new(action: QueueAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl QueueHandler for NoOpHandler {
    fn action(&self) -> QueueAction {
        self.action
    }

    async fn execute(&self, _ctx: QueueContext) -> HandlerResult {
        HandlerResult::Success
    }
}
