//! Classify handler: send a capture's text to the classifier and apply the
//! answer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use pocket_core::{ClassificationService, QueueAction, QueueRepository};
use pocket_db::Database;

use crate::apply::ClassificationResultApplier;
use crate::handler::{HandlerResult, QueueContext, QueueHandler};

pub struct ClassifyHandler {
    db: Database,
    classifier: Arc<dyn ClassificationService>,
    applier: ClassificationResultApplier,
    queue_push: bool,
}

impl ClassifyHandler {
    pub fn new(
        db: Database,
        classifier: Arc<dyn ClassificationService>,
        applier: ClassificationResultApplier,
    ) -> Self {
        Self {
            db,
            classifier,
            applier,
            queue_push: false,
        }
    }

    /// Queue a backup push for each capture after it is classified.
    pub fn with_backup_push(mut self, enabled: bool) -> Self {
        self.queue_push = enabled;
        self
    }
}

#[async_trait]
impl QueueHandler for ClassifyHandler {
    fn action(&self) -> QueueAction {
        QueueAction::Classify
    }

    async fn execute(&self, ctx: QueueContext) -> HandlerResult {
        let Some(capture_id) = ctx.capture_id() else {
            return HandlerResult::Failed(format!("Invalid capture id: {:?}", ctx.payload()));
        };

        let capture = match self.db.captures.get(capture_id).await {
            Ok(Some(capture)) => capture,
            Ok(None) => {
                debug!(capture_id = %capture_id, "Capture gone, nothing to classify");
                return HandlerResult::Success;
            }
            Err(e) => return HandlerResult::from_error(&e),
        };
        if !capture.is_temp() {
            debug!(capture_id = %capture_id, "Capture already classified");
            return HandlerResult::Success;
        }

        let result = match self.classifier.classify(&capture.original_text).await {
            Ok(result) => result,
            Err(e) => return HandlerResult::from_error(&e),
        };
        debug!(
            capture_id = %capture_id,
            classifier = self.classifier.name(),
            classified_type = %result.classified_type,
            "Classifier answered"
        );

        let outcome = match self.applier.apply(capture_id, &result).await {
            Ok(outcome) => outcome,
            Err(e) => return HandlerResult::from_error(&e),
        };

        if outcome.applied && self.queue_push {
            if let Err(e) = self
                .db
                .queue
                .enqueue(QueueAction::SyncPush, &capture_id.to_string())
                .await
            {
                // The classification itself is stored; the push can be redone later.
                info!(capture_id = %capture_id, error = %e, "Backup push not queued");
            }
        }

        HandlerResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pocket_core::{
        CaptureSource, ClassificationResult, ClassifiedType, Confidence, QueueItem, QueueStatus,
    };
    use pocket_inference::mock::{MockClassifier, MockFailure};
    use pocket_sync::memory::{InMemoryCalendar, RecordingNotifier, StaticPreferences};
    use pocket_sync::CalendarSyncDecider;
    use uuid::Uuid;

    fn handler(db: &Database, classifier: MockClassifier) -> ClassifyHandler {
        let decider = CalendarSyncDecider::new(
            db.clone(),
            Arc::new(InMemoryCalendar::new()),
            Arc::new(RecordingNotifier::new()),
            Arc::new(StaticPreferences::default()),
        );
        ClassifyHandler::new(
            db.clone(),
            Arc::new(classifier),
            ClassificationResultApplier::new(db.clone(), decider),
        )
    }

    fn ctx(payload: &str) -> QueueContext {
        QueueContext::new(QueueItem {
            id: Uuid::now_v7(),
            action: QueueAction::Classify,
            payload: payload.to_string(),
            retry_count: 0,
            max_retries: 3,
            status: QueueStatus::Processing,
            last_error: None,
            next_retry_at: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
        })
    }

    #[tokio::test]
    async fn test_classifies_temp_capture() {
        let db = Database::connect_in_memory().await.unwrap();
        let capture = pocket_core::Capture::new_temp("buy milk", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();
        let classifier = MockClassifier::new().with_response_for(
            "buy milk",
            ClassificationResult::new(ClassifiedType::Todo, Confidence::High),
        );

        let result = handler(&db, classifier.clone())
            .execute(ctx(&capture.id.to_string()))
            .await;

        assert_eq!(result, HandlerResult::Success);
        assert_eq!(classifier.calls(), vec!["buy milk".to_string()]);
        let stored = db.captures.get(capture.id).await.unwrap().unwrap();
        assert_eq!(stored.classified_type, ClassifiedType::Todo);
    }

    #[tokio::test]
    async fn test_skips_classified_and_missing_captures() {
        let db = Database::connect_in_memory().await.unwrap();
        let classifier = MockClassifier::new();
        let h = handler(&db, classifier.clone());

        assert_eq!(
            h.execute(ctx(&Uuid::now_v7().to_string())).await,
            HandlerResult::Success
        );
        assert_eq!(classifier.call_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_payload_fails() {
        let db = Database::connect_in_memory().await.unwrap();
        let h = handler(&db, MockClassifier::new());
        assert!(matches!(h.execute(ctx("nope")).await, HandlerResult::Failed(_)));
    }

    #[tokio::test]
    async fn test_classifier_errors_by_retry_class() {
        let db = Database::connect_in_memory().await.unwrap();
        let capture = pocket_core::Capture::new_temp("x", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();

        let transient = handler(
            &db,
            MockClassifier::new().always_failing(MockFailure::ServiceUnavailable),
        );
        assert!(matches!(
            transient.execute(ctx(&capture.id.to_string())).await,
            HandlerResult::Retry(_)
        ));

        let permanent = handler(
            &db,
            MockClassifier::new().always_failing(MockFailure::Unauthorized),
        );
        assert!(matches!(
            permanent.execute(ctx(&capture.id.to_string())).await,
            HandlerResult::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_queues_backup_push_when_enabled() {
        let db = Database::connect_in_memory().await.unwrap();
        let capture = pocket_core::Capture::new_temp("an idea", CaptureSource::App);
        db.captures.insert(&capture).await.unwrap();
        let h = handler(&db, MockClassifier::new()).with_backup_push(true);

        h.execute(ctx(&capture.id.to_string())).await;

        let pending = db.queue.list_by_status(QueueStatus::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].action, QueueAction::SyncPush);
    }
}
