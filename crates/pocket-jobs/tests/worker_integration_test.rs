//! Integration tests for the capture pipeline.
//!
//! Covers:
//! - Submit → worker → classification → calendar, end to end
//! - Retry exhaustion leaves the capture temp and surfaces the failure
//! - Crash recovery of orphaned processing items
//! - Panicking and slow handlers are contained
//! - A split interrupted by a timeout leaves no temp children behind
//! - Enqueue wakes an idle worker without waiting for the poll
//! - Graceful shutdown

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, TimeZone, Utc};
use tokio::sync::broadcast;
use tokio::time::timeout;

use pocket_core::{
    CalendarMode, CalendarSyncStatus, CaptureSource, ClassificationResult, ClassificationStatus,
    ClassifiedType, Confidence, QueueAction, QueueRepository, QueueStatus, ScheduleInfo,
    SplitItem,
};
use pocket_db::Database;
use pocket_inference::mock::{MockClassifier, MockFailure};
use pocket_jobs::{
    CaptureSubmissionService, ClassificationResultApplier, ClassifyHandler, QueueWorker,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};
use pocket_sync::memory::{InMemoryCalendar, RecordingNotifier, StaticPreferences};
use pocket_sync::CalendarSyncDecider;

// ============================================================================
// HELPERS
// ============================================================================

struct Pipeline {
    db: Database,
    calendar: Arc<InMemoryCalendar>,
    notifier: Arc<RecordingNotifier>,
    prefs: Arc<StaticPreferences>,
    submit: CaptureSubmissionService,
}

async fn pipeline(prefs: StaticPreferences) -> Pipeline {
    let db = Database::connect_in_memory()
        .await
        .expect("Failed to open database");
    Pipeline {
        calendar: Arc::new(InMemoryCalendar::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        prefs: Arc::new(prefs),
        submit: CaptureSubmissionService::new(db.clone()),
        db,
    }
}

impl Pipeline {
    fn classify_handler(&self, classifier: MockClassifier) -> ClassifyHandler {
        let decider = CalendarSyncDecider::new(
            self.db.clone(),
            self.calendar.clone(),
            self.notifier.clone(),
            self.prefs.clone(),
        );
        ClassifyHandler::new(
            self.db.clone(),
            Arc::new(classifier),
            ClassificationResultApplier::new(self.db.clone(), decider),
        )
    }

    async fn worker(&self, classifier: MockClassifier, config: WorkerConfig) -> QueueWorker {
        WorkerBuilder::new(self.db.clone())
            .with_config(config)
            .with_handler(self.classify_handler(classifier))
            .build()
            .await
    }
}

/// Retries become claimable immediately; the poll is long so that only
/// explicit wakes drive a started worker.
fn test_config() -> WorkerConfig {
    WorkerConfig::default()
        .with_poll_interval(60_000)
        .with_retry_backoff(0, 1)
        .with_handler_timeout(5)
}

async fn wait_for<F>(events: &mut broadcast::Receiver<WorkerEvent>, mut pred: F) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    timeout(Duration::from_secs(10), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for worker event")
}

fn team_sync_result() -> ClassificationResult {
    let tomorrow = Utc::now().date_naive() + Days::new(1);
    let start = Utc.from_utc_datetime(&tomorrow.and_hms_opt(15, 0, 0).unwrap());
    let mut result = ClassificationResult::new(ClassifiedType::Schedule, Confidence::High);
    result.ai_title = Some("Team sync".into());
    result.schedule_info = Some(ScheduleInfo {
        start_time: Some(start),
        end_time: None,
        location: None,
        is_all_day: false,
    });
    result
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_team_sync_end_to_end_auto_mode() {
    let p = pipeline(StaticPreferences::new(true, CalendarMode::Auto)).await;
    let classifier =
        MockClassifier::new().with_response_for("Team sync tomorrow 3pm", team_sync_result());
    let worker = p.worker(classifier, test_config()).await;
    let handle = worker.start();
    let mut events = handle.events();

    let capture = p
        .submit
        .submit("Team sync tomorrow 3pm", CaptureSource::App)
        .await
        .unwrap();
    assert!(capture.is_temp());

    wait_for(&mut events, |e| matches!(e, WorkerEvent::ItemCompleted { .. })).await;

    let stored = p.db.captures.get(capture.id).await.unwrap().unwrap();
    assert_eq!(stored.classified_type, ClassifiedType::Schedule);
    assert_eq!(stored.confidence, Some(Confidence::High));

    let schedule = p.db.schedules.get_by_capture(capture.id).await.unwrap().unwrap();
    assert_eq!(schedule.calendar_sync_status, CalendarSyncStatus::Synced);
    let remote_id = schedule.remote_event_id.expect("remote event id");
    let event = p.calendar.event(&remote_id).expect("event in calendar");
    assert_eq!(event.title, "Team sync");
    assert_eq!(p.notifier.auto_sync_count(), 1);

    assert_eq!(
        p.submit.classification_status(capture.id).await.unwrap(),
        ClassificationStatus::Completed
    );
    assert_eq!(p.db.queue.stats().await.unwrap().total(), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_suggest_mode_leaves_suggestion_pending() {
    let p = pipeline(StaticPreferences::new(true, CalendarMode::Suggest)).await;
    let classifier =
        MockClassifier::new().with_response_for("Team sync tomorrow 3pm", team_sync_result());
    let worker = p.worker(classifier, test_config()).await;

    let capture = p
        .submit
        .submit("Team sync tomorrow 3pm", CaptureSource::App)
        .await
        .unwrap();
    worker.drain_once().await.unwrap();

    let schedule = p.db.schedules.get_by_capture(capture.id).await.unwrap().unwrap();
    assert_eq!(
        schedule.calendar_sync_status,
        CalendarSyncStatus::SuggestionPending
    );
    assert!(p.calendar.events().is_empty());
    assert_eq!(p.notifier.suggestion_count(), 1);
}

#[tokio::test]
async fn test_retry_exhaustion_marks_failed() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new().always_failing(MockFailure::ServiceUnavailable);
    let worker = p.worker(classifier.clone(), test_config()).await;
    let mut events = worker.events();

    let capture = p.submit.submit("buy milk", CaptureSource::App).await.unwrap();
    worker.drain_once().await.unwrap();

    // One attempt per retry budget unit, with strictly increasing counts.
    assert_eq!(classifier.call_count(), 3);
    let mut retry_counts = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let WorkerEvent::ItemRetrying { retry_count, .. } = event {
            retry_counts.push(retry_count);
        }
    }
    assert_eq!(retry_counts, vec![1, 2]);

    let failed = p.db.queue.list_by_status(QueueStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 3);
    assert!(failed[0].last_error.as_deref().unwrap().contains("unavailable"));

    // Never claimed again.
    assert_eq!(worker.drain_once().await.unwrap(), 0);
    assert_eq!(classifier.call_count(), 3);

    assert!(p.db.captures.get(capture.id).await.unwrap().unwrap().is_temp());
    assert_eq!(
        p.submit.classification_status(capture.id).await.unwrap(),
        ClassificationStatus::Failed
    );
}

#[tokio::test]
async fn test_non_retryable_error_fails_on_first_attempt() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new().always_failing(MockFailure::Unauthorized);
    let worker = p.worker(classifier.clone(), test_config()).await;

    p.submit.submit("buy milk", CaptureSource::App).await.unwrap();
    worker.drain_once().await.unwrap();

    assert_eq!(classifier.call_count(), 1);
    let failed = p.db.queue.list_by_status(QueueStatus::Failed).await.unwrap();
    assert_eq!(failed[0].retry_count, 0);
}

#[tokio::test]
async fn test_transient_failures_then_success() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new().failing_times(2, MockFailure::Network);
    let worker = p.worker(classifier.clone(), test_config()).await;

    let capture = p.submit.submit("an idea", CaptureSource::App).await.unwrap();
    worker.drain_once().await.unwrap();

    assert_eq!(classifier.call_count(), 3);
    let stored = p.db.captures.get(capture.id).await.unwrap().unwrap();
    assert_eq!(stored.classified_type, ClassifiedType::Note);
    assert_eq!(p.db.queue.stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_crash_recovery_resets_processing_before_claim() {
    let p = pipeline(StaticPreferences::default()).await;
    let capture = p.submit.submit("buy milk", CaptureSource::App).await.unwrap();

    // A previous process claimed the item and died.
    let orphan = p.db.queue.claim_next_pending().await.unwrap().unwrap();
    assert_eq!(orphan.status, QueueStatus::Processing);

    let classifier = MockClassifier::new();
    let worker = p.worker(classifier.clone(), test_config()).await;
    assert_eq!(worker.drain_once().await.unwrap(), 1);

    assert_eq!(classifier.call_count(), 1);
    assert!(!p.db.captures.get(capture.id).await.unwrap().unwrap().is_temp());
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new().panicking_on("boom");
    let worker = p.worker(classifier, test_config()).await;

    let bad = p.submit.submit("boom", CaptureSource::App).await.unwrap();
    let good = p.submit.submit("fine", CaptureSource::App).await.unwrap();
    worker.drain_once().await.unwrap();

    // The panic counts as a retryable failure and uses up the budget.
    let failed = p.db.queue.list_by_status(QueueStatus::Failed).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].capture_id(), Some(bad.id));
    assert!(failed[0].last_error.as_deref().unwrap().contains("panicked"));

    assert!(!p.db.captures.get(good.id).await.unwrap().unwrap().is_temp());
}

#[tokio::test]
async fn test_slow_handler_times_out_as_retryable() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new().with_latency(Duration::from_secs(3));
    let config = WorkerConfig::default()
        .with_handler_timeout(1)
        .with_retry_backoff(60_000, 3);
    let worker = p.worker(classifier, config).await;

    let capture = p.submit.submit("slow", CaptureSource::App).await.unwrap();
    worker.drain_once().await.unwrap();

    let item = &p.db.queue.list_by_status(QueueStatus::Pending).await.unwrap()[0];
    assert_eq!(item.retry_count, 1);
    assert!(item.last_error.as_deref().unwrap().contains("timeout"));
    assert!(p.db.captures.get(capture.id).await.unwrap().unwrap().is_temp());
}

#[tokio::test]
async fn test_split_interrupted_by_timeout_leaves_no_temp_children() {
    let p = pipeline(StaticPreferences::new(true, CalendarMode::Auto)).await;
    // Two calendar writes outlast the one-second handler deadline.
    p.calendar.set_create_delay(Duration::from_millis(1_500));

    let split_schedule = |text: &str, days: u64| {
        let day = Utc::now().date_naive() + Days::new(days);
        SplitItem {
            split_text: text.into(),
            classified_type: ClassifiedType::Schedule,
            confidence: Confidence::High,
            ai_title: Some(text.into()),
            tags: vec![],
            schedule_info: Some(ScheduleInfo {
                start_time: Some(Utc.from_utc_datetime(&day.and_hms_opt(9, 0, 0).unwrap())),
                end_time: None,
                location: None,
                is_all_day: false,
            }),
            todo_info: None,
            note_folder: None,
        }
    };
    let mut result = ClassificationResult::new(ClassifiedType::Schedule, Confidence::High);
    result.split_items = vec![split_schedule("Standup", 1), split_schedule("Review", 2)];

    let text = "standup tomorrow and review the day after";
    let classifier = MockClassifier::new().with_response_for(text, result);
    let config = test_config().with_handler_timeout(1);
    let worker = p.worker(classifier.clone(), config).await;

    let capture = p.submit.submit(text, CaptureSource::App).await.unwrap();
    worker.drain_once().await.unwrap();

    // The timed-out attempt was retried and found the capture classified.
    assert_eq!(classifier.call_count(), 1);
    assert_eq!(p.db.queue.stats().await.unwrap().total(), 0);

    let children = p.db.captures.list_children(capture.id).await.unwrap();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| !c.is_temp()));
    for child in &children {
        assert_eq!(
            p.submit.classification_status(child.id).await.unwrap(),
            ClassificationStatus::Completed
        );
    }

    // Calendar decisions finish on their own and settle every schedule.
    timeout(Duration::from_secs(10), async {
        loop {
            let mut settled = true;
            for child in &children {
                let schedule = p.db.schedules.get_by_capture(child.id).await.unwrap().unwrap();
                settled &= schedule.calendar_sync_status == CalendarSyncStatus::Synced;
            }
            if settled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("schedules never reached the calendar");
    assert_eq!(p.calendar.events().len(), 2);
}

#[tokio::test]
async fn test_duplicate_classify_items_apply_once() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new();
    let worker = p.worker(classifier.clone(), test_config()).await;

    let capture = p.submit.submit("an idea", CaptureSource::App).await.unwrap();
    p.db.queue
        .enqueue(QueueAction::Classify, &capture.id.to_string())
        .await
        .unwrap();

    assert_eq!(worker.drain_once().await.unwrap(), 2);

    // The second item finds the capture classified and skips the classifier.
    assert_eq!(classifier.call_count(), 1);
    assert!(p.db.notes.get_by_capture(capture.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_enqueue_wakes_idle_worker() {
    let p = pipeline(StaticPreferences::default()).await;
    let worker = p.worker(MockClassifier::new(), test_config()).await;
    let handle = worker.start();
    let mut events = handle.events();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::WorkerStarted)).await;

    // Let the worker go idle on its 60 s poll before submitting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let capture = p.submit.submit("an idea", CaptureSource::App).await.unwrap();

    wait_for(&mut events, |e| matches!(e, WorkerEvent::ItemCompleted { .. })).await;
    assert!(!p.db.captures.get(capture.id).await.unwrap().unwrap().is_temp());

    handle.shutdown().await.unwrap();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::WorkerStopped)).await;
}

#[tokio::test]
async fn test_trigger_drains_retry_after_manual_requeue() {
    let p = pipeline(StaticPreferences::default()).await;
    let classifier = MockClassifier::new().failing_times(3, MockFailure::ServerError);
    let worker = p.worker(classifier.clone(), test_config()).await;
    let handle = worker.start();
    let mut events = handle.events();

    let capture = p.submit.submit("an idea", CaptureSource::App).await.unwrap();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::ItemFailed { .. })).await;
    assert_eq!(
        p.submit.classification_status(capture.id).await.unwrap(),
        ClassificationStatus::Failed
    );

    assert!(p.submit.retry_classification(capture.id).await.unwrap());
    handle.trigger();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::ItemCompleted { .. })).await;

    assert_eq!(classifier.call_count(), 4);
    assert_eq!(
        p.submit.classification_status(capture.id).await.unwrap(),
        ClassificationStatus::Completed
    );
    handle.shutdown().await.unwrap();
}
