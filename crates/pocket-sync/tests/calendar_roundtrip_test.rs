//! Calendar flow across the decider and the conflict resolver: a schedule is
//! written to the calendar, edited there, and reconciled.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use pocket_core::{
    CalendarMode, CalendarSyncStatus, Capture, CaptureSource, Confidence, Schedule, ScheduleInfo,
};
use pocket_db::Database;
use pocket_sync::memory::{InMemoryCalendar, RecordingNotifier, StaticPreferences};
use pocket_sync::{CalendarSyncDecider, ConflictField, ConflictResolver, ConflictStrategy};

fn millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap()
}

async fn synced_schedule(
    db: &Database,
    decider: &CalendarSyncDecider,
    text: &str,
    location: Option<&str>,
) -> Schedule {
    let capture = Capture::new_temp(text, CaptureSource::App);
    db.captures.insert(&capture).await.unwrap();
    let start = millis(Utc::now() + Duration::days(3));
    let schedule = Schedule::new(
        capture.id,
        &ScheduleInfo {
            start_time: Some(start),
            end_time: Some(start + Duration::minutes(30)),
            location: location.map(str::to_string),
            is_all_day: false,
        },
        Confidence::High,
    );
    db.schedules.insert(&schedule).await.unwrap();

    let status = decider.sync_schedule(schedule.id).await.unwrap();
    assert_eq!(status, CalendarSyncStatus::Synced);
    db.schedules.get(schedule.id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_auto_synced_schedule_has_no_conflict_until_edited() {
    let db = Database::connect_in_memory().await.unwrap();
    let calendar = Arc::new(InMemoryCalendar::new());
    let decider = CalendarSyncDecider::new(
        db.clone(),
        calendar.clone(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(StaticPreferences::new(true, CalendarMode::Auto)),
    );
    let resolver = ConflictResolver::new(db.clone(), calendar.clone());

    let schedule = synced_schedule(&db, &decider, "Dentist checkup", Some("Main St")).await;
    assert_eq!(schedule.title.as_deref(), Some("Dentist checkup"));
    assert!(resolver.detect_default_window().await.unwrap().is_empty());

    let remote_id = schedule.remote_event_id.clone().unwrap();
    calendar.edit_event(&remote_id, |e| e.location = Some("Oak Ave".into()));

    let conflicts = resolver.detect_default_window().await.unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].differing_fields(), vec![ConflictField::Location]);
    assert_eq!(conflicts[0].local_location.as_deref(), Some("Main St"));
    assert_eq!(conflicts[0].remote_location.as_deref(), Some("Oak Ave"));

    let failures = resolver
        .resolve_all(&conflicts, ConflictStrategy::OverrideLocal)
        .await;
    assert!(failures.is_empty());

    let stored = db.schedules.get(schedule.id).await.unwrap().unwrap();
    assert_eq!(stored.location.as_deref(), Some("Oak Ave"));
    assert!(resolver.detect_default_window().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_override_remote_restores_local_values() {
    let db = Database::connect_in_memory().await.unwrap();
    let calendar = Arc::new(InMemoryCalendar::new());
    let decider = CalendarSyncDecider::new(
        db.clone(),
        calendar.clone(),
        Arc::new(RecordingNotifier::new()),
        Arc::new(StaticPreferences::new(true, CalendarMode::Auto)),
    );
    let resolver = ConflictResolver::new(db.clone(), calendar.clone());

    let schedule = synced_schedule(&db, &decider, "Planning", None).await;
    let old_id = schedule.remote_event_id.clone().unwrap();
    calendar.edit_event(&old_id, |e| {
        e.title = "Planning (renamed)".into();
        e.end_time = None;
    });

    let conflicts = resolver.detect_default_window().await.unwrap();
    assert_eq!(
        conflicts[0].differing_fields(),
        vec![ConflictField::Title, ConflictField::EndTime]
    );
    resolver
        .resolve(&conflicts[0], ConflictStrategy::OverrideRemote)
        .await
        .unwrap();

    let stored = db.schedules.get(schedule.id).await.unwrap().unwrap();
    let new_id = stored.remote_event_id.unwrap();
    let event = calendar.event(&new_id).unwrap();
    assert_eq!(event.title, "Planning");
    assert_eq!(event.end_time, schedule.end_time);
    assert_eq!(calendar.events().len(), 1);
}
