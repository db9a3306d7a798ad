//! In-memory calendar, backup, notifier and preference doubles.
//!
//! Enabled for this crate's tests and, through the `mock` feature, for
//! downstream test suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pocket_core::{
    BackupService, CalendarEvent, CalendarMode, CalendarService, Error, NewCalendarEvent,
    NotificationSink, PreferenceStore, Result, SyncChange, SyncPullPage,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// CALENDAR
// =============================================================================

/// Calendar that keeps events in a map.
#[derive(Default)]
pub struct InMemoryCalendar {
    events: Mutex<BTreeMap<String, CalendarEvent>>,
    next_id: AtomicU64,
    fail_writes: AtomicBool,
    fail_creates: AtomicBool,
    create_delay_ms: AtomicU64,
    create_calls: AtomicUsize,
}

impl InMemoryCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every create and delete fail with a calendar error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make creates fail with a transient error while deletes keep working.
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Delay every create call, as a slow calendar provider would.
    pub fn set_create_delay(&self, delay: Duration) {
        self.create_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Place an event directly, as if created elsewhere.
    pub fn insert_event(&self, event: CalendarEvent) {
        lock(&self.events).insert(event.id.clone(), event);
    }

    /// Edit an event in place, as if changed by the user in the calendar app.
    pub fn edit_event(&self, id: &str, edit: impl FnOnce(&mut CalendarEvent)) -> bool {
        match lock(&self.events).get_mut(id) {
            Some(event) => {
                edit(event);
                true
            }
            None => false,
        }
    }

    pub fn event(&self, id: &str) -> Option<CalendarEvent> {
        lock(&self.events).get(id).cloned()
    }

    pub fn events(&self) -> Vec<CalendarEvent> {
        lock(&self.events).values().cloned().collect()
    }

    /// Number of create attempts, failed ones included.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendar {
    async fn create_event(&self, event: &NewCalendarEvent) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay_ms = self.create_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Calendar("calendar write rejected".to_string()));
        }
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::NetworkTransient("calendar unreachable".to_string()));
        }
        let id = format!("evt-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.insert_event(CalendarEvent {
            id: id.clone(),
            title: event.title.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            location: event.location.clone(),
            is_all_day: event.is_all_day,
        });
        Ok(id)
    }

    async fn delete_event(&self, remote_id: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Calendar("calendar write rejected".to_string()));
        }
        match lock(&self.events).remove(remote_id) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("calendar event {remote_id}"))),
        }
    }

    async fn list_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(lock(&self.events)
            .values()
            .filter(|e| e.start_time >= from && e.start_time <= to)
            .cloned()
            .collect())
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Suggestion { schedule_id: Uuid, title: String },
    AutoSync { schedule_id: Uuid, title: String },
}

/// Notifier that records every call.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn suggestion_count(&self) -> usize {
        lock(&self.sent)
            .iter()
            .filter(|n| matches!(n, Notification::Suggestion { .. }))
            .count()
    }

    pub fn auto_sync_count(&self) -> usize {
        lock(&self.sent)
            .iter()
            .filter(|n| matches!(n, Notification::AutoSync { .. }))
            .count()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify_suggestion(&self, schedule_id: Uuid, title: &str) {
        lock(&self.sent).push(Notification::Suggestion {
            schedule_id,
            title: title.to_string(),
        });
    }

    fn notify_auto_sync(&self, schedule_id: Uuid, title: &str) {
        lock(&self.sent).push(Notification::AutoSync {
            schedule_id,
            title: title.to_string(),
        });
    }
}

// =============================================================================
// PREFERENCES
// =============================================================================

/// Preferences held in memory and changeable at runtime.
pub struct StaticPreferences {
    calendar_enabled: AtomicBool,
    calendar_mode: Mutex<CalendarMode>,
    notifications_enabled: AtomicBool,
}

impl StaticPreferences {
    pub fn new(calendar_enabled: bool, calendar_mode: CalendarMode) -> Self {
        Self {
            calendar_enabled: AtomicBool::new(calendar_enabled),
            calendar_mode: Mutex::new(calendar_mode),
            notifications_enabled: AtomicBool::new(true),
        }
    }

    pub fn with_notifications(self, enabled: bool) -> Self {
        self.notifications_enabled.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn set_calendar_enabled(&self, enabled: bool) {
        self.calendar_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_calendar_mode(&self, mode: CalendarMode) {
        *lock(&self.calendar_mode) = mode;
    }
}

impl Default for StaticPreferences {
    fn default() -> Self {
        Self::new(false, CalendarMode::default())
    }
}

impl PreferenceStore for StaticPreferences {
    fn calendar_enabled(&self) -> bool {
        self.calendar_enabled.load(Ordering::SeqCst)
    }

    fn calendar_mode(&self) -> CalendarMode {
        *lock(&self.calendar_mode)
    }

    fn notifications_enabled(&self) -> bool {
        self.notifications_enabled.load(Ordering::SeqCst)
    }
}

// =============================================================================
// BACKUP
// =============================================================================

/// Backup service storing pushed changes and serving scripted remote changes.
///
/// Cursors are decimal offsets into the remote change log.
#[derive(Default)]
pub struct InMemoryBackup {
    pushed: Mutex<Vec<SyncChange>>,
    remote: Mutex<Vec<SyncChange>>,
    fail_push: AtomicBool,
}

impl InMemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a change that the next pull will return.
    pub fn add_remote_change(&self, change: SyncChange) {
        lock(&self.remote).push(change);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    pub fn pushed(&self) -> Vec<SyncChange> {
        lock(&self.pushed).clone()
    }
}

#[async_trait]
impl BackupService for InMemoryBackup {
    async fn push(&self, _device_id: &str, changes: &[SyncChange]) -> Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(Error::ServiceUnavailable("backup unavailable".to_string()));
        }
        lock(&self.pushed).extend_from_slice(changes);
        Ok(())
    }

    async fn pull(&self, _device_id: &str, cursor: Option<&str>) -> Result<SyncPullPage> {
        let offset = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| Error::InvalidInput(format!("bad cursor {c:?}")))?,
            None => 0,
        };
        let remote = lock(&self.remote);
        let changes = remote.iter().skip(offset).cloned().collect();
        Ok(SyncPullPage {
            changes,
            next_cursor: Some(remote.len().to_string()),
        })
    }
}
