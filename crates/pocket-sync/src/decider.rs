//! Calendar sync decision for newly derived schedules.
//!
//! Whether a schedule is written to the calendar right away, offered to the
//! user as a suggestion, or left alone depends on three inputs: the calendar
//! toggle, the calendar mode, and the classifier's confidence. The decision
//! itself is the pure function [`decide`]; [`CalendarSyncDecider`] carries it
//! out against the database, the calendar, and the notifier.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use pocket_core::{
    defaults, CalendarMode, CalendarService, CalendarSyncStatus, Confidence, Error,
    NewCalendarEvent, NotificationSink, PreferenceStore, Result, Schedule,
};
use pocket_db::Database;

/// Outcome of the confidence gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Calendar integration is off; leave the schedule unlinked.
    NotLinked,
    /// Ask the user before writing to the calendar.
    Suggest,
    /// Write the event to the calendar now.
    AutoSync,
}

/// Decide how a schedule reaches the calendar.
///
/// | enabled | mode    | confidence  | decision  |
/// |---------|---------|-------------|-----------|
/// | false   | any     | any         | NotLinked |
/// | true    | suggest | any         | Suggest   |
/// | true    | auto    | high/medium | AutoSync  |
/// | true    | auto    | low/none    | Suggest   |
pub fn decide(enabled: bool, mode: CalendarMode, confidence: Option<Confidence>) -> SyncDecision {
    if !enabled {
        return SyncDecision::NotLinked;
    }
    match (mode, confidence) {
        (CalendarMode::Auto, Some(Confidence::High | Confidence::Medium)) => SyncDecision::AutoSync,
        _ => SyncDecision::Suggest,
    }
}

/// Runs the sync decision for stored schedules and applies its effects.
#[derive(Clone)]
pub struct CalendarSyncDecider {
    db: Database,
    calendar: Arc<dyn CalendarService>,
    notifier: Arc<dyn NotificationSink>,
    prefs: Arc<dyn PreferenceStore>,
    write_timeout: StdDuration,
}

impl CalendarSyncDecider {
    pub fn new(
        db: Database,
        calendar: Arc<dyn CalendarService>,
        notifier: Arc<dyn NotificationSink>,
        prefs: Arc<dyn PreferenceStore>,
    ) -> Self {
        Self {
            db,
            calendar,
            notifier,
            prefs,
            write_timeout: StdDuration::from_secs(defaults::CALENDAR_WRITE_TIMEOUT_SECS),
        }
    }

    /// Bound on a single calendar create. A write that takes longer is
    /// recorded as `SyncFailed`.
    pub fn with_write_timeout(mut self, timeout: StdDuration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Decide and act for one schedule, returning the stored sync status.
    ///
    /// A failed calendar write is recorded as `SyncFailed` and is not an
    /// error. Errors come only from the local store.
    #[instrument(skip(self), fields(subsystem = "sync", component = "decider", op = "sync_schedule"))]
    pub async fn sync_schedule(&self, schedule_id: Uuid) -> Result<CalendarSyncStatus> {
        let schedule = self.load_schedule(schedule_id).await?;
        let title = self.event_title(&schedule).await?;

        let mut decision = decide(
            self.prefs.calendar_enabled(),
            self.prefs.calendar_mode(),
            schedule.confidence,
        );
        if decision == SyncDecision::AutoSync && schedule.start_time.is_none() {
            debug!(schedule_id = %schedule_id, "No start time, falling back to suggestion");
            decision = SyncDecision::Suggest;
        }

        debug!(schedule_id = %schedule_id, decision = ?decision, "Calendar sync decided");

        match decision {
            SyncDecision::NotLinked => {
                self.db
                    .schedules
                    .update_sync_status(schedule_id, CalendarSyncStatus::NotLinked, None)
                    .await?;
                Ok(CalendarSyncStatus::NotLinked)
            }
            SyncDecision::Suggest => {
                self.db
                    .schedules
                    .update_sync_status(schedule_id, CalendarSyncStatus::SuggestionPending, None)
                    .await?;
                if self.prefs.notifications_enabled() {
                    self.notifier.notify_suggestion(schedule_id, &title);
                }
                Ok(CalendarSyncStatus::SuggestionPending)
            }
            SyncDecision::AutoSync => {
                let status = self.write_event(&schedule, &title).await?;
                if status == CalendarSyncStatus::Synced && self.prefs.notifications_enabled() {
                    self.notifier.notify_auto_sync(schedule_id, &title);
                }
                Ok(status)
            }
        }
    }

    /// Write a suggested schedule to the calendar at the user's request.
    ///
    /// Returns `InvalidInput` when the schedule has no start time. An already
    /// synced schedule is left as it is.
    pub async fn approve_suggestion(&self, schedule_id: Uuid) -> Result<CalendarSyncStatus> {
        let schedule = self.load_schedule(schedule_id).await?;
        if schedule.calendar_sync_status == CalendarSyncStatus::Synced {
            return Ok(CalendarSyncStatus::Synced);
        }
        if schedule.start_time.is_none() {
            return Err(Error::InvalidInput(format!(
                "schedule {schedule_id} has no start time"
            )));
        }
        let title = self.event_title(&schedule).await?;
        self.write_event(&schedule, &title).await
    }

    /// Decline a suggestion. The schedule stays, unlinked, as `Rejected`.
    pub async fn reject_suggestion(&self, schedule_id: Uuid) -> Result<()> {
        self.db
            .schedules
            .update_sync_status(schedule_id, CalendarSyncStatus::Rejected, None)
            .await?;
        info!(
            subsystem = "sync",
            component = "decider",
            op = "reject_suggestion",
            schedule_id = %schedule_id,
            "Calendar suggestion rejected"
        );
        Ok(())
    }

    async fn load_schedule(&self, schedule_id: Uuid) -> Result<Schedule> {
        self.db
            .schedules
            .get(schedule_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schedule {schedule_id}")))
    }

    async fn event_title(&self, schedule: &Schedule) -> Result<String> {
        if let Some(title) = schedule.title.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(title.to_string());
        }
        let capture = self
            .db
            .captures
            .get(schedule.capture_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("capture {}", schedule.capture_id)))?;
        Ok(capture.display_title())
    }

    /// Create the remote event and record the result on the schedule.
    async fn write_event(&self, schedule: &Schedule, title: &str) -> Result<CalendarSyncStatus> {
        let Some(event) = new_event(schedule, title) else {
            return Err(Error::InvalidInput(format!(
                "schedule {} has no start time",
                schedule.id
            )));
        };

        let write = self.calendar.create_event(&event);
        let created = match tokio::time::timeout(self.write_timeout, write).await {
            Ok(created) => created,
            Err(_) => Err(Error::NetworkTransient(format!(
                "calendar write timed out after {:?}",
                self.write_timeout
            ))),
        };

        match created {
            Ok(remote_id) => {
                self.db
                    .schedules
                    .mark_synced(schedule.id, &remote_id, title)
                    .await?;
                info!(
                    subsystem = "sync",
                    component = "decider",
                    op = "write_event",
                    schedule_id = %schedule.id,
                    remote_event_id = %remote_id,
                    "Schedule written to calendar"
                );
                Ok(CalendarSyncStatus::Synced)
            }
            Err(e) => {
                warn!(
                    subsystem = "sync",
                    component = "decider",
                    op = "write_event",
                    schedule_id = %schedule.id,
                    error = %e,
                    "Calendar write failed"
                );
                self.db
                    .schedules
                    .update_sync_status(schedule.id, CalendarSyncStatus::SyncFailed, None)
                    .await?;
                Ok(CalendarSyncStatus::SyncFailed)
            }
        }
    }
}

/// Build the calendar payload for a schedule, or `None` without a start time.
///
/// Timed events with no end get the default duration.
pub(crate) fn new_event(schedule: &Schedule, title: &str) -> Option<NewCalendarEvent> {
    let start_time = schedule.start_time?;
    let end_time = match schedule.end_time {
        Some(end) => Some(end),
        None if schedule.is_all_day => None,
        None => Some(start_time + Duration::minutes(defaults::EVENT_DEFAULT_DURATION_MINS)),
    };
    Some(NewCalendarEvent {
        title: title.to_string(),
        start_time,
        end_time,
        location: schedule.location.clone(),
        is_all_day: schedule.is_all_day,
    })
}
