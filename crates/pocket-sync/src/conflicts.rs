//! Conflict detection and resolution between local schedules and the
//! external calendar.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use pocket_core::{
    defaults, CalendarEvent, CalendarService, Error, NewCalendarEvent, Result, Schedule,
};
use pocket_db::Database;

/// Event fields compared between the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictField {
    Title,
    StartTime,
    EndTime,
    Location,
}

/// A linked schedule whose local and remote values disagree.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarConflict {
    pub schedule_id: Uuid,
    pub remote_event_id: String,
    pub local_title: String,
    pub remote_title: String,
    pub local_start: DateTime<Utc>,
    pub remote_start: DateTime<Utc>,
    pub local_end: Option<DateTime<Utc>>,
    pub remote_end: Option<DateTime<Utc>>,
    pub local_location: Option<String>,
    pub remote_location: Option<String>,
    /// Carried so that a push to the remote side keeps the event's kind.
    pub is_all_day: bool,
}

impl CalendarConflict {
    /// Fields that differ, in a fixed order.
    pub fn differing_fields(&self) -> Vec<ConflictField> {
        let mut fields = Vec::new();
        if self.local_title != self.remote_title {
            fields.push(ConflictField::Title);
        }
        if !same_instant(Some(self.local_start), Some(self.remote_start)) {
            fields.push(ConflictField::StartTime);
        }
        if !same_instant(self.local_end, self.remote_end) {
            fields.push(ConflictField::EndTime);
        }
        if self.local_location != self.remote_location {
            fields.push(ConflictField::Location);
        }
        fields
    }

    fn from_pair(schedule: &Schedule, local_start: DateTime<Utc>, event: &CalendarEvent) -> Self {
        Self {
            schedule_id: schedule.id,
            remote_event_id: event.id.clone(),
            local_title: schedule.title.clone().unwrap_or_default(),
            remote_title: event.title.clone(),
            local_start,
            remote_start: event.start_time,
            local_end: schedule.end_time,
            remote_end: event.end_time,
            local_location: schedule.location.clone(),
            remote_location: event.location.clone(),
            is_all_day: schedule.is_all_day,
        }
    }
}

/// Local rows keep millisecond precision, so compare at that granularity.
fn same_instant(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    a.map(|t| t.timestamp_millis()) == b.map(|t| t.timestamp_millis())
}

/// How to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Copy the remote values onto the local schedule.
    OverrideLocal,
    /// Write the local values to the calendar.
    OverrideRemote,
    /// Currently identical to `OverrideLocal`: the remote side wins.
    Merge,
}

/// Finds and settles differences between linked schedules and their events.
#[derive(Clone)]
pub struct ConflictResolver {
    db: Database,
    calendar: Arc<dyn CalendarService>,
}

impl ConflictResolver {
    pub fn new(db: Database, calendar: Arc<dyn CalendarService>) -> Self {
        Self { db, calendar }
    }

    /// Compare every linked schedule with the calendar events in `[from, to]`.
    ///
    /// The window bounds the remote side only, so an event moved into the
    /// window from a local start outside it still pairs. Schedules whose
    /// event is not returned by the calendar, and events with no local
    /// schedule, are not conflicts.
    pub async fn detect(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarConflict>> {
        let events = self.calendar.list_events(from, to).await?;
        let by_id: HashMap<&str, &CalendarEvent> =
            events.iter().map(|e| (e.id.as_str(), e)).collect();

        let schedules = self.db.schedules.list_linked().await?;
        let mut conflicts = Vec::new();
        for schedule in &schedules {
            let (Some(remote_id), Some(start)) =
                (schedule.remote_event_id.as_deref(), schedule.start_time)
            else {
                continue;
            };
            let Some(event) = by_id.get(remote_id) else {
                continue;
            };
            let conflict = CalendarConflict::from_pair(schedule, start, event);
            if !conflict.differing_fields().is_empty() {
                conflicts.push(conflict);
            }
        }

        debug!(
            subsystem = "sync",
            component = "conflicts",
            op = "detect",
            schedules = schedules.len(),
            events = events.len(),
            conflicts = conflicts.len(),
            "Conflict scan complete"
        );
        Ok(conflicts)
    }

    /// Detect over the default window: seven days back to thirty ahead.
    pub async fn detect_default_window(&self) -> Result<Vec<CalendarConflict>> {
        let now = Utc::now();
        self.detect(
            now - Duration::days(defaults::CONFLICT_WINDOW_PAST_DAYS),
            now + Duration::days(defaults::CONFLICT_WINDOW_FUTURE_DAYS),
        )
        .await
    }

    /// Settle one conflict.
    pub async fn resolve(
        &self,
        conflict: &CalendarConflict,
        strategy: ConflictStrategy,
    ) -> Result<()> {
        match strategy {
            ConflictStrategy::OverrideLocal | ConflictStrategy::Merge => {
                self.db
                    .schedules
                    .update_from_remote(
                        conflict.schedule_id,
                        &conflict.remote_title,
                        conflict.remote_start,
                        conflict.remote_end,
                        conflict.remote_location.as_deref(),
                    )
                    .await?;
            }
            ConflictStrategy::OverrideRemote => self.push_local(conflict).await?,
        }

        info!(
            subsystem = "sync",
            component = "conflicts",
            op = "resolve",
            schedule_id = %conflict.schedule_id,
            strategy = ?strategy,
            "Calendar conflict resolved"
        );
        Ok(())
    }

    /// Resolve every conflict with the same strategy.
    ///
    /// Each conflict stands alone: a failure is collected and the loop goes
    /// on; nothing already resolved is undone.
    pub async fn resolve_all(
        &self,
        conflicts: &[CalendarConflict],
        strategy: ConflictStrategy,
    ) -> Vec<(Uuid, Error)> {
        let mut failures = Vec::new();
        for conflict in conflicts {
            if let Err(e) = self.resolve(conflict, strategy).await {
                warn!(
                    subsystem = "sync",
                    component = "conflicts",
                    op = "resolve_all",
                    schedule_id = %conflict.schedule_id,
                    error = %e,
                    "Conflict resolution failed"
                );
                failures.push((conflict.schedule_id, e));
            }
        }
        failures
    }

    /// The calendar has no update call, so replace the event: create one
    /// with local values, store its id, then delete the old one.
    ///
    /// A failed create leaves the old event and the schedule untouched. A
    /// failed delete leaves a stale duplicate in the calendar, which is
    /// logged and tolerated.
    async fn push_local(&self, conflict: &CalendarConflict) -> Result<()> {
        let event = NewCalendarEvent {
            title: conflict.local_title.clone(),
            start_time: conflict.local_start,
            end_time: conflict.local_end,
            location: conflict.local_location.clone(),
            is_all_day: conflict.is_all_day,
        };
        let remote_id = self.calendar.create_event(&event).await?;
        self.db
            .schedules
            .mark_synced(conflict.schedule_id, &remote_id, &conflict.local_title)
            .await?;

        if let Err(e) = self.calendar.delete_event(&conflict.remote_event_id).await {
            warn!(
                subsystem = "sync",
                component = "conflicts",
                op = "push_local",
                remote_event_id = %conflict.remote_event_id,
                error = %e,
                "Replaced event not deleted"
            );
        }
        Ok(())
    }
}
