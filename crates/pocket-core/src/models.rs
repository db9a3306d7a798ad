//! Domain models for captures, derived entities, and the work queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;

/// Generate a new time-ordered identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum using
/// the given lowercase wire names.
macro_rules! string_enum {
    ($name:ident, $label:literal, { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            /// Stable lowercase name used in storage and on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($s => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("Invalid ", $label, ": {}"), s)),
                }
            }
        }
    };
}

// =============================================================================
// CAPTURE
// =============================================================================

/// Where a capture came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureSource {
    #[default]
    App,
    ShareIntent,
    Voice,
    Image,
    Url,
    /// Child produced by splitting a multi-intent capture.
    Split,
}

string_enum!(CaptureSource, "capture source", {
    App => "app",
    ShareIntent => "share_intent",
    Voice => "voice",
    Image => "image",
    Url => "url",
    Split => "split",
});

/// Classification outcome of a capture. `Temp` means not yet classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifiedType {
    #[default]
    Temp,
    Schedule,
    Todo,
    Note,
    Clip,
}

string_enum!(ClassifiedType, "classified type", {
    Temp => "temp",
    Schedule => "schedule",
    Todo => "todo",
    Note => "note",
    Clip => "clip",
});

/// Classifier confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

string_enum!(Confidence, "confidence", {
    High => "high",
    Medium => "medium",
    Low => "low",
});

/// A user-recorded snippet.
///
/// `classified_type == Temp`, `confidence.is_none()` and
/// `classification_completed_at.is_none()` always hold together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    pub id: Uuid,
    pub original_text: String,
    pub ai_title: Option<String>,
    pub source: CaptureSource,
    pub classified_type: ClassifiedType,
    pub confidence: Option<Confidence>,
    pub is_confirmed: bool,
    /// Set on children created from a split classification.
    pub parent_capture_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub classification_completed_at: Option<DateTime<Utc>>,
}

impl Capture {
    /// A fresh, unclassified capture.
    pub fn new_temp(original_text: impl Into<String>, source: CaptureSource) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            original_text: original_text.into(),
            ai_title: None,
            source,
            classified_type: ClassifiedType::Temp,
            confidence: None,
            is_confirmed: false,
            parent_capture_id: None,
            created_at: now,
            updated_at: now,
            classification_completed_at: None,
        }
    }

    pub fn is_temp(&self) -> bool {
        self.classified_type == ClassifiedType::Temp
    }

    /// Title to show on a calendar event: the AI title, else the first
    /// characters of the original text.
    pub fn display_title(&self) -> String {
        match self.ai_title.as_deref() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => self
                .original_text
                .chars()
                .take(defaults::EVENT_TITLE_MAX_CHARS)
                .collect(),
        }
    }
}

/// Entity pulled out of the capture text by the classifier (date, place, person).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    #[serde(default)]
    pub normalized_value: Option<String>,
}

// =============================================================================
// DERIVED ENTITIES
// =============================================================================

/// State of a schedule's link to the external calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarSyncStatus {
    #[default]
    NotLinked,
    SuggestionPending,
    Synced,
    SyncFailed,
    Rejected,
}

string_enum!(CalendarSyncStatus, "calendar sync status", {
    NotLinked => "not_linked",
    SuggestionPending => "suggestion_pending",
    Synced => "synced",
    SyncFailed => "sync_failed",
    Rejected => "rejected",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub capture_id: Uuid,
    /// Event title once linked or edited; falls back to the capture title.
    pub title: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub is_all_day: bool,
    pub confidence: Option<Confidence>,
    pub calendar_sync_status: CalendarSyncStatus,
    pub remote_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    pub fn new(capture_id: Uuid, info: &ScheduleInfo, confidence: Confidence) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            capture_id,
            title: None,
            start_time: info.start_time,
            end_time: info.end_time,
            location: info.location.clone(),
            is_all_day: info.is_all_day,
            confidence: Some(confidence),
            calendar_sync_status: CalendarSyncStatus::NotLinked,
            remote_event_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub capture_id: Uuid,
    pub deadline: Option<DateTime<Utc>>,
    /// How the deadline was derived ("explicit", "inferred").
    pub deadline_source: Option<String>,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    pub fn new(capture_id: Uuid, info: Option<&TodoInfo>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            capture_id,
            deadline: info.and_then(|i| i.deadline),
            deadline_source: info.and_then(|i| i.deadline_source.clone()),
            is_completed: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// System folders a note can land in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteFolder {
    #[default]
    Inbox,
    Ideas,
    Bookmarks,
}

string_enum!(NoteFolder, "note folder", {
    Inbox => "inbox",
    Ideas => "ideas",
    Bookmarks => "bookmarks",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub capture_id: Uuid,
    pub folder: NoteFolder,
    pub body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(capture_id: Uuid, folder: NoteFolder) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            capture_id,
            folder,
            body: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
}

// =============================================================================
// CLASSIFICATION RESULT
// =============================================================================

/// Time and place details for a schedule classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleInfo {
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_all_day: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoInfo {
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deadline_source: Option<String>,
}

/// One intent of a multi-intent capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitItem {
    /// Portion of the original text covered by this intent.
    pub split_text: String,
    pub classified_type: ClassifiedType,
    pub confidence: Confidence,
    #[serde(default)]
    pub ai_title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub schedule_info: Option<ScheduleInfo>,
    #[serde(default)]
    pub todo_info: Option<TodoInfo>,
    #[serde(default)]
    pub note_folder: Option<NoteFolder>,
}

impl SplitItem {
    /// The single-intent result applied to the child capture.
    pub fn to_result(&self) -> ClassificationResult {
        ClassificationResult {
            classified_type: self.classified_type,
            confidence: self.confidence,
            ai_title: self.ai_title.clone(),
            tags: self.tags.clone(),
            entities: Vec::new(),
            schedule_info: self.schedule_info.clone(),
            todo_info: self.todo_info.clone(),
            note_folder: self.note_folder,
            split_items: Vec::new(),
        }
    }
}

/// Response of the classification service for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub classified_type: ClassifiedType,
    pub confidence: Confidence,
    #[serde(default)]
    pub ai_title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub entities: Vec<ExtractedEntity>,
    #[serde(default)]
    pub schedule_info: Option<ScheduleInfo>,
    #[serde(default)]
    pub todo_info: Option<TodoInfo>,
    #[serde(default)]
    pub note_folder: Option<NoteFolder>,
    /// Non-empty when the capture holds several intents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_items: Vec<SplitItem>,
}

impl ClassificationResult {
    /// A single-intent result with no extra details.
    pub fn new(classified_type: ClassifiedType, confidence: Confidence) -> Self {
        Self {
            classified_type,
            confidence,
            ai_title: None,
            tags: Vec::new(),
            entities: Vec::new(),
            schedule_info: None,
            todo_info: None,
            note_folder: None,
            split_items: Vec::new(),
        }
    }

    pub fn is_split(&self) -> bool {
        !self.split_items.is_empty()
    }
}

/// Whether a capture's classification is done, in flight, or given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationStatus {
    Pending,
    Completed,
    Failed,
}

// =============================================================================
// QUEUE
// =============================================================================

/// Kind of deferred work held by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Classify,
    SyncPush,
    SyncPull,
}

string_enum!(QueueAction, "queue action", {
    Classify => "classify",
    SyncPush => "sync_push",
    SyncPull => "sync_pull",
});

/// Queue item state. Completed items are deleted rather than kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Pending,
    Processing,
    Failed,
}

string_enum!(QueueStatus, "queue status", {
    Pending => "pending",
    Processing => "processing",
    Failed => "failed",
});

/// A durable unit of deferred work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub action: QueueAction,
    /// Subject reference, e.g. a capture id.
    pub payload: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub status: QueueStatus,
    pub last_error: Option<String>,
    /// Not claimable before this instant.
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl QueueItem {
    /// Parse the payload as a capture id.
    pub fn capture_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.payload).ok()
    }
}

/// Queue counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.failed
    }
}

// =============================================================================
// CALENDAR
// =============================================================================

/// User setting for how derived schedules reach the calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarMode {
    /// Write confident schedules without asking.
    Auto,
    /// Ask the user before every write.
    #[default]
    Suggest,
}

string_enum!(CalendarMode, "calendar mode", {
    Auto => "auto",
    Suggest => "suggest",
});

/// An event as stored in the external calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub is_all_day: bool,
}

/// Event contents sent to the external calendar on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalendarEvent {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub is_all_day: bool,
}

// =============================================================================
// REMOTE BACKUP
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntityType {
    Capture,
    Schedule,
    Todo,
    Note,
}

string_enum!(SyncEntityType, "sync entity type", {
    Capture => "capture",
    Schedule => "schedule",
    Todo => "todo",
    Note => "note",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

string_enum!(SyncOperation, "sync operation", {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

/// One entity change exchanged with the backup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncChange {
    pub entity_type: SyncEntityType,
    pub operation: SyncOperation,
    pub entity_id: Uuid,
    #[serde(default)]
    pub data: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// A page of remote changes plus the cursor to resume from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPullPage {
    pub changes: Vec<SyncChange>,
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_temp_capture_is_unclassified() {
        let c = Capture::new_temp("buy milk", CaptureSource::App);
        assert!(c.is_temp());
        assert!(c.confidence.is_none());
        assert!(c.classification_completed_at.is_none());
        assert_eq!(c.id.get_version_num(), 7);
    }

    #[test]
    fn test_display_title_prefers_ai_title() {
        let mut c = Capture::new_temp("Team sync tomorrow 3pm", CaptureSource::App);
        c.ai_title = Some("Team sync".into());
        assert_eq!(c.display_title(), "Team sync");
    }

    #[test]
    fn test_display_title_truncates_original_text() {
        let c = Capture::new_temp(
            "a very long capture text that keeps going well past thirty chars",
            CaptureSource::Voice,
        );
        assert_eq!(c.display_title().chars().count(), 30);
        assert!(c.original_text.starts_with(&c.display_title()));
    }

    #[test]
    fn test_display_title_blank_ai_title_falls_back() {
        let mut c = Capture::new_temp("dentist", CaptureSource::App);
        c.ai_title = Some("  ".into());
        assert_eq!(c.display_title(), "dentist");
    }

    #[test]
    fn test_string_enum_roundtrip_via_from_str() {
        assert_eq!("share_intent".parse::<CaptureSource>().unwrap(), CaptureSource::ShareIntent);
        assert_eq!("SYNC_FAILED".parse::<CalendarSyncStatus>().unwrap(), CalendarSyncStatus::SyncFailed);
        assert_eq!(QueueAction::SyncPush.to_string(), "sync_push");
        assert!("bogus".parse::<QueueStatus>().is_err());
    }

    #[test]
    fn test_classification_result_deserializes_minimal_json() {
        let json = r#"{"classified_type":"todo","confidence":"medium"}"#;
        let r: ClassificationResult = serde_json::from_str(json).unwrap();
        assert_eq!(r.classified_type, ClassifiedType::Todo);
        assert_eq!(r.confidence, Confidence::Medium);
        assert!(r.tags.is_empty());
        assert!(!r.is_split());
    }

    #[test]
    fn test_split_item_to_result_drops_entities() {
        let item = SplitItem {
            split_text: "call mom".into(),
            classified_type: ClassifiedType::Todo,
            confidence: Confidence::High,
            ai_title: Some("Call mom".into()),
            tags: vec!["family".into()],
            schedule_info: None,
            todo_info: None,
            note_folder: None,
        };
        let r = item.to_result();
        assert_eq!(r.classified_type, ClassifiedType::Todo);
        assert!(r.entities.is_empty());
        assert!(r.split_items.is_empty());
        assert_eq!(r.tags, vec!["family".to_string()]);
    }

    #[test]
    fn test_queue_item_capture_id_parses_payload() {
        let id = new_v7();
        let item = QueueItem {
            id: new_v7(),
            action: QueueAction::Classify,
            payload: id.to_string(),
            retry_count: 0,
            max_retries: defaults::QUEUE_MAX_RETRIES,
            status: QueueStatus::Pending,
            last_error: None,
            next_retry_at: None,
            created_at: Utc::now(),
            started_at: None,
        };
        assert_eq!(item.capture_id(), Some(id));
    }
}
