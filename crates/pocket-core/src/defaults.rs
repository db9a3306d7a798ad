//! Centralized default constants for the Pocket pipeline.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Environment overrides are documented on the config structs that
//! consume them.

// =============================================================================
// QUEUE PROCESSING
// =============================================================================

/// Maximum retry attempts for a queue item before it becomes terminally failed.
pub const QUEUE_MAX_RETRIES: i32 = 3;

/// Base delay before the first retry of a failed queue item.
pub const RETRY_BACKOFF_INITIAL_MS: u64 = 5_000;

/// Multiplier applied per attempt: 5s, 15s, 45s.
pub const RETRY_BACKOFF_MULTIPLIER: u32 = 3;

/// Safety-net poll interval when no enqueue notification arrives.
pub const WORKER_POLL_INTERVAL_MS: u64 = 30_000;

/// Per-item handler timeout. A timed-out item is retried.
pub const HANDLER_TIMEOUT_SECS: u64 = 60;

/// Capacity of the worker event broadcast channel.
pub const WORKER_EVENT_CAPACITY: usize = 100;

// =============================================================================
// CLASSIFICATION SERVICE
// =============================================================================

/// Default base URL of the classification service.
pub const CLASSIFIER_URL: &str = "http://localhost:8080";

/// HTTP timeout for a single classify call.
pub const CLASSIFIER_TIMEOUT_SECS: u64 = 30;

/// Device identifier reported to remote services when none is configured.
pub const DEVICE_ID: &str = "pocket-local";

// =============================================================================
// CALENDAR
// =============================================================================

/// Maximum characters of the original text used as an event title when the
/// classifier produced no title.
pub const EVENT_TITLE_MAX_CHARS: usize = 30;

/// Days before today included in a conflict scan.
pub const CONFLICT_WINDOW_PAST_DAYS: i64 = 7;

/// Days after today included in a conflict scan.
pub const CONFLICT_WINDOW_FUTURE_DAYS: i64 = 30;

/// Default event length when a schedule has a start but no end.
pub const EVENT_DEFAULT_DURATION_MINS: i64 = 60;

/// Upper bound on one calendar create call. Kept below
/// [`HANDLER_TIMEOUT_SECS`] so an automatic sync settles before the
/// classification item's deadline.
pub const CALENDAR_WRITE_TIMEOUT_SECS: u64 = 15;

// =============================================================================
// DATABASE
// =============================================================================

/// Default SQLite database URL.
pub const DATABASE_URL: &str = "sqlite://pocket.db?mode=rwc";

/// Maximum pooled SQLite connections.
pub const DB_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout before a locked write gives up.
pub const DB_BUSY_TIMEOUT_MS: u64 = 5_000;
