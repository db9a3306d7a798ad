//! # pocket-sync
//!
//! Calendar side of the Pocket capture pipeline.
//!
//! - [`CalendarSyncDecider`] routes a derived schedule to the calendar, to a
//!   user suggestion, or nowhere, based on preferences and confidence.
//! - [`ConflictResolver`] finds linked schedules whose calendar event was
//!   edited elsewhere and settles them with a [`ConflictStrategy`].
//!
//! # Feature Flags
//!
//! - `mock`: Enable the in-memory calendar, notifier, preference and backup
//!   doubles in [`memory`] for downstream tests

pub mod conflicts;
pub mod decider;

#[cfg(any(test, feature = "mock"))]
pub mod memory;

pub use conflicts::{CalendarConflict, ConflictField, ConflictResolver, ConflictStrategy};
pub use decider::{decide, CalendarSyncDecider, SyncDecision};
