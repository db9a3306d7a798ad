//! Column encoding helpers shared by the SQLite repositories.
//!
//! Ids are stored as hyphenated text, timestamps as unix epoch
//! milliseconds, enums by their lowercase wire names.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pocket_core::{Error, Result};

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn opt_to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(to_millis)
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_millis)
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Serialization(format!("bad uuid {s:?}: {e}")))
}

pub(crate) fn opt_parse_uuid(s: Option<String>) -> Result<Option<Uuid>> {
    s.as_deref().map(parse_uuid).transpose()
}

pub(crate) fn parse_enum<T>(s: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    s.parse().map_err(Error::Serialization)
}

pub(crate) fn opt_parse_enum<T>(s: Option<String>) -> Result<Option<T>>
where
    T: FromStr<Err = String>,
{
    s.as_deref().map(parse_enum).transpose()
}
