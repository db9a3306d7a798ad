//! Error types for the Pocket pipeline.

use thiserror::Error;

/// Result type alias using Pocket's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Pocket operations.
///
/// The remote-service variants mirror the failure classes of the
/// classification backend. Only some of them are worth retrying from the
/// queue; see [`Error::is_retryable`].
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input (blank capture text, malformed request)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Network failure or timeout talking to a remote service
    #[error("Network error: {0}")]
    NetworkTransient(String),

    /// Remote service temporarily unavailable (HTTP 503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Remote service rejected the call for rate limiting (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Credentials missing or rejected (HTTP 401)
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Remote service failed with a server-side error (HTTP 5xx)
    #[error("Server error: {0}")]
    ServerFault(String),

    /// External calendar operation failed
    #[error("Calendar error: {0}")]
    Calendar(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a queue item that failed with this error should be retried.
    ///
    /// Rate limiting, auth and bad-input failures will not get better by
    /// retrying on a short backoff, so they fail the item immediately.
    /// A busy or locked SQLite database, or an exhausted pool, is transient
    /// too; other database errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NetworkTransient(_) | Error::ServiceUnavailable(_) | Error::ServerFault(_) => {
                true
            }
            Error::Database(e) => is_transient_db_error(e),
            _ => false,
        }
    }
}

/// SQLITE_BUSY and SQLITE_LOCKED, including their extended codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_transient_db_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
            .unwrap_or(false),
        _ => false,
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Serialization(e.to_string())
        } else {
            Error::NetworkTransient(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("capture 42".to_string());
        assert_eq!(err.to_string(), "Not found: capture 42");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("capture text is blank".to_string());
        assert_eq!(err.to_string(), "Invalid input: capture text is blank");
    }

    #[test]
    fn test_error_display_rate_limited() {
        let err = Error::RateLimited("slow down".to_string());
        assert_eq!(err.to_string(), "Rate limited: slow down");
    }

    #[test]
    fn test_retryable_classes() {
        assert!(Error::NetworkTransient("t".into()).is_retryable());
        assert!(Error::ServiceUnavailable("t".into()).is_retryable());
        assert!(Error::ServerFault("t".into()).is_retryable());
    }

    #[test]
    fn test_transient_database_errors_are_retryable() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_retryable());
    }

    #[test]
    fn test_non_retryable_classes() {
        assert!(!Error::InvalidInput("t".into()).is_retryable());
        assert!(!Error::RateLimited("t".into()).is_retryable());
        assert!(!Error::AuthRequired("t".into()).is_retryable());
        assert!(!Error::NotFound("t".into()).is_retryable());
        assert!(!Error::Calendar("t".into()).is_retryable());
        assert!(!Error::Internal("t".into()).is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_database_error_not_retryable() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(err.to_string().starts_with("Database error"));
        assert!(!err.is_retryable());
    }
}
