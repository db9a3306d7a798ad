//! Mapping of classification service HTTP failures onto Pocket errors.

use pocket_core::Error;

/// Failure classes reported by the classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyErrorCode {
    /// 400: the request itself is bad.
    InvalidRequest,
    /// 401: missing or rejected credentials.
    Unauthorized,
    /// 429: too many requests.
    RateLimited,
    /// 503: temporarily down.
    ServiceUnavailable,
    /// 504: upstream timed out.
    GatewayTimeout,
    /// Any other 5xx.
    ServerError,
    /// Anything else.
    Unknown,
}

impl ClassifyErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Unauthorized,
            429 => Self::RateLimited,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }
}

/// Convert a classification service failure to a Pocket error.
pub fn to_pocket_error(code: ClassifyErrorCode, message: &str) -> Error {
    match code {
        ClassifyErrorCode::InvalidRequest => Error::InvalidInput(message.to_string()),
        ClassifyErrorCode::Unauthorized => Error::AuthRequired(message.to_string()),
        ClassifyErrorCode::RateLimited => Error::RateLimited(message.to_string()),
        ClassifyErrorCode::ServiceUnavailable => Error::ServiceUnavailable(message.to_string()),
        ClassifyErrorCode::GatewayTimeout => Error::NetworkTransient(message.to_string()),
        ClassifyErrorCode::ServerError => Error::ServerFault(message.to_string()),
        ClassifyErrorCode::Unknown => Error::Internal(message.to_string()),
    }
}
