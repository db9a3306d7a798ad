//! Wire types for the classification service.

use serde::{Deserialize, Serialize};

/// Body of `POST /classify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
    pub device_id: String,
}

/// Error body returned alongside non-2xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ClassifyErrorResponse {
    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .or(self.error.as_deref())
            .unwrap_or("Unknown error")
    }
}
