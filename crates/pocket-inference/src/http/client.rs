//! HTTP/JSON client for the remote classification service.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use pocket_core::{defaults, ClassificationResult, ClassificationService, Error, Result};

use super::error::{to_pocket_error, ClassifyErrorCode};
use super::types::{ClassifyErrorResponse, ClassifyRequest};

/// Configuration for the HTTP classifier.
///
/// | Variable | Default |
/// |----------|---------|
/// | `POCKET_CLASSIFIER_URL` | `http://localhost:8080` |
/// | `POCKET_CLASSIFIER_API_KEY` | unset |
/// | `POCKET_CLASSIFIER_TIMEOUT_SECS` | 30 |
/// | `POCKET_DEVICE_ID` | `pocket-local` |
#[derive(Debug, Clone)]
pub struct HttpClassifierConfig {
    /// Base URL; requests go to `{base_url}/classify`.
    pub base_url: String,
    /// Bearer token, when the service requires one.
    pub api_key: Option<String>,
    /// Device identifier sent with every request.
    pub device_id: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for HttpClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::CLASSIFIER_URL.to_string(),
            api_key: None,
            device_id: defaults::DEVICE_ID.to_string(),
            timeout_seconds: defaults::CLASSIFIER_TIMEOUT_SECS,
        }
    }
}

impl HttpClassifierConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("POCKET_CLASSIFIER_URL")
                .unwrap_or_else(|_| defaults::CLASSIFIER_URL.to_string()),
            api_key: std::env::var("POCKET_CLASSIFIER_API_KEY").ok(),
            device_id: std::env::var("POCKET_DEVICE_ID")
                .unwrap_or_else(|_| defaults::DEVICE_ID.to_string()),
            timeout_seconds: std::env::var("POCKET_CLASSIFIER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::CLASSIFIER_TIMEOUT_SECS),
        }
    }
}

/// Classification service reached over HTTP.
pub struct HttpClassifier {
    client: Client,
    config: HttpClassifierConfig,
}

impl HttpClassifier {
    /// Create a new classifier with the given configuration.
    pub fn new(config: HttpClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            subsystem = "inference",
            component = "http_classifier",
            url = %config.base_url,
            timeout_secs = config.timeout_seconds,
            "Initializing classification client"
        );

        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(HttpClassifierConfig::from_env())
    }

    /// Get the current configuration.
    pub fn config(&self) -> &HttpClassifierConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }
}

/// Transport failures before any status arrives are all worth retrying.
fn send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::NetworkTransient(format!("Classification request timed out: {}", e))
    } else {
        Error::NetworkTransient(format!("Classification request failed: {}", e))
    }
}

#[async_trait]
impl ClassificationService for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let start = Instant::now();
        let request = ClassifyRequest {
            text: text.to_string(),
            device_id: self.config.device_id.clone(),
        };

        let response = self
            .build_request("/classify")
            .json(&request)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body: ClassifyErrorResponse = response.json().await.unwrap_or_default();
            let code = ClassifyErrorCode::from_status(status.as_u16());
            warn!(
                subsystem = "inference",
                component = "http_classifier",
                status = status.as_u16(),
                ?code,
                "Classification request rejected"
            );
            return Err(to_pocket_error(
                code,
                &format!("classifier returned {}: {}", status, body.message()),
            ));
        }

        let result: ClassificationResult = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse classification: {}", e)))?;

        debug!(
            subsystem = "inference",
            component = "http_classifier",
            classified_type = %result.classified_type,
            confidence = %result.confidence,
            split_count = result.split_items.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Classification received"
        );
        Ok(result)
    }

    fn name(&self) -> &str {
        "http"
    }
}
