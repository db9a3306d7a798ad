//! Mock classifier for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pocket_inference::mock::{MockClassifier, MockFailure};
//!
//! let classifier = MockClassifier::new()
//!     .with_response_for("Team sync tomorrow 3pm", schedule_result)
//!     .failing_times(2, MockFailure::ServiceUnavailable);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use pocket_core::{
    ClassificationResult, ClassificationService, ClassifiedType, Confidence, Error, Result,
};

/// Error a mock call can be scripted to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Network,
    ServiceUnavailable,
    ServerError,
    RateLimited,
    Unauthorized,
    InvalidRequest,
}

impl MockFailure {
    fn to_error(self) -> Error {
        let msg = "mock failure".to_string();
        match self {
            Self::Network => Error::NetworkTransient(msg),
            Self::ServiceUnavailable => Error::ServiceUnavailable(msg),
            Self::ServerError => Error::ServerFault(msg),
            Self::RateLimited => Error::RateLimited(msg),
            Self::Unauthorized => Error::AuthRequired(msg),
            Self::InvalidRequest => Error::InvalidInput(msg),
        }
    }
}

#[derive(Debug, Clone)]
struct MockConfig {
    responses: HashMap<String, ClassificationResult>,
    default_response: ClassificationResult,
    failures: usize,
    failure: MockFailure,
    always_fail: bool,
    panic_on: Option<String>,
    latency: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            responses: HashMap::new(),
            default_response: ClassificationResult::new(ClassifiedType::Note, Confidence::Medium),
            failures: 0,
            failure: MockFailure::ServiceUnavailable,
            always_fail: false,
            panic_on: None,
            latency: Duration::ZERO,
        }
    }
}

/// Mock classification service with scripted answers and a call log.
#[derive(Clone, Default)]
pub struct MockClassifier {
    config: Arc<MockConfig>,
    calls: Arc<Mutex<Vec<String>>>,
    attempts: Arc<AtomicUsize>,
}

impl MockClassifier {
    /// Create a mock that answers every text with a medium-confidence note.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every unmapped text with this result.
    pub fn with_default_response(mut self, result: ClassificationResult) -> Self {
        Arc::make_mut(&mut self.config).default_response = result;
        self
    }

    /// Answer a specific text with a specific result.
    pub fn with_response_for(mut self, text: impl Into<String>, result: ClassificationResult) -> Self {
        Arc::make_mut(&mut self.config)
            .responses
            .insert(text.into(), result);
        self
    }

    /// Fail the first `n` calls with `failure`, then answer normally.
    pub fn failing_times(mut self, n: usize, failure: MockFailure) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.failures = n;
        config.failure = failure;
        self
    }

    /// Fail every call with `failure`.
    pub fn always_failing(mut self, failure: MockFailure) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.always_fail = true;
        config.failure = failure;
        self
    }

    /// Panic when asked to classify this text.
    pub fn panicking_on(mut self, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).panic_on = Some(text.into());
        self
    }

    /// Delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        Arc::make_mut(&mut self.config).latency = latency;
        self
    }

    /// Texts passed to `classify`, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassificationService for MockClassifier {
    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(text.to_string());
        }

        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }

        if self.config.panic_on.as_deref() == Some(text) {
            panic!("mock classifier asked to panic on {text:?}");
        }

        if self.config.always_fail || attempt < self.config.failures {
            return Err(self.config.failure.to_error());
        }

        Ok(self
            .config
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.config.default_response.clone()))
    }

    fn name(&self) -> &str {
        "mock"
    }
}
