//! Classification over HTTP.
//!
//! The service exposes a single `POST /classify` endpoint taking
//! `{"text", "device_id"}` and answering with a classification result.
//! Non-2xx statuses are mapped onto the Pocket error taxonomy so the queue
//! can tell retryable failures from terminal ones.

mod client;
mod error;
mod types;

pub use client::{HttpClassifier, HttpClassifierConfig};
pub use error::{to_pocket_error, ClassifyErrorCode};
pub use types::{ClassifyErrorResponse, ClassifyRequest};
