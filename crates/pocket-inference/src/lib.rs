//! # pocket-inference
//!
//! Classification service clients for the Pocket capture pipeline.
//!
//! This crate provides:
//! - [`HttpClassifier`], a reqwest client for the remote classification service
//! - A deterministic mock classifier (feature `mock`)
//!
//! # Feature Flags
//!
//! - `mock`: Enable [`mock::MockClassifier`] for downstream tests
//!
//! # Example
//!
//! ```rust,no_run
//! use pocket_inference::HttpClassifier;
//! use pocket_core::ClassificationService;
//!
//! #[tokio::main]
//! async fn main() {
//!     let classifier = HttpClassifier::from_env().unwrap();
//!     let result = classifier.classify("Team sync tomorrow 3pm").await.unwrap();
//!     println!("{}", result.classified_type);
//! }
//! ```

pub mod http;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use http::{HttpClassifier, HttpClassifierConfig};
