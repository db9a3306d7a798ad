//! # pocket-core
//!
//! Core types, traits, and abstractions for the Pocket capture pipeline.
//!
//! This crate provides the domain models, the error taxonomy, and the trait
//! seams that the storage, inference, sync, and job crates build on.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
