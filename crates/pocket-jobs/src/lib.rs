//! # pocket-jobs
//!
//! Capture intake and background processing for Pocket.
//!
//! This crate provides:
//! - [`CaptureSubmissionService`], which stores a capture and queues it
//! - [`QueueWorker`], which drains the durable queue with retry and backoff
//! - [`ClassificationResultApplier`], which turns a classifier answer into
//!   stored entities and runs the calendar decision
//! - Handlers for classification and backup push/pull
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pocket_db::Database;
//! use pocket_jobs::{
//!     CaptureSubmissionService, ClassificationResultApplier, ClassifyHandler, WorkerBuilder,
//!     WorkerConfig,
//! };
//!
//! let db = Database::connect("sqlite://pocket.db?mode=rwc").await?;
//! let applier = ClassificationResultApplier::new(db.clone(), decider);
//!
//! let worker = WorkerBuilder::new(db.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(ClassifyHandler::new(db.clone(), classifier, applier))
//!     .build()
//!     .await;
//! let handle = worker.start();
//!
//! let capture = CaptureSubmissionService::new(db)
//!     .submit("Team sync tomorrow 3pm", CaptureSource::App)
//!     .await?;
//!
//! handle.shutdown().await?;
//! ```

pub mod apply;
pub mod handler;
pub mod handlers;
pub mod submit;
pub mod worker;

pub use apply::{ApplyOutcome, ClassificationResultApplier, DerivedEntity};
pub use handler::{HandlerResult, NoOpHandler, QueueContext, QueueHandler};
pub use handlers::pull::PullSummary;
pub use handlers::{ClassifyHandler, SyncPullHandler, SyncPushHandler};
pub use submit::CaptureSubmissionService;
pub use worker::{QueueWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
