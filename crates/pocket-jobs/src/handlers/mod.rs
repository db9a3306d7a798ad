//! Handlers for each queue action.

pub mod classify;
pub mod pull;
pub mod push;

pub use classify::ClassifyHandler;
pub use pull::SyncPullHandler;
pub use push::SyncPushHandler;
