//! Shared helpers for repository unit tests.

use pocket_core::{Capture, CaptureSource};

use crate::Database;

pub(crate) async fn memory_db() -> Database {
    Database::connect_in_memory()
        .await
        .expect("in-memory database")
}

pub(crate) async fn seed_capture(db: &Database, text: &str) -> Capture {
    let capture = Capture::new_temp(text, CaptureSource::App);
    db.captures.insert(&capture).await.expect("insert capture");
    capture
}
