//! Applying a classification result to a capture.
//!
//! Everything local is written in one transaction: the capture's own fields,
//! its entities and tags, any split children, and the derived schedule, todo
//! or note of each. A derived-entity insert runs under a savepoint, so its
//! failure leaves the capture classified and is reported on the outcome
//! rather than retried. Calendar decisions run only after the commit.

use std::collections::HashMap;

use sqlx::{Connection, Sqlite, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use pocket_core::{
    CalendarSyncStatus, Capture, CaptureSource, ClassificationResult, ClassifiedType, Error,
    Note, NoteFolder, Result, Schedule, Todo,
};
use pocket_db::Database;
use pocket_sync::CalendarSyncDecider;

/// Entity created from a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedEntity {
    Schedule {
        id: Uuid,
        /// None when the calendar step itself failed locally.
        calendar_status: Option<CalendarSyncStatus>,
    },
    Todo {
        id: Uuid,
    },
    Note {
        id: Uuid,
        folder: NoteFolder,
    },
}

/// What an apply call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// False when the capture was missing or already classified.
    pub applied: bool,
    /// Derived entities, including those of split children.
    pub derived: Vec<DerivedEntity>,
    /// Child captures created from a split result.
    pub children: Vec<Uuid>,
    /// Failure creating a derived entity after the capture was updated.
    pub derived_error: Option<String>,
}

impl ApplyOutcome {
    fn skipped() -> Self {
        Self::default()
    }

    fn applied() -> Self {
        Self {
            applied: true,
            ..Self::default()
        }
    }

    fn record_derived_error(&mut self, error: String) {
        self.derived_error = Some(match self.derived_error.take() {
            Some(existing) => format!("{existing}; {error}"),
            None => error,
        });
    }
}

/// Writes classification results onto temporary captures.
#[derive(Clone)]
pub struct ClassificationResultApplier {
    db: Database,
    decider: CalendarSyncDecider,
}

impl ClassificationResultApplier {
    pub fn new(db: Database, decider: CalendarSyncDecider) -> Self {
        Self { db, decider }
    }

    /// Apply `result` to a capture.
    ///
    /// A capture that is missing or no longer temporary is left untouched,
    /// so applying the same result twice has the effect of applying it once.
    /// A result (or split item) of type `temp` is rejected before any write.
    ///
    /// For a split result the parent takes the top-level classification and
    /// no derived entity; each split item becomes a classified child capture
    /// with its own derived entity. Parent and children commit together, so
    /// no child is ever left temporary without a queue item behind it.
    pub async fn apply(
        &self,
        capture_id: Uuid,
        result: &ClassificationResult,
    ) -> Result<ApplyOutcome> {
        validate(result)?;

        let mut tx = self.db.pool.begin().await.map_err(Error::Database)?;
        if !self.classify_tx(&mut tx, capture_id, result).await? {
            debug!(capture_id = %capture_id, "Capture not temp, result ignored");
            return Ok(ApplyOutcome::skipped());
        }

        let mut outcome = ApplyOutcome::applied();
        if result.is_split() {
            for item in &result.split_items {
                let mut child = Capture::new_temp(item.split_text.clone(), CaptureSource::Split);
                child.parent_capture_id = Some(capture_id);
                self.db.captures.insert_tx(&mut tx, &child).await?;

                let item_result = item.to_result();
                self.classify_tx(&mut tx, child.id, &item_result).await?;
                self.derive_tx(&mut tx, child.id, &item_result, &mut outcome)
                    .await?;
                outcome.children.push(child.id);
            }
        } else {
            self.derive_tx(&mut tx, capture_id, result, &mut outcome)
                .await?;
        }
        tx.commit().await.map_err(Error::Database)?;

        let schedule_ids: Vec<Uuid> = outcome
            .derived
            .iter()
            .filter_map(|entity| match entity {
                DerivedEntity::Schedule { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        if !schedule_ids.is_empty() {
            let statuses = self.run_decider(schedule_ids).await;
            for entity in outcome.derived.iter_mut() {
                if let DerivedEntity::Schedule {
                    id,
                    calendar_status,
                } = entity
                {
                    *calendar_status = statuses.get(id).copied();
                }
            }
        }

        info!(
            subsystem = "jobs",
            component = "applier",
            op = "apply",
            capture_id = %capture_id,
            classified_type = %result.classified_type,
            confidence = %result.confidence,
            row_count = outcome.children.len(),
            "Classification applied"
        );
        Ok(outcome)
    }

    /// Update the capture, entities and tags. Returns false when the capture
    /// was not temp.
    async fn classify_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
        result: &ClassificationResult,
    ) -> Result<bool> {
        let ai_title = result.ai_title.as_deref().filter(|t| !t.trim().is_empty());
        let updated = self
            .db
            .captures
            .update_classification_tx(
                tx,
                capture_id,
                result.classified_type,
                result.confidence,
                ai_title,
            )
            .await?;
        if !updated {
            return Ok(false);
        }

        self.db
            .captures
            .replace_entities_tx(tx, capture_id, &result.entities)
            .await?;

        for name in result.tags.iter().filter(|t| !t.trim().is_empty()) {
            let tag = self.db.tags.get_or_create_tx(tx, name).await?;
            self.db.tags.link_tx(tx, capture_id, tag.id).await?;
        }
        Ok(true)
    }

    /// Insert the derived entity under a savepoint and record the result.
    async fn derive_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
        result: &ClassificationResult,
        outcome: &mut ApplyOutcome,
    ) -> Result<()> {
        let mut savepoint = (**tx).begin().await.map_err(Error::Database)?;
        match self.insert_derived(&mut savepoint, capture_id, result).await {
            Ok(entity) => {
                savepoint.commit().await.map_err(Error::Database)?;
                outcome.derived.extend(entity);
            }
            Err(e) => {
                savepoint.rollback().await.map_err(Error::Database)?;
                warn!(
                    subsystem = "jobs",
                    component = "applier",
                    op = "create_derived",
                    capture_id = %capture_id,
                    error = %e,
                    "Derived entity not created"
                );
                outcome.record_derived_error(e.to_string());
            }
        }
        Ok(())
    }

    async fn insert_derived(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        capture_id: Uuid,
        result: &ClassificationResult,
    ) -> Result<Option<DerivedEntity>> {
        match result.classified_type {
            ClassifiedType::Schedule => {
                let info = result.schedule_info.clone().unwrap_or_default();
                let schedule = Schedule::new(capture_id, &info, result.confidence);
                self.db.schedules.insert_tx(tx, &schedule).await?;
                Ok(Some(DerivedEntity::Schedule {
                    id: schedule.id,
                    calendar_status: None,
                }))
            }
            ClassifiedType::Todo => {
                let todo = Todo::new(capture_id, result.todo_info.as_ref());
                self.db.todos.insert_tx(tx, &todo).await?;
                Ok(Some(DerivedEntity::Todo { id: todo.id }))
            }
            ClassifiedType::Note | ClassifiedType::Clip => {
                let folder = note_folder(result);
                let note = Note::new(capture_id, folder);
                self.db.notes.insert_tx(tx, &note).await?;
                Ok(Some(DerivedEntity::Note {
                    id: note.id,
                    folder,
                }))
            }
            ClassifiedType::Temp => Ok(None),
        }
    }

    /// Decisions run on their own task: a caller abandoning this future
    /// (a handler timeout) does not cut them short, so every schedule still
    /// settles on a final sync status. Schedules whose decision failed
    /// locally are absent from the map.
    async fn run_decider(&self, schedule_ids: Vec<Uuid>) -> HashMap<Uuid, CalendarSyncStatus> {
        let decider = self.decider.clone();
        let task = tokio::spawn(async move {
            let mut statuses = HashMap::new();
            for schedule_id in schedule_ids {
                match decider.sync_schedule(schedule_id).await {
                    Ok(status) => {
                        statuses.insert(schedule_id, status);
                    }
                    Err(e) => warn!(
                        schedule_id = %schedule_id,
                        error = %e,
                        "Calendar sync decision failed"
                    ),
                }
            }
            statuses
        });
        match task.await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(error = %e, "Calendar sync task did not complete");
                HashMap::new()
            }
        }
    }
}

/// Clips always land in bookmarks; notes use the suggested folder.
fn note_folder(result: &ClassificationResult) -> NoteFolder {
    match result.classified_type {
        ClassifiedType::Clip => NoteFolder::Bookmarks,
        _ => result.note_folder.unwrap_or_default(),
    }
}

fn validate(result: &ClassificationResult) -> Result<()> {
    let temp_item = result
        .split_items
        .iter()
        .any(|item| item.classified_type == ClassifiedType::Temp);
    if result.classified_type == ClassifiedType::Temp || temp_item {
        return Err(Error::InvalidInput(
            "classification result cannot be temp".to_string(),
        ));
    }
    Ok(())
}
