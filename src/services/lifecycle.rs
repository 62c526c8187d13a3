//! Keeps stored attachments in step with entity saves and deletes.
//!
//! The persistence layer drives a [`SaveOperation`] through
//! `Idle -> Validating -> Persisting -> Committed | Failed` and calls the
//! [`EntityHooks`] at each hook point:
//!
//! - `before_save` once validation has passed; an error vetoes the commit
//! - `after_commit` once the write is durable
//! - `after_delete` once a delete has been committed

use crate::{
    models::entity::{AttributeValue, Entity},
    services::{
        attachment_writer::{AttachmentError, AttachmentResult, AttachmentWriter},
        upload_detector::generate_name,
    },
};
use async_trait::async_trait;
use tracing::{debug, error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Validating,
    Persisting,
    Committed,
    Failed,
}

impl SaveState {
    fn can_advance_to(self, next: SaveState) -> bool {
        use SaveState::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Persisting)
                | (Validating, Failed)
                | (Persisting, Committed)
                | (Persisting, Failed)
        )
    }
}

/// State of one entity save, plus the files it has made obsolete.
#[derive(Debug)]
pub struct SaveOperation {
    state: SaveState,
    insert: bool,
    superseded: Vec<String>,
}

impl SaveOperation {
    pub fn begin(entity: &Entity) -> Self {
        Self {
            state: SaveState::Idle,
            insert: entity.is_new_record(),
            superseded: Vec::new(),
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn is_insert(&self) -> bool {
        self.insert
    }

    /// Filenames to discard once the save commits.
    pub fn superseded(&self) -> &[String] {
        &self.superseded
    }

    pub fn advance(&mut self, next: SaveState) -> AttachmentResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(AttachmentError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Mark the save as failed from any non-terminal state.
    pub fn fail(&mut self) {
        if !matches!(self.state, SaveState::Committed) {
            self.state = SaveState::Failed;
        }
    }
}

/// Hook points a persistence layer invokes around writes.
#[async_trait]
pub trait EntityHooks: Send + Sync {
    /// Runs after validation; moves the operation to `Persisting` or
    /// `Failed`. An error means the record must not be written.
    async fn before_save(&self, entity: &mut Entity, op: &mut SaveOperation) -> AttachmentResult<()>;

    /// Runs after the write has been committed.
    async fn after_commit(&self, entity: &Entity, op: &mut SaveOperation) -> AttachmentResult<()>;

    /// Runs after the record has been deleted.
    async fn after_delete(&self, entity: &Entity);
}

/// [`EntityHooks`] that store pending uploads and discard replaced files.
#[derive(Clone)]
pub struct AttachmentLifecycle {
    writer: AttachmentWriter,
}

impl AttachmentLifecycle {
    pub fn new(writer: AttachmentWriter) -> Self {
        Self { writer }
    }

    pub fn writer(&self) -> &AttachmentWriter {
        &self.writer
    }

    async fn persist_uploads(&self, entity: &mut Entity, op: &mut SaveOperation) -> AttachmentResult<()> {
        let entity_type = entity.entity_type.clone();
        let pending: Vec<_> = entity
            .attributes()
            .iter()
            .filter_map(|(name, value)| Some((name.clone(), value.as_upload()?.clone())))
            .collect();

        for (attribute, upload) in pending {
            if !upload.is_usable() {
                let restored = if op.is_insert() {
                    AttributeValue::Null
                } else {
                    entity.old(&attribute).cloned().unwrap_or(AttributeValue::Null)
                };
                info!(
                    attribute = %attribute,
                    has_error = upload.has_error,
                    "upload carries no file, attribute left unchanged"
                );
                entity.set(attribute, restored);
                continue;
            }

            let filename = generate_name(&upload);
            let source = upload
                .read()
                .await
                .map_err(|source| AttachmentError::ReadUpload {
                    path: upload.temp_path.clone(),
                    source,
                })?;
            self.writer.store(&entity_type, source, &filename).await?;

            if !op.is_insert() {
                if let Some(previous) = entity.old_stored_filename(&attribute) {
                    op.superseded.push(previous.to_string());
                }
            }
            upload.discard_temp().await;
            entity.set(attribute, filename);
        }

        Ok(())
    }
}

#[async_trait]
impl EntityHooks for AttachmentLifecycle {
    async fn before_save(&self, entity: &mut Entity, op: &mut SaveOperation) -> AttachmentResult<()> {
        if op.state() != SaveState::Validating {
            return Err(AttachmentError::InvalidTransition {
                from: op.state(),
                to: SaveState::Persisting,
            });
        }

        if let Err(err) = self.persist_uploads(entity, op).await {
            error!(entity_type = %entity.entity_type.name, error = %err, "attachment processing failed");
            op.fail();
            return Err(err);
        }

        op.advance(SaveState::Persisting)
    }

    async fn after_commit(&self, entity: &Entity, op: &mut SaveOperation) -> AttachmentResult<()> {
        op.advance(SaveState::Committed)?;
        for filename in std::mem::take(&mut op.superseded) {
            self.writer.discard(&entity.entity_type, &filename).await;
        }
        Ok(())
    }

    async fn after_delete(&self, entity: &Entity) {
        let entity_type = &entity.entity_type;
        for attribute in &entity_type.image_attributes {
            match entity.stored_filename(attribute) {
                Some(filename) => self.writer.discard(entity_type, filename).await,
                None => debug!(attribute = %attribute, "no stored file to discard"),
            }
        }
    }
}
