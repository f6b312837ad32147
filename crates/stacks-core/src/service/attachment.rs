//! Attachment feature service.
//!
//! Upload transport is out of scope: this service records metadata only;
//! the bytes live wherever the transport layer put them.

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use super::ValidationError;
use crate::error::ErrorCode;
use crate::event::payload::{AttachmentSnapshot, EventPayload, TombstoneData};
use crate::event::types::EventType;
use crate::model::{Actor, Attachment, EntityId};
use crate::recorder::EventRecorder;
use crate::store::queries;
use std::collections::BTreeMap;

/// Input for attaching a file.
#[derive(Debug, Clone, Default)]
pub struct NewAttachment {
    pub file_name: String,
    pub content_type: String,
    pub byte_size: i64,
}

pub struct AttachmentService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> AttachmentService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn fetch_required(&self, id: &EntityId) -> Result<Attachment> {
        queries::get_attachment(self.conn, id, false)?
            .with_context(|| format!("{}: attachment {id} not found", ErrorCode::EntityNotFound))
    }

    /// Attach a file to a stack or a task.
    ///
    /// # Errors
    ///
    /// Fails if the parent is neither a live stack nor a live task, or if
    /// the file name is empty; nothing is recorded.
    pub fn add(
        &self,
        parent_id: &EntityId,
        new: NewAttachment,
        actor: &Actor,
    ) -> Result<Attachment> {
        if new.file_name.trim().is_empty() {
            return Err(ValidationError::Empty { field: "file_name" }.into());
        }
        let parent_is_stack = queries::get_stack(self.conn, parent_id, false)?.is_some();
        let parent_is_task = queries::get_task(self.conn, parent_id, false)?.is_some();
        if !parent_is_stack && !parent_is_task {
            bail!(
                "{}: attachment parent {parent_id} is neither a stack nor a task",
                ErrorCode::EntityNotFound
            );
        }

        let id = EntityId::generate();
        let payload = EventPayload::AttachmentAdded(AttachmentSnapshot {
            parent_id: parent_id.clone(),
            file_name: new.file_name,
            content_type: new.content_type,
            byte_size: new.byte_size,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::AttachmentAdded, &id, &payload, actor)?;
        self.fetch_required(&id)
    }

    /// Tombstone an attachment. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the attachment never existed or the write fails.
    pub fn remove(&self, id: &EntityId, actor: &Actor) -> Result<()> {
        let Some(attachment) = queries::get_attachment(self.conn, id, true)? else {
            bail!("{}: attachment {id} not found", ErrorCode::EntityNotFound);
        };
        if attachment.sync.is_deleted {
            return Ok(());
        }
        EventRecorder::new(self.conn).record(
            EventType::AttachmentRemoved,
            id,
            &EventPayload::AttachmentRemoved(TombstoneData::default()),
            actor,
        )?;
        Ok(())
    }
}
