//! Stack feature service.

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use super::validate_title;
use crate::clock;
use crate::error::ErrorCode;
use crate::event::payload::{ActivationData, EventPayload, StackSnapshot, TombstoneData};
use crate::event::types::EventType;
use crate::model::{Actor, EntityId, Stack, StackStatus};
use crate::recorder::EventRecorder;
use crate::store::{queries, with_write_tx};
use std::collections::BTreeMap;

/// Input for creating a stack.
#[derive(Debug, Clone, Default)]
pub struct NewStack {
    pub title: String,
    pub note: Option<String>,
    pub arc_id: Option<EntityId>,
    pub position: i64,
}

/// Patch for updating a stack. `None` keeps the current value; the inner
/// `Option` distinguishes "set" from "clear" for nullable fields.
#[derive(Debug, Clone, Default)]
pub struct StackChanges {
    pub title: Option<String>,
    pub note: Option<Option<String>>,
    pub status: Option<StackStatus>,
    pub arc_id: Option<Option<EntityId>>,
    pub position: Option<i64>,
}

pub struct StackService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> StackService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn fetch_required(&self, id: &EntityId) -> Result<Stack> {
        queries::get_stack(self.conn, id, false)?.with_context(|| {
            format!("{}: stack {id} not found", ErrorCode::EntityNotFound)
        })
    }

    /// Create a stack. New stacks start `planned` and inactive.
    ///
    /// # Errors
    ///
    /// Fails on invalid input (nothing recorded) or store errors.
    pub fn create(&self, new: NewStack, actor: &Actor) -> Result<Stack> {
        validate_title("stack title", &new.title)?;

        let id = EntityId::generate();
        let payload = EventPayload::StackCreated(StackSnapshot {
            title: new.title,
            note: new.note,
            status: StackStatus::Planned,
            is_active: false,
            arc_id: new.arc_id,
            position: new.position,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::StackCreated, &id, &payload, actor)?;
        self.fetch_required(&id)
    }

    /// Apply a patch, recording a `stack.updated` snapshot. The snapshot
    /// captures the current `is_active` flag so a replay restores it.
    ///
    /// # Errors
    ///
    /// Fails if the stack does not exist, input is invalid, or the write
    /// fails.
    pub fn update(&self, id: &EntityId, changes: StackChanges, actor: &Actor) -> Result<Stack> {
        let current = self.fetch_required(id)?;

        let title = changes.title.unwrap_or(current.title);
        validate_title("stack title", &title)?;

        let payload = EventPayload::StackUpdated(StackSnapshot {
            title,
            note: changes.note.unwrap_or(current.note),
            status: changes.status.unwrap_or(current.status),
            is_active: current.is_active,
            arc_id: changes.arc_id.unwrap_or(current.arc_id),
            position: changes.position.unwrap_or(current.position),
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::StackUpdated, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Make this the active stack. Any other active stack is explicitly
    /// deactivated in the same transaction, with its own
    /// `stack.deactivated` event, so the audit trail matches the state.
    /// Activating the already-active stack is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the stack does not exist or the transaction fails.
    pub fn activate(&self, id: &EntityId, actor: &Actor) -> Result<Stack> {
        with_write_tx(self.conn, |conn| {
            let stack = queries::get_stack(conn, id, false)?.with_context(|| {
                format!("{}: stack {id} not found", ErrorCode::EntityNotFound)
            })?;
            if stack.is_active {
                return Ok(stack);
            }

            let ts = clock::now_us();
            let recorder = EventRecorder::new(conn);
            for (other_id, _) in queries::active_stacks(conn)? {
                recorder.record_in_tx(
                    EventType::StackDeactivated,
                    &other_id,
                    &EventPayload::StackDeactivated(ActivationData::default()),
                    actor,
                    ts,
                )?;
            }
            recorder.record_in_tx(
                EventType::StackActivated,
                id,
                &EventPayload::StackActivated(ActivationData::default()),
                actor,
                ts,
            )?;

            queries::get_stack(conn, id, false)?
                .context("stack missing immediately after activation")
        })
    }

    /// Clear the active flag. A no-op when the stack is not active.
    ///
    /// # Errors
    ///
    /// Fails if the stack does not exist or the write fails.
    pub fn deactivate(&self, id: &EntityId, actor: &Actor) -> Result<Stack> {
        let stack = self.fetch_required(id)?;
        if !stack.is_active {
            return Ok(stack);
        }
        EventRecorder::new(self.conn).record(
            EventType::StackDeactivated,
            id,
            &EventPayload::StackDeactivated(ActivationData::default()),
            actor,
        )?;
        self.fetch_required(id)
    }

    /// Tombstone a stack. Deleting an already-deleted stack is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the stack never existed or the write fails.
    pub fn delete(&self, id: &EntityId, actor: &Actor) -> Result<()> {
        let Some(stack) = queries::get_stack(self.conn, id, true)? else {
            bail!("{}: stack {id} not found", ErrorCode::EntityNotFound);
        };
        if stack.sync.is_deleted {
            return Ok(());
        }
        EventRecorder::new(self.conn).record(
            EventType::StackDeleted,
            id,
            &EventPayload::StackDeleted(TombstoneData::default()),
            actor,
        )?;
        Ok(())
    }
}
