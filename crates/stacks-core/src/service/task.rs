//! Task feature service.
//!
//! AI-driven completion is not a separate path: an AI agent completes a
//! task through the same [`TaskService::complete`] call with an
//! `ActorType::Ai` actor, and the provenance rides on the event.

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use super::validate_title;
use crate::clock;
use crate::error::ErrorCode;
use crate::event::payload::{
    EventPayload, TaskBlockedData, TaskCompletedData, TaskSnapshot, TombstoneData,
};
use crate::event::types::EventType;
use crate::model::{Actor, EntityId, Task, TaskStatus};
use crate::recorder::EventRecorder;
use crate::store::queries;
use std::collections::BTreeMap;

/// Input for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub note: Option<String>,
    pub position: i64,
}

/// Patch for updating a task. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub note: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub position: Option<i64>,
}

pub struct TaskService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> TaskService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn fetch_required(&self, id: &EntityId) -> Result<Task> {
        queries::get_task(self.conn, id, false)?
            .with_context(|| format!("{}: task {id} not found", ErrorCode::EntityNotFound))
    }

    /// Create a task inside an existing stack.
    ///
    /// # Errors
    ///
    /// Fails on invalid input or a missing parent stack; nothing is
    /// recorded in either case.
    pub fn create(&self, stack_id: &EntityId, new: NewTask, actor: &Actor) -> Result<Task> {
        validate_title("task title", &new.title)?;
        if queries::get_stack(self.conn, stack_id, false)?.is_none() {
            bail!("{}: stack {stack_id} not found", ErrorCode::EntityNotFound);
        }

        let id = EntityId::generate();
        let payload = EventPayload::TaskCreated(TaskSnapshot {
            stack_id: stack_id.clone(),
            title: new.title,
            note: new.note,
            status: TaskStatus::Pending,
            completed_at_us: None,
            position: new.position,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::TaskCreated, &id, &payload, actor)?;
        self.fetch_required(&id)
    }

    /// Apply a patch, recording a `task.updated` snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the task does not exist or input is invalid.
    pub fn update(&self, id: &EntityId, changes: TaskChanges, actor: &Actor) -> Result<Task> {
        let current = self.fetch_required(id)?;

        let title = changes.title.unwrap_or(current.title);
        validate_title("task title", &title)?;

        let status = changes.status.unwrap_or(current.status);
        let payload = EventPayload::TaskUpdated(TaskSnapshot {
            stack_id: current.stack_id,
            title,
            note: changes.note.unwrap_or(current.note),
            status,
            completed_at_us: current.completed_at_us,
            position: changes.position.unwrap_or(current.position),
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::TaskUpdated, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Complete a task. Completing an already-completed task is a no-op
    /// and records nothing.
    ///
    /// # Errors
    ///
    /// Fails if the task does not exist or the write fails.
    pub fn complete(&self, id: &EntityId, actor: &Actor) -> Result<Task> {
        let current = self.fetch_required(id)?;
        if current.status == TaskStatus::Completed {
            return Ok(current);
        }

        let payload = EventPayload::TaskCompleted(TaskCompletedData {
            completed_at_us: clock::now_us(),
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::TaskCompleted, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Mark a task blocked.
    ///
    /// # Errors
    ///
    /// Fails if the task does not exist or the write fails.
    pub fn block(&self, id: &EntityId, reason: Option<String>, actor: &Actor) -> Result<Task> {
        self.fetch_required(id)?;
        let payload = EventPayload::TaskBlocked(TaskBlockedData {
            reason,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::TaskBlocked, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Tombstone a task. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the task never existed or the write fails.
    pub fn delete(&self, id: &EntityId, actor: &Actor) -> Result<()> {
        let Some(task) = queries::get_task(self.conn, id, true)? else {
            bail!("{}: task {id} not found", ErrorCode::EntityNotFound);
        };
        if task.sync.is_deleted {
            return Ok(());
        }
        EventRecorder::new(self.conn).record(
            EventType::TaskDeleted,
            id,
            &EventPayload::TaskDeleted(TombstoneData::default()),
            actor,
        )?;
        Ok(())
    }
}
