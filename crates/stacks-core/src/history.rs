//! Read-only timeline composition over the event log.
//!
//! Composition rules:
//! - a stack's history includes its own events, the events of its tasks,
//!   and the events of attachments hanging off the stack or any of its
//!   tasks
//! - a task's history includes its own and its attachments' events —
//!   never its parent stack's
//!
//! Relations are resolved including tombstoned rows: a deleted task's
//! events still belong in its stack's timeline. Results are newest-first
//! by `(ts_us, id)`. This service performs no mutation.

use anyhow::{Context, Result};
use rusqlite::Connection;

use crate::event::Event;
use crate::model::{EntityId, EventId};
use crate::store::queries;

/// Read-only history queries. Depends on the entity store (for relation
/// lookups) and the event log only.
pub struct HistoryService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> HistoryService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Events directly about one entity, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn fetch_history(&self, entity_id: &EntityId) -> Result<Vec<Event>> {
        queries::events_for_entity(self.conn, entity_id)
    }

    /// A stack's timeline: its own events, its tasks' events, and the
    /// events of attachments whose parent is the stack or one of its
    /// tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn fetch_stack_history_with_related(&self, stack_id: &EntityId) -> Result<Vec<Event>> {
        let mut ids = vec![stack_id.clone()];

        let tasks = queries::list_tasks_for_stack(self.conn, stack_id, true)
            .context("resolve stack tasks for history")?;
        ids.extend(tasks.iter().map(|t| t.id.clone()));

        // Attachments under the stack itself and under each of its tasks.
        let mut attachment_parents = vec![stack_id.clone()];
        attachment_parents.extend(tasks.iter().map(|t| t.id.clone()));
        for parent in &attachment_parents {
            let attachments = queries::list_attachments_for_parent(self.conn, parent, true)
                .context("resolve attachments for history")?;
            ids.extend(attachments.into_iter().map(|a| a.id));
        }

        queries::events_for_entities(self.conn, &ids)
    }

    /// A task's timeline: its own events plus its attachments' events.
    /// The parent stack's events are deliberately excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn fetch_task_history_with_related(&self, task_id: &EntityId) -> Result<Vec<Event>> {
        let mut ids = vec![task_id.clone()];
        let attachments = queries::list_attachments_for_parent(self.conn, task_id, true)
            .context("resolve task attachments for history")?;
        ids.extend(attachments.into_iter().map(|a| a.id));

        queries::events_for_entities(self.conn, &ids)
    }

    /// Fetch specific events by id, newest first. Unknown ids are
    /// silently skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub fn fetch_events_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>> {
        queries::events_by_ids(self.conn, ids)
    }
}
