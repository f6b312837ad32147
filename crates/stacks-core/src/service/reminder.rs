//! Reminder feature service.

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use super::ValidationError;
use crate::error::ErrorCode;
use crate::event::payload::{
    EventPayload, ReminderSnapshot, ReminderSnoozedData, TombstoneData,
};
use crate::event::types::EventType;
use crate::model::{Actor, EntityId, Reminder, ReminderStatus};
use crate::recorder::EventRecorder;
use crate::store::queries;
use std::collections::BTreeMap;

/// Input for creating a reminder.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub task_id: EntityId,
    pub remind_at_us: i64,
}

pub struct ReminderService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ReminderService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn fetch_required(&self, id: &EntityId) -> Result<Reminder> {
        queries::get_reminder(self.conn, id, false)?
            .with_context(|| format!("{}: reminder {id} not found", ErrorCode::EntityNotFound))
    }

    /// Create a reminder on an existing task.
    ///
    /// # Errors
    ///
    /// Fails if the task does not exist; nothing is recorded.
    pub fn create(&self, new: NewReminder, actor: &Actor) -> Result<Reminder> {
        if queries::get_task(self.conn, &new.task_id, false)?.is_none() {
            bail!(
                "{}: task {} not found",
                ErrorCode::EntityNotFound,
                new.task_id
            );
        }

        let id = EntityId::generate();
        let payload = EventPayload::ReminderCreated(ReminderSnapshot {
            task_id: new.task_id,
            remind_at_us: new.remind_at_us,
            snoozed_until_us: None,
            status: ReminderStatus::Scheduled,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::ReminderCreated, &id, &payload, actor)?;
        self.fetch_required(&id)
    }

    /// Snooze: push the fire time forward. The new time must be later
    /// than the original `remind_at_us`.
    ///
    /// # Errors
    ///
    /// Fails on invalid input or a missing reminder; nothing is recorded.
    pub fn snooze(
        &self,
        id: &EntityId,
        snoozed_until_us: i64,
        actor: &Actor,
    ) -> Result<Reminder> {
        let current = self.fetch_required(id)?;
        if snoozed_until_us <= current.remind_at_us {
            return Err(ValidationError::NotAfter {
                field: "snoozed_until_us",
                reference: "remind_at_us",
            }
            .into());
        }

        let payload = EventPayload::ReminderSnoozed(ReminderSnoozedData {
            snoozed_until_us,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::ReminderSnoozed, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Overwrite a reminder's scalar fields (reschedule, deliver,
    /// cancel).
    ///
    /// # Errors
    ///
    /// Fails if the reminder does not exist or the write fails.
    pub fn update_status(
        &self,
        id: &EntityId,
        status: ReminderStatus,
        actor: &Actor,
    ) -> Result<Reminder> {
        let current = self.fetch_required(id)?;
        let payload = EventPayload::ReminderUpdated(ReminderSnapshot {
            task_id: current.task_id,
            remind_at_us: current.remind_at_us,
            snoozed_until_us: current.snoozed_until_us,
            status,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::ReminderUpdated, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Tombstone a reminder. Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the reminder never existed or the write fails.
    pub fn delete(&self, id: &EntityId, actor: &Actor) -> Result<()> {
        let Some(reminder) = queries::get_reminder(self.conn, id, true)? else {
            bail!("{}: reminder {id} not found", ErrorCode::EntityNotFound);
        };
        if reminder.sync.is_deleted {
            return Ok(());
        }
        EventRecorder::new(self.conn).record(
            EventType::ReminderDeleted,
            id,
            &EventPayload::ReminderDeleted(TombstoneData::default()),
            actor,
        )?;
        Ok(())
    }
}
