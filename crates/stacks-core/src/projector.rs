//! Event replay → entity store pipeline.
//!
//! The [`Projector`] turns ordered events into entity rows. It serves both
//! full rehydration (empty or stale store) and single-event apply (the
//! recorder's incremental path and historical reverts share these
//! handlers, which is what makes incremental state and replayed state
//! identical).
//!
//! # Ordering and idempotence
//!
//! Batches are applied in ascending `(ts_us, id)` order. Every applied
//! event id is tracked in `applied_events`; re-applying a known id is a
//! no-op, so replaying the same sequence twice yields identical state.
//!
//! # Failure containment
//!
//! A payload that fails to decode is a data-integrity error for that
//! single event: it is logged, reported, and skipped. The exception is a
//! creation payload for an entity with no existing row — the entity
//! cannot exist without it, so all its later events in the batch are
//! skipped and reported too. One corrupt event never blocks unrelated
//! entities from rehydrating.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use std::collections::HashSet;

use crate::event::payload::{
    ActivationData, ArcSnapshot, AttachmentSnapshot, ReminderSnapshot, ReminderSnoozedData,
    StackSnapshot, TaskBlockedData, TaskCompletedData, TaskSnapshot, TombstoneData,
};
use crate::event::{Event, EventPayload, EventType};
use crate::model::{EntityId, EntityKind, EventId};
use crate::reconcile;
use crate::store::with_write_tx;

// ---------------------------------------------------------------------------
// ReplayReport
// ---------------------------------------------------------------------------

/// One per-event failure recorded during a replay batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFailure {
    pub event_id: EventId,
    pub entity_id: EntityId,
    pub event_type: EventType,
    pub error: String,
    /// True when the failure makes the entity unrecoverable for this
    /// batch (its creation payload was lost).
    pub unrecoverable: bool,
}

/// Statistics and accumulated failures from a replay batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Events newly applied to the store.
    pub applied: usize,
    /// Already-applied events skipped by the dedup check.
    pub duplicates: usize,
    /// Per-event failures; replay continued past each of them.
    pub failures: Vec<ReplayFailure>,
}

impl ReplayReport {
    /// True when every event either applied or deduplicated.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

enum ApplyOutcome {
    Applied,
    Duplicate,
}

// ---------------------------------------------------------------------------
// Projector
// ---------------------------------------------------------------------------

/// Replays events into the entity store.
pub struct Projector<'conn> {
    conn: &'conn Connection,
}

impl<'conn> Projector<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Apply a batch of events inside one transaction, returning the
    /// replay report. The single-active reconcile pass runs once per
    /// batch, after the last event.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures (transaction,
    /// store writes). Per-event payload failures are accumulated in the
    /// report instead.
    pub fn apply_events(&self, events: &[Event]) -> Result<ReplayReport> {
        let mut ordered: Vec<&Event> = events.iter().collect();
        ordered.sort_by(|a, b| a.ts_us.cmp(&b.ts_us).then_with(|| a.id.cmp(&b.id)));

        let mut report = ReplayReport::default();
        let mut dead_entities: HashSet<String> = HashSet::new();
        let mut touched_activation = false;

        with_write_tx(self.conn, |conn| {
            for event in ordered {
                if dead_entities.contains(event.entity_id.as_str()) {
                    report.failures.push(ReplayFailure {
                        event_id: event.id.clone(),
                        entity_id: event.entity_id.clone(),
                        event_type: event.event_type,
                        error: "entity creation payload was unrecoverable earlier in this batch"
                            .to_string(),
                        unrecoverable: false,
                    });
                    continue;
                }

                match Self::apply_event_inner(conn, event) {
                    Ok(ApplyOutcome::Applied) => {
                        report.applied += 1;
                        if event.event_type.affects_activation() {
                            touched_activation = true;
                        }
                    }
                    Ok(ApplyOutcome::Duplicate) => report.duplicates += 1,
                    Err(error) => {
                        tracing::warn!(
                            event_id = %event.id,
                            event_type = %event.event_type,
                            entity_id = %event.entity_id,
                            error = %error,
                            "skipping event due to replay error"
                        );
                        let unrecoverable = event.event_type.is_creation()
                            && !entity_row_exists(
                                conn,
                                event.event_type.entity_kind(),
                                &event.entity_id,
                            )?;
                        if unrecoverable {
                            dead_entities.insert(event.entity_id.as_str().to_string());
                        }
                        report.failures.push(ReplayFailure {
                            event_id: event.id.clone(),
                            entity_id: event.entity_id.clone(),
                            event_type: event.event_type,
                            error: format!("{error:#}"),
                            unrecoverable,
                        });
                    }
                }
            }

            if touched_activation {
                reconcile::reconcile_single_active(conn)
                    .context("reconcile single-active after batch")?;
            }
            Ok(())
        })?;

        Ok(report)
    }

    /// Apply a single event outside of any managed transaction. Returns
    /// `true` if the event was applied, `false` if it was a duplicate.
    ///
    /// This is the per-event primitive shared with the recorder; callers
    /// own transaction boundaries. The single-active pass runs when the
    /// event can affect activation.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload fails to decode or the store write
    /// fails.
    pub fn apply_event(&self, event: &Event) -> Result<bool> {
        let outcome = Self::apply_event_inner(self.conn, event)?;
        if event.event_type.affects_activation() {
            reconcile::reconcile_single_active(self.conn)
                .context("reconcile single-active after apply")?;
        }
        Ok(matches!(outcome, ApplyOutcome::Applied))
    }

    // -----------------------------------------------------------------------
    // Internal dispatch
    // -----------------------------------------------------------------------

    fn apply_event_inner(conn: &Connection, event: &Event) -> Result<ApplyOutcome> {
        if is_event_applied(conn, &event.id)? {
            return Ok(ApplyOutcome::Duplicate);
        }

        let payload = event
            .decode_payload()
            .with_context(|| format!("decode payload of event {}", event.id))?;

        match &payload {
            EventPayload::StackCreated(data) => apply_stack_snapshot(conn, event, data, true)?,
            EventPayload::StackUpdated(data) => apply_stack_snapshot(conn, event, data, false)?,
            EventPayload::StackActivated(data) => apply_stack_activation(conn, event, data, true)?,
            EventPayload::StackDeactivated(data) => {
                apply_stack_activation(conn, event, data, false)?;
            }
            EventPayload::StackDeleted(data) => {
                apply_tombstone(conn, event, EntityKind::Stack, data)?;
            }
            EventPayload::TaskCreated(data) => apply_task_snapshot(conn, event, data, true)?,
            EventPayload::TaskUpdated(data) => apply_task_snapshot(conn, event, data, false)?,
            EventPayload::TaskCompleted(data) => apply_task_completed(conn, event, data)?,
            EventPayload::TaskBlocked(data) => apply_task_blocked(conn, event, data)?,
            EventPayload::TaskDeleted(data) => {
                apply_tombstone(conn, event, EntityKind::Task, data)?;
            }
            EventPayload::ReminderCreated(data) => {
                apply_reminder_snapshot(conn, event, data, true)?;
            }
            EventPayload::ReminderUpdated(data) => {
                apply_reminder_snapshot(conn, event, data, false)?;
            }
            EventPayload::ReminderSnoozed(data) => apply_reminder_snoozed(conn, event, data)?,
            EventPayload::ReminderDeleted(data) => {
                apply_tombstone(conn, event, EntityKind::Reminder, data)?;
            }
            EventPayload::ArcCreated(data) => apply_arc_snapshot(conn, event, data, true)?,
            EventPayload::ArcUpdated(data) => apply_arc_snapshot(conn, event, data, false)?,
            EventPayload::ArcDeleted(data) => {
                apply_tombstone(conn, event, EntityKind::Arc, data)?;
            }
            EventPayload::AttachmentAdded(data) => apply_attachment_added(conn, event, data)?,
            EventPayload::AttachmentRemoved(data) => {
                apply_tombstone(conn, event, EntityKind::Attachment, data)?;
            }
        }

        record_applied(conn, event)?;
        Ok(ApplyOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Dedup tracking
// ---------------------------------------------------------------------------

fn is_event_applied(conn: &Connection, event_id: &EventId) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM applied_events WHERE event_id = ?1)",
        params![event_id.as_str()],
        |row| row.get(0),
    )
    .context("check applied event")
}

fn record_applied(conn: &Connection, event: &Event) -> Result<()> {
    // applied_at_us uses the event timestamp, not the wall clock, so
    // replaying the same sequence produces byte-identical tracking rows.
    conn.execute(
        "INSERT OR IGNORE INTO applied_events (event_id, entity_id, event_type, applied_at_us)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.id.as_str(),
            event.entity_id.as_str(),
            event.event_type.as_str(),
            event.ts_us,
        ],
    )
    .context("record applied event")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Placeholder rows
// ---------------------------------------------------------------------------

/// True when a row (live or tombstoned) exists for the entity.
fn entity_row_exists(conn: &Connection, kind: EntityKind, id: &EntityId) -> Result<bool> {
    let sql = match kind {
        EntityKind::Stack => "SELECT EXISTS(SELECT 1 FROM stacks WHERE id = ?1)",
        EntityKind::Task => "SELECT EXISTS(SELECT 1 FROM tasks WHERE id = ?1)",
        EntityKind::Reminder => "SELECT EXISTS(SELECT 1 FROM reminders WHERE id = ?1)",
        EntityKind::Arc => "SELECT EXISTS(SELECT 1 FROM arcs WHERE id = ?1)",
        EntityKind::Attachment => "SELECT EXISTS(SELECT 1 FROM attachments WHERE id = ?1)",
    };
    conn.query_row(sql, params![id.as_str()], |row| row.get(0))
        .with_context(|| format!("check {kind} row exists"))
}

/// Ensure a row exists so out-of-order events (an update arriving before
/// its create) still apply. Placeholders use empty scalar fields and are
/// overwritten when the creation snapshot lands.
fn ensure_entity_row(conn: &Connection, kind: EntityKind, id: &EntityId, ts_us: i64) -> Result<()> {
    if entity_row_exists(conn, kind, id)? {
        return Ok(());
    }
    let sql = match kind {
        EntityKind::Stack => {
            "INSERT INTO stacks (id, title, created_at_us, updated_at_us) VALUES (?1, '', ?2, ?2)"
        }
        EntityKind::Task => {
            "INSERT INTO tasks (id, stack_id, title, created_at_us, updated_at_us) \
             VALUES (?1, '', '', ?2, ?2)"
        }
        EntityKind::Reminder => {
            "INSERT INTO reminders (id, task_id, remind_at_us, created_at_us, updated_at_us) \
             VALUES (?1, '', 0, ?2, ?2)"
        }
        EntityKind::Arc => {
            "INSERT INTO arcs (id, title, created_at_us, updated_at_us) VALUES (?1, '', ?2, ?2)"
        }
        EntityKind::Attachment => {
            "INSERT INTO attachments (id, parent_id, file_name, created_at_us, updated_at_us) \
             VALUES (?1, '', '', ?2, ?2)"
        }
    };
    conn.execute(sql, params![id.as_str(), ts_us])
        .with_context(|| format!("create placeholder {kind} for {id}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Stack handlers
// ---------------------------------------------------------------------------

fn apply_stack_snapshot(
    conn: &Connection,
    event: &Event,
    data: &StackSnapshot,
    is_creation: bool,
) -> Result<()> {
    let activated_at = data.is_active.then_some(event.ts_us);
    if is_creation {
        conn.execute(
            "INSERT INTO stacks (
                id, title, note, status, is_active, activated_at_us, arc_id, position,
                created_at_us, updated_at_us, sync_state, revision, device_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 'pending', 1, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                note = excluded.note,
                status = excluded.status,
                is_active = excluded.is_active,
                activated_at_us = excluded.activated_at_us,
                arc_id = excluded.arc_id,
                position = excluded.position,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us,
                sync_state = 'pending',
                revision = stacks.revision + 1",
            params![
                event.entity_id.as_str(),
                data.title,
                data.note,
                data.status.to_string(),
                data.is_active,
                activated_at,
                data.arc_id.as_ref().map(EntityId::as_str),
                data.position,
                event.ts_us,
                event.actor.device_id,
            ],
        )
        .with_context(|| format!("apply stack.created for {}", event.entity_id))?;
    } else {
        ensure_entity_row(conn, EntityKind::Stack, &event.entity_id, event.ts_us)?;
        // An update that re-asserts `is_active` counts as an activation
        // (refreshing the bookkeeping timestamp); one that clears it
        // preserves the last-activated timestamp for the invariant pass.
        conn.execute(
            "UPDATE stacks SET
                title = ?2,
                note = ?3,
                status = ?4,
                is_active = ?5,
                activated_at_us = CASE WHEN ?5 THEN ?8 ELSE activated_at_us END,
                arc_id = ?6,
                position = ?7,
                updated_at_us = ?8,
                sync_state = 'pending',
                revision = revision + 1
             WHERE id = ?1",
            params![
                event.entity_id.as_str(),
                data.title,
                data.note,
                data.status.to_string(),
                data.is_active,
                data.arc_id.as_ref().map(EntityId::as_str),
                data.position,
                event.ts_us,
            ],
        )
        .with_context(|| format!("apply stack.updated for {}", event.entity_id))?;
    }
    Ok(())
}

/// `stack.activated` / `stack.deactivated` govern only `is_active` (plus
/// its bookkeeping timestamp). The workflow `status` field is a separate
/// state machine and is never touched here. Deactivation keeps
/// `activated_at_us`: the invariant pass needs to know when the stack was
/// last active.
fn apply_stack_activation(
    conn: &Connection,
    event: &Event,
    _data: &ActivationData,
    active: bool,
) -> Result<()> {
    ensure_entity_row(conn, EntityKind::Stack, &event.entity_id, event.ts_us)?;
    if active {
        conn.execute(
            "UPDATE stacks SET is_active = 1, activated_at_us = ?2, updated_at_us = ?2, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1",
            params![event.entity_id.as_str(), event.ts_us],
        )
    } else {
        conn.execute(
            "UPDATE stacks SET is_active = 0, updated_at_us = ?2, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1",
            params![event.entity_id.as_str(), event.ts_us],
        )
    }
    .with_context(|| format!("apply stack activation for {}", event.entity_id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Task handlers
// ---------------------------------------------------------------------------

fn apply_task_snapshot(
    conn: &Connection,
    event: &Event,
    data: &TaskSnapshot,
    is_creation: bool,
) -> Result<()> {
    if is_creation {
        conn.execute(
            "INSERT INTO tasks (
                id, stack_id, title, note, status, completed_at_us, position,
                created_at_us, updated_at_us, sync_state, revision, device_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, 'pending', 1, ?9)
            ON CONFLICT(id) DO UPDATE SET
                stack_id = excluded.stack_id,
                title = excluded.title,
                note = excluded.note,
                status = excluded.status,
                completed_at_us = excluded.completed_at_us,
                position = excluded.position,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us,
                sync_state = 'pending',
                revision = tasks.revision + 1",
            params![
                event.entity_id.as_str(),
                data.stack_id.as_str(),
                data.title,
                data.note,
                data.status.to_string(),
                data.completed_at_us,
                data.position,
                event.ts_us,
                event.actor.device_id,
            ],
        )
        .with_context(|| format!("apply task.created for {}", event.entity_id))?;
    } else {
        ensure_entity_row(conn, EntityKind::Task, &event.entity_id, event.ts_us)?;
        conn.execute(
            "UPDATE tasks SET
                stack_id = ?2,
                title = ?3,
                note = ?4,
                status = ?5,
                completed_at_us = ?6,
                position = ?7,
                updated_at_us = ?8,
                sync_state = 'pending',
                revision = revision + 1
             WHERE id = ?1",
            params![
                event.entity_id.as_str(),
                data.stack_id.as_str(),
                data.title,
                data.note,
                data.status.to_string(),
                data.completed_at_us,
                data.position,
                event.ts_us,
            ],
        )
        .with_context(|| format!("apply task.updated for {}", event.entity_id))?;
    }
    Ok(())
}

fn apply_task_completed(conn: &Connection, event: &Event, data: &TaskCompletedData) -> Result<()> {
    ensure_entity_row(conn, EntityKind::Task, &event.entity_id, event.ts_us)?;
    conn.execute(
        "UPDATE tasks SET status = 'completed', completed_at_us = ?2, updated_at_us = ?3, \
         sync_state = 'pending', revision = revision + 1 WHERE id = ?1",
        params![event.entity_id.as_str(), data.completed_at_us, event.ts_us],
    )
    .with_context(|| format!("apply task.completed for {}", event.entity_id))?;
    Ok(())
}

fn apply_task_blocked(conn: &Connection, event: &Event, _data: &TaskBlockedData) -> Result<()> {
    ensure_entity_row(conn, EntityKind::Task, &event.entity_id, event.ts_us)?;
    conn.execute(
        "UPDATE tasks SET status = 'blocked', updated_at_us = ?2, \
         sync_state = 'pending', revision = revision + 1 WHERE id = ?1",
        params![event.entity_id.as_str(), event.ts_us],
    )
    .with_context(|| format!("apply task.blocked for {}", event.entity_id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reminder handlers
// ---------------------------------------------------------------------------

fn apply_reminder_snapshot(
    conn: &Connection,
    event: &Event,
    data: &ReminderSnapshot,
    is_creation: bool,
) -> Result<()> {
    if is_creation {
        conn.execute(
            "INSERT INTO reminders (
                id, task_id, remind_at_us, snoozed_until_us, status,
                created_at_us, updated_at_us, sync_state, revision, device_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 'pending', 1, ?7)
            ON CONFLICT(id) DO UPDATE SET
                task_id = excluded.task_id,
                remind_at_us = excluded.remind_at_us,
                snoozed_until_us = excluded.snoozed_until_us,
                status = excluded.status,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us,
                sync_state = 'pending',
                revision = reminders.revision + 1",
            params![
                event.entity_id.as_str(),
                data.task_id.as_str(),
                data.remind_at_us,
                data.snoozed_until_us,
                data.status.to_string(),
                event.ts_us,
                event.actor.device_id,
            ],
        )
        .with_context(|| format!("apply reminder.created for {}", event.entity_id))?;
    } else {
        ensure_entity_row(conn, EntityKind::Reminder, &event.entity_id, event.ts_us)?;
        conn.execute(
            "UPDATE reminders SET
                task_id = ?2,
                remind_at_us = ?3,
                snoozed_until_us = ?4,
                status = ?5,
                updated_at_us = ?6,
                sync_state = 'pending',
                revision = revision + 1
             WHERE id = ?1",
            params![
                event.entity_id.as_str(),
                data.task_id.as_str(),
                data.remind_at_us,
                data.snoozed_until_us,
                data.status.to_string(),
                event.ts_us,
            ],
        )
        .with_context(|| format!("apply reminder.updated for {}", event.entity_id))?;
    }
    Ok(())
}

fn apply_reminder_snoozed(
    conn: &Connection,
    event: &Event,
    data: &ReminderSnoozedData,
) -> Result<()> {
    ensure_entity_row(conn, EntityKind::Reminder, &event.entity_id, event.ts_us)?;
    conn.execute(
        "UPDATE reminders SET status = 'snoozed', snoozed_until_us = ?2, updated_at_us = ?3, \
         sync_state = 'pending', revision = revision + 1 WHERE id = ?1",
        params![event.entity_id.as_str(), data.snoozed_until_us, event.ts_us],
    )
    .with_context(|| format!("apply reminder.snoozed for {}", event.entity_id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Arc handlers
// ---------------------------------------------------------------------------

fn apply_arc_snapshot(
    conn: &Connection,
    event: &Event,
    data: &ArcSnapshot,
    is_creation: bool,
) -> Result<()> {
    if is_creation {
        conn.execute(
            "INSERT INTO arcs (
                id, title, note, status, created_at_us, updated_at_us,
                sync_state, revision, device_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5, 'pending', 1, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                note = excluded.note,
                status = excluded.status,
                created_at_us = excluded.created_at_us,
                updated_at_us = excluded.updated_at_us,
                sync_state = 'pending',
                revision = arcs.revision + 1",
            params![
                event.entity_id.as_str(),
                data.title,
                data.note,
                data.status.to_string(),
                event.ts_us,
                event.actor.device_id,
            ],
        )
        .with_context(|| format!("apply arc.created for {}", event.entity_id))?;
    } else {
        ensure_entity_row(conn, EntityKind::Arc, &event.entity_id, event.ts_us)?;
        conn.execute(
            "UPDATE arcs SET title = ?2, note = ?3, status = ?4, updated_at_us = ?5, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1",
            params![
                event.entity_id.as_str(),
                data.title,
                data.note,
                data.status.to_string(),
                event.ts_us,
            ],
        )
        .with_context(|| format!("apply arc.updated for {}", event.entity_id))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Attachment handlers
// ---------------------------------------------------------------------------

fn apply_attachment_added(
    conn: &Connection,
    event: &Event,
    data: &AttachmentSnapshot,
) -> Result<()> {
    conn.execute(
        "INSERT INTO attachments (
            id, parent_id, file_name, content_type, byte_size,
            created_at_us, updated_at_us, sync_state, revision, device_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, 'pending', 1, ?7)
        ON CONFLICT(id) DO UPDATE SET
            parent_id = excluded.parent_id,
            file_name = excluded.file_name,
            content_type = excluded.content_type,
            byte_size = excluded.byte_size,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us,
            sync_state = 'pending',
            revision = attachments.revision + 1",
        params![
            event.entity_id.as_str(),
            data.parent_id.as_str(),
            data.file_name,
            data.content_type,
            data.byte_size,
            event.ts_us,
            event.actor.device_id,
        ],
    )
    .with_context(|| format!("apply attachment.added for {}", event.entity_id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tombstones
// ---------------------------------------------------------------------------

/// Soft-delete the entity row. Tombstones are ordinary field updates: the
/// row stays present forever for replay and sync safety.
fn apply_tombstone(
    conn: &Connection,
    event: &Event,
    kind: EntityKind,
    _data: &TombstoneData,
) -> Result<()> {
    ensure_entity_row(conn, kind, &event.entity_id, event.ts_us)?;
    let sql = match kind {
        EntityKind::Stack => {
            "UPDATE stacks SET is_deleted = 1, is_active = 0, \
             updated_at_us = ?2, sync_state = 'pending', revision = revision + 1 WHERE id = ?1"
        }
        EntityKind::Task => {
            "UPDATE tasks SET is_deleted = 1, updated_at_us = ?2, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1"
        }
        EntityKind::Reminder => {
            "UPDATE reminders SET is_deleted = 1, updated_at_us = ?2, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1"
        }
        EntityKind::Arc => {
            "UPDATE arcs SET is_deleted = 1, updated_at_us = ?2, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1"
        }
        EntityKind::Attachment => {
            "UPDATE attachments SET is_deleted = 1, updated_at_us = ?2, \
             sync_state = 'pending', revision = revision + 1 WHERE id = ?1"
        }
    };
    conn.execute(sql, params![event.entity_id.as_str(), event.ts_us])
        .with_context(|| format!("apply tombstone for {kind} {}", event.entity_id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::payload::{
        ActivationData, EventPayload, StackSnapshot, TaskSnapshot, TombstoneData,
    };
    use crate::model::{Actor, StackStatus, SyncState, TaskStatus};
    use crate::store::{open_in_memory, queries};
    use std::collections::BTreeMap;

    fn actor() -> Actor {
        Actor::human("user-1", "device-a", "app.stacks.ios")
    }

    fn stack_created(id: &EntityId, title: &str, active: bool, ts: i64) -> Event {
        Event::from_payload(
            id.clone(),
            &EventPayload::StackCreated(StackSnapshot {
                title: title.into(),
                note: None,
                status: StackStatus::Planned,
                is_active: active,
                arc_id: None,
                position: 0,
                extra: BTreeMap::new(),
            }),
            ts,
            actor(),
        )
        .expect("event")
    }

    fn stack_activated(id: &EntityId, ts: i64) -> Event {
        Event::from_payload(
            id.clone(),
            &EventPayload::StackActivated(ActivationData::default()),
            ts,
            actor(),
        )
        .expect("event")
    }

    #[test]
    fn created_then_reapplied_never_duplicates() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let id = EntityId::generate();
        let event = stack_created(&id, "Deep work", false, 1000);

        assert!(projector.apply_event(&event).expect("apply"));
        assert!(!projector.apply_event(&event).expect("re-apply"));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM stacks", [], |row| row.get(0))
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn activation_touches_only_is_active() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let id = EntityId::generate();
        projector
            .apply_event(&stack_created(&id, "Deep work", false, 1000))
            .expect("create");
        projector
            .apply_event(&stack_activated(&id, 2000))
            .expect("activate");

        let stack = queries::get_stack(&conn, &id, false)
            .expect("get")
            .expect("present");
        assert!(stack.is_active);
        assert_eq!(stack.activated_at_us, Some(2000));
        // Workflow status is an orthogonal state machine.
        assert_eq!(stack.status, StackStatus::Planned);
    }

    #[test]
    fn batch_reconciles_single_active_last_writer_wins() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let a = EntityId::generate();
        let b = EntityId::generate();

        let report = projector
            .apply_events(&[
                stack_created(&a, "A", true, 1000),
                stack_created(&b, "B", true, 2000),
            ])
            .expect("batch");
        assert!(report.is_clean());
        assert_eq!(report.applied, 2);

        let active = queries::active_stacks(&conn).expect("active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, b, "later activation wins");
    }

    #[test]
    fn decode_failure_is_contained_per_event() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let good = EntityId::generate();
        let bad = EntityId::generate();

        let mut corrupt = stack_activated(&bad, 1500);
        corrupt.event_type = EventType::StackCreated;
        corrupt.payload = serde_json::json!(42);

        let report = projector
            .apply_events(&[
                stack_created(&good, "Survivor", false, 1000),
                corrupt,
                stack_activated(&good, 2000),
            ])
            .expect("batch");

        assert_eq!(report.applied, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].unrecoverable);
        assert!(queries::get_stack(&conn, &good, false).expect("get").is_some());
        assert!(queries::get_stack(&conn, &bad, true).expect("get").is_none());
    }

    #[test]
    fn events_after_lost_creation_are_skipped() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let id = EntityId::generate();

        let mut corrupt = stack_created(&id, "ignored", false, 1000);
        corrupt.payload = serde_json::json!("garbage");

        let report = projector
            .apply_events(&[corrupt, stack_activated(&id, 2000)])
            .expect("batch");

        assert_eq!(report.applied, 0);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].unrecoverable);
        assert!(!report.failures[1].unrecoverable);
        // No placeholder row leaked for the dead entity.
        assert!(queries::get_stack(&conn, &id, true).expect("get").is_none());
    }

    #[test]
    fn update_before_create_uses_placeholder_then_overwrites() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let stack = EntityId::generate();
        let task = EntityId::generate();

        let completed = Event::from_payload(
            task.clone(),
            &EventPayload::TaskCompleted(crate::event::TaskCompletedData {
                completed_at_us: 1500,
                extra: BTreeMap::new(),
            }),
            1500,
            actor(),
        )
        .expect("event");
        // Completion arrives before the create (cross-device delivery).
        assert!(projector.apply_event(&completed).expect("apply"));

        let created = Event::from_payload(
            task.clone(),
            &EventPayload::TaskCreated(TaskSnapshot {
                stack_id: stack.clone(),
                title: "Buy milk".into(),
                note: None,
                status: TaskStatus::Pending,
                completed_at_us: None,
                position: 0,
                extra: BTreeMap::new(),
            }),
            1000,
            actor(),
        )
        .expect("event");
        assert!(projector.apply_event(&created).expect("apply"));

        let row = queries::get_task(&conn, &task, false)
            .expect("get")
            .expect("present");
        assert_eq!(row.title, "Buy milk");
        assert_eq!(row.stack_id, stack);
        assert_eq!(row.sync.sync_state, SyncState::Pending);
    }

    #[test]
    fn tombstone_keeps_row_queryable_when_asked() {
        let conn = open_in_memory().expect("open");
        let projector = Projector::new(&conn);
        let id = EntityId::generate();
        projector
            .apply_event(&stack_created(&id, "Done with this", false, 1000))
            .expect("create");

        let deleted = Event::from_payload(
            id.clone(),
            &EventPayload::StackDeleted(TombstoneData::default()),
            2000,
            actor(),
        )
        .expect("event");
        projector.apply_event(&deleted).expect("delete");

        assert!(queries::get_stack(&conn, &id, false).expect("get").is_none());
        let row = queries::get_stack(&conn, &id, true)
            .expect("get")
            .expect("tombstone");
        assert!(row.sync.is_deleted);
        assert_eq!(row.sync.revision, 2);
    }
}
