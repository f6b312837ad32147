//! Typed query helpers for the entity store and event log.
//!
//! All functions take a shared `&Connection` and return typed structs,
//! never raw rows. Existence queries exclude tombstoned rows by default;
//! pass `include_deleted = true` where sync reconciliation or conflict
//! surfaces need to act on dead-but-present entities.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter, types::Type};
use std::str::FromStr;

use crate::event::Event;
use crate::model::{
    Actor, Arc, Attachment, EntityId, EventId, Reminder, Stack, SyncMeta, Task,
};

// ---------------------------------------------------------------------------
// Row mapping helpers
// ---------------------------------------------------------------------------

fn parse_text<T>(idx: usize, raw: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map the seven trailing sync-metadata columns starting at `base`.
fn sync_meta_from_row(row: &Row<'_>, base: usize) -> rusqlite::Result<SyncMeta> {
    let sync_state: String = row.get(base + 1)?;
    Ok(SyncMeta {
        server_id: row.get(base)?,
        sync_state: parse_text(base + 1, &sync_state)?,
        revision: row.get(base + 2)?,
        last_synced_at_us: row.get(base + 3)?,
        is_deleted: row.get(base + 4)?,
        user_id: row.get(base + 5)?,
        device_id: row.get(base + 6)?,
    })
}

const SYNC_META_COLUMNS: &str =
    "server_id, sync_state, revision, last_synced_at_us, is_deleted, user_id, device_id";

// ---------------------------------------------------------------------------
// Stacks
// ---------------------------------------------------------------------------

fn stack_select() -> String {
    format!(
        "SELECT id, title, note, status, is_active, activated_at_us, arc_id, position, \
         created_at_us, updated_at_us, {SYNC_META_COLUMNS} FROM stacks"
    )
}

fn stack_from_row(row: &Row<'_>) -> rusqlite::Result<Stack> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    let arc_id: Option<String> = row.get(6)?;
    Ok(Stack {
        id: EntityId::new_unchecked(id),
        title: row.get(1)?,
        note: row.get(2)?,
        status: parse_text(3, &status)?,
        is_active: row.get(4)?,
        activated_at_us: row.get(5)?,
        arc_id: arc_id.map(EntityId::new_unchecked),
        position: row.get(7)?,
        created_at_us: row.get(8)?,
        updated_at_us: row.get(9)?,
        sync: sync_meta_from_row(row, 10)?,
    })
}

/// Fetch a stack by id. Tombstoned rows are excluded unless
/// `include_deleted` is set.
///
/// # Errors
///
/// Returns an error if the read fails or a persisted value is invalid.
pub fn get_stack(
    conn: &Connection,
    id: &EntityId,
    include_deleted: bool,
) -> Result<Option<Stack>> {
    let sql = format!(
        "{} WHERE id = ?1{}",
        stack_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    conn.query_row(&sql, params![id.as_str()], stack_from_row)
        .optional()
        .with_context(|| format!("get stack {id}"))
}

/// List live stacks ordered by position.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn list_stacks(conn: &Connection) -> Result<Vec<Stack>> {
    let sql = format!(
        "{} WHERE is_deleted = 0 ORDER BY position ASC, id ASC",
        stack_select()
    );
    let mut stmt = conn.prepare(&sql).context("prepare stack listing")?;
    let rows = stmt
        .query_map([], stack_from_row)
        .context("query stack listing")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map stack rows")
}

/// Ids and activation timestamps of every live stack currently flagged
/// active. Input to the single-active reconcile pass.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn active_stacks(conn: &Connection) -> Result<Vec<(EntityId, Option<i64>)>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, activated_at_us FROM stacks \
             WHERE is_active = 1 AND is_deleted = 0",
        )
        .context("prepare active stack query")?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            Ok((EntityId::new_unchecked(id), row.get(1)?))
        })
        .context("query active stacks")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map active stacks")
}

/// Insert or fully overwrite a stack row.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn put_stack(conn: &Connection, stack: &Stack) -> Result<()> {
    conn.execute(
        "INSERT INTO stacks (
            id, title, note, status, is_active, activated_at_us, arc_id, position,
            created_at_us, updated_at_us,
            server_id, sync_state, revision, last_synced_at_us, is_deleted, user_id, device_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
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
            server_id = excluded.server_id,
            sync_state = excluded.sync_state,
            revision = excluded.revision,
            last_synced_at_us = excluded.last_synced_at_us,
            is_deleted = excluded.is_deleted,
            user_id = excluded.user_id,
            device_id = excluded.device_id",
        params![
            stack.id.as_str(),
            stack.title,
            stack.note,
            stack.status.to_string(),
            stack.is_active,
            stack.activated_at_us,
            stack.arc_id.as_ref().map(EntityId::as_str),
            stack.position,
            stack.created_at_us,
            stack.updated_at_us,
            stack.sync.server_id,
            stack.sync.sync_state.to_string(),
            stack.sync.revision,
            stack.sync.last_synced_at_us,
            stack.sync.is_deleted,
            stack.sync.user_id,
            stack.sync.device_id,
        ],
    )
    .with_context(|| format!("put stack {}", stack.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

fn task_select() -> String {
    format!(
        "SELECT id, stack_id, title, note, status, completed_at_us, position, \
         created_at_us, updated_at_us, {SYNC_META_COLUMNS} FROM tasks"
    )
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let stack_id: String = row.get(1)?;
    let status: String = row.get(4)?;
    Ok(Task {
        id: EntityId::new_unchecked(id),
        stack_id: EntityId::new_unchecked(stack_id),
        title: row.get(2)?,
        note: row.get(3)?,
        status: parse_text(4, &status)?,
        completed_at_us: row.get(5)?,
        position: row.get(6)?,
        created_at_us: row.get(7)?,
        updated_at_us: row.get(8)?,
        sync: sync_meta_from_row(row, 9)?,
    })
}

/// Fetch a task by id, excluding tombstones unless asked.
///
/// # Errors
///
/// Returns an error if the read fails or a persisted value is invalid.
pub fn get_task(
    conn: &Connection,
    id: &EntityId,
    include_deleted: bool,
) -> Result<Option<Task>> {
    let sql = format!(
        "{} WHERE id = ?1{}",
        task_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    conn.query_row(&sql, params![id.as_str()], task_from_row)
        .optional()
        .with_context(|| format!("get task {id}"))
}

/// List a stack's tasks ordered by position.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn list_tasks_for_stack(
    conn: &Connection,
    stack_id: &EntityId,
    include_deleted: bool,
) -> Result<Vec<Task>> {
    let sql = format!(
        "{} WHERE stack_id = ?1{} ORDER BY position ASC, id ASC",
        task_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    let mut stmt = conn.prepare(&sql).context("prepare task listing")?;
    let rows = stmt
        .query_map(params![stack_id.as_str()], task_from_row)
        .context("query task listing")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map task rows")
}

/// Insert or fully overwrite a task row.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn put_task(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (
            id, stack_id, title, note, status, completed_at_us, position,
            created_at_us, updated_at_us,
            server_id, sync_state, revision, last_synced_at_us, is_deleted, user_id, device_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
        ON CONFLICT(id) DO UPDATE SET
            stack_id = excluded.stack_id,
            title = excluded.title,
            note = excluded.note,
            status = excluded.status,
            completed_at_us = excluded.completed_at_us,
            position = excluded.position,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us,
            server_id = excluded.server_id,
            sync_state = excluded.sync_state,
            revision = excluded.revision,
            last_synced_at_us = excluded.last_synced_at_us,
            is_deleted = excluded.is_deleted,
            user_id = excluded.user_id,
            device_id = excluded.device_id",
        params![
            task.id.as_str(),
            task.stack_id.as_str(),
            task.title,
            task.note,
            task.status.to_string(),
            task.completed_at_us,
            task.position,
            task.created_at_us,
            task.updated_at_us,
            task.sync.server_id,
            task.sync.sync_state.to_string(),
            task.sync.revision,
            task.sync.last_synced_at_us,
            task.sync.is_deleted,
            task.sync.user_id,
            task.sync.device_id,
        ],
    )
    .with_context(|| format!("put task {}", task.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reminders
// ---------------------------------------------------------------------------

fn reminder_select() -> String {
    format!(
        "SELECT id, task_id, remind_at_us, snoozed_until_us, status, \
         created_at_us, updated_at_us, {SYNC_META_COLUMNS} FROM reminders"
    )
}

fn reminder_from_row(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    let id: String = row.get(0)?;
    let task_id: String = row.get(1)?;
    let status: String = row.get(4)?;
    Ok(Reminder {
        id: EntityId::new_unchecked(id),
        task_id: EntityId::new_unchecked(task_id),
        remind_at_us: row.get(2)?,
        snoozed_until_us: row.get(3)?,
        status: parse_text(4, &status)?,
        created_at_us: row.get(5)?,
        updated_at_us: row.get(6)?,
        sync: sync_meta_from_row(row, 7)?,
    })
}

/// Fetch a reminder by id, excluding tombstones unless asked.
///
/// # Errors
///
/// Returns an error if the read fails or a persisted value is invalid.
pub fn get_reminder(
    conn: &Connection,
    id: &EntityId,
    include_deleted: bool,
) -> Result<Option<Reminder>> {
    let sql = format!(
        "{} WHERE id = ?1{}",
        reminder_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    conn.query_row(&sql, params![id.as_str()], reminder_from_row)
        .optional()
        .with_context(|| format!("get reminder {id}"))
}

/// Insert or fully overwrite a reminder row.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn put_reminder(conn: &Connection, reminder: &Reminder) -> Result<()> {
    conn.execute(
        "INSERT INTO reminders (
            id, task_id, remind_at_us, snoozed_until_us, status,
            created_at_us, updated_at_us,
            server_id, sync_state, revision, last_synced_at_us, is_deleted, user_id, device_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(id) DO UPDATE SET
            task_id = excluded.task_id,
            remind_at_us = excluded.remind_at_us,
            snoozed_until_us = excluded.snoozed_until_us,
            status = excluded.status,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us,
            server_id = excluded.server_id,
            sync_state = excluded.sync_state,
            revision = excluded.revision,
            last_synced_at_us = excluded.last_synced_at_us,
            is_deleted = excluded.is_deleted,
            user_id = excluded.user_id,
            device_id = excluded.device_id",
        params![
            reminder.id.as_str(),
            reminder.task_id.as_str(),
            reminder.remind_at_us,
            reminder.snoozed_until_us,
            reminder.status.to_string(),
            reminder.created_at_us,
            reminder.updated_at_us,
            reminder.sync.server_id,
            reminder.sync.sync_state.to_string(),
            reminder.sync.revision,
            reminder.sync.last_synced_at_us,
            reminder.sync.is_deleted,
            reminder.sync.user_id,
            reminder.sync.device_id,
        ],
    )
    .with_context(|| format!("put reminder {}", reminder.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Arcs
// ---------------------------------------------------------------------------

fn arc_select() -> String {
    format!(
        "SELECT id, title, note, status, created_at_us, updated_at_us, \
         {SYNC_META_COLUMNS} FROM arcs"
    )
}

fn arc_from_row(row: &Row<'_>) -> rusqlite::Result<Arc> {
    let id: String = row.get(0)?;
    let status: String = row.get(3)?;
    Ok(Arc {
        id: EntityId::new_unchecked(id),
        title: row.get(1)?,
        note: row.get(2)?,
        status: parse_text(3, &status)?,
        created_at_us: row.get(4)?,
        updated_at_us: row.get(5)?,
        sync: sync_meta_from_row(row, 6)?,
    })
}

/// Fetch an arc by id, excluding tombstones unless asked.
///
/// # Errors
///
/// Returns an error if the read fails or a persisted value is invalid.
pub fn get_arc(conn: &Connection, id: &EntityId, include_deleted: bool) -> Result<Option<Arc>> {
    let sql = format!(
        "{} WHERE id = ?1{}",
        arc_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    conn.query_row(&sql, params![id.as_str()], arc_from_row)
        .optional()
        .with_context(|| format!("get arc {id}"))
}

/// Insert or fully overwrite an arc row.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn put_arc(conn: &Connection, arc: &Arc) -> Result<()> {
    conn.execute(
        "INSERT INTO arcs (
            id, title, note, status, created_at_us, updated_at_us,
            server_id, sync_state, revision, last_synced_at_us, is_deleted, user_id, device_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            note = excluded.note,
            status = excluded.status,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us,
            server_id = excluded.server_id,
            sync_state = excluded.sync_state,
            revision = excluded.revision,
            last_synced_at_us = excluded.last_synced_at_us,
            is_deleted = excluded.is_deleted,
            user_id = excluded.user_id,
            device_id = excluded.device_id",
        params![
            arc.id.as_str(),
            arc.title,
            arc.note,
            arc.status.to_string(),
            arc.created_at_us,
            arc.updated_at_us,
            arc.sync.server_id,
            arc.sync.sync_state.to_string(),
            arc.sync.revision,
            arc.sync.last_synced_at_us,
            arc.sync.is_deleted,
            arc.sync.user_id,
            arc.sync.device_id,
        ],
    )
    .with_context(|| format!("put arc {}", arc.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Attachments
// ---------------------------------------------------------------------------

fn attachment_select() -> String {
    format!(
        "SELECT id, parent_id, file_name, content_type, byte_size, \
         created_at_us, updated_at_us, {SYNC_META_COLUMNS} FROM attachments"
    )
}

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    let id: String = row.get(0)?;
    let parent_id: String = row.get(1)?;
    Ok(Attachment {
        id: EntityId::new_unchecked(id),
        parent_id: EntityId::new_unchecked(parent_id),
        file_name: row.get(2)?,
        content_type: row.get(3)?,
        byte_size: row.get(4)?,
        created_at_us: row.get(5)?,
        updated_at_us: row.get(6)?,
        sync: sync_meta_from_row(row, 7)?,
    })
}

/// Fetch an attachment by id, excluding tombstones unless asked.
///
/// # Errors
///
/// Returns an error if the read fails or a persisted value is invalid.
pub fn get_attachment(
    conn: &Connection,
    id: &EntityId,
    include_deleted: bool,
) -> Result<Option<Attachment>> {
    let sql = format!(
        "{} WHERE id = ?1{}",
        attachment_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    conn.query_row(&sql, params![id.as_str()], attachment_from_row)
        .optional()
        .with_context(|| format!("get attachment {id}"))
}

/// List attachments under a parent (stack or task).
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn list_attachments_for_parent(
    conn: &Connection,
    parent_id: &EntityId,
    include_deleted: bool,
) -> Result<Vec<Attachment>> {
    let sql = format!(
        "{} WHERE parent_id = ?1{} ORDER BY id ASC",
        attachment_select(),
        if include_deleted { "" } else { " AND is_deleted = 0" }
    );
    let mut stmt = conn.prepare(&sql).context("prepare attachment listing")?;
    let rows = stmt
        .query_map(params![parent_id.as_str()], attachment_from_row)
        .context("query attachment listing")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map attachment rows")
}

/// Insert or fully overwrite an attachment row.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn put_attachment(conn: &Connection, attachment: &Attachment) -> Result<()> {
    conn.execute(
        "INSERT INTO attachments (
            id, parent_id, file_name, content_type, byte_size,
            created_at_us, updated_at_us,
            server_id, sync_state, revision, last_synced_at_us, is_deleted, user_id, device_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(id) DO UPDATE SET
            parent_id = excluded.parent_id,
            file_name = excluded.file_name,
            content_type = excluded.content_type,
            byte_size = excluded.byte_size,
            created_at_us = excluded.created_at_us,
            updated_at_us = excluded.updated_at_us,
            server_id = excluded.server_id,
            sync_state = excluded.sync_state,
            revision = excluded.revision,
            last_synced_at_us = excluded.last_synced_at_us,
            is_deleted = excluded.is_deleted,
            user_id = excluded.user_id,
            device_id = excluded.device_id",
        params![
            attachment.id.as_str(),
            attachment.parent_id.as_str(),
            attachment.file_name,
            attachment.content_type,
            attachment.byte_size,
            attachment.created_at_us,
            attachment.updated_at_us,
            attachment.sync.server_id,
            attachment.sync.sync_state.to_string(),
            attachment.sync.revision,
            attachment.sync.last_synced_at_us,
            attachment.sync.is_deleted,
            attachment.sync.user_id,
            attachment.sync.device_id,
        ],
    )
    .with_context(|| format!("put attachment {}", attachment.id))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

const EVENT_COLUMNS: &str =
    "id, event_type, entity_id, payload, ts_us, actor_type, actor_id, device_id, app_id";

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let id: String = row.get(0)?;
    let event_type: String = row.get(1)?;
    let entity_id: String = row.get(2)?;
    let payload: String = row.get(3)?;
    let actor_type: String = row.get(5)?;
    Ok(Event {
        id: EventId::new_unchecked(id),
        event_type: parse_text(1, &event_type)?,
        entity_id: EntityId::new_unchecked(entity_id),
        payload: serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        ts_us: row.get(4)?,
        actor: Actor {
            actor_type: parse_text(5, &actor_type)?,
            actor_id: row.get(6)?,
            device_id: row.get(7)?,
            app_id: row.get(8)?,
        },
    })
}

/// Append one event row. The log is append-only: this is the only write
/// the core ever issues against `events`.
///
/// # Errors
///
/// Returns an error if the insert fails (e.g. duplicate event id).
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    conn.execute(
        "INSERT INTO events (id, event_type, entity_id, payload, ts_us, actor_type, actor_id, device_id, app_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.id.as_str(),
            event.event_type.as_str(),
            event.entity_id.as_str(),
            event.payload_json(),
            event.ts_us,
            event.actor.actor_type.to_string(),
            event.actor.actor_id,
            event.actor.device_id,
            event.actor.app_id,
        ],
    )
    .with_context(|| format!("append event {}", event.id))?;
    Ok(())
}

/// All events for one entity, newest first.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn events_for_entity(conn: &Connection, entity_id: &EntityId) -> Result<Vec<Event>> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE entity_id = ?1 \
         ORDER BY ts_us DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare entity event query")?;
    let rows = stmt
        .query_map(params![entity_id.as_str()], event_from_row)
        .context("query entity events")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map entity events")
}

/// All events for a set of entities, newest first. Used by history
/// composition; an empty id set returns an empty vec.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn events_for_entities(conn: &Connection, entity_ids: &[EntityId]) -> Result<Vec<Event>> {
    if entity_ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (1..=entity_ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE entity_id IN ({placeholders}) \
         ORDER BY ts_us DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare multi-entity event query")?;
    let rows = stmt
        .query_map(
            params_from_iter(entity_ids.iter().map(EntityId::as_str)),
            event_from_row,
        )
        .context("query multi-entity events")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map multi-entity events")
}

/// Fetch specific events by id, newest first. Unknown ids are skipped.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn events_by_ids(conn: &Connection, ids: &[EventId]) -> Result<Vec<Event>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (1..=ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE id IN ({placeholders}) \
         ORDER BY ts_us DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare event-by-id query")?;
    let rows = stmt
        .query_map(params_from_iter(ids.iter().map(EventId::as_str)), event_from_row)
        .context("query events by id")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map events by id")
}

/// The whole log in replay order: ascending `(ts_us, id)`.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn all_events_for_replay(conn: &Connection) -> Result<Vec<Event>> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY ts_us ASC, id ASC");
    let mut stmt = conn.prepare(&sql).context("prepare replay query")?;
    let rows = stmt
        .query_map([], event_from_row)
        .context("query replay events")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map replay events")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ActivationData, EventPayload};
    use crate::model::{StackStatus, SyncState};
    use crate::store::open_in_memory;

    fn sample_stack(id: &str, title: &str) -> Stack {
        Stack {
            id: EntityId::new_unchecked(id),
            title: title.into(),
            note: None,
            status: StackStatus::Planned,
            is_active: false,
            activated_at_us: None,
            arc_id: None,
            position: 0,
            created_at_us: 100,
            updated_at_us: 100,
            sync: SyncMeta::default(),
        }
    }

    #[test]
    fn put_get_stack_roundtrips() {
        let conn = open_in_memory().expect("open");
        let stack = sample_stack("11111111-1111-7111-8111-111111111111", "Morning routine");
        put_stack(&conn, &stack).expect("put");

        let loaded = get_stack(&conn, &stack.id, false)
            .expect("get")
            .expect("present");
        assert_eq!(loaded, stack);
    }

    #[test]
    fn tombstoned_rows_hidden_from_default_reads() {
        let conn = open_in_memory().expect("open");
        let mut stack = sample_stack("11111111-1111-7111-8111-111111111111", "Old stack");
        stack.sync.is_deleted = true;
        put_stack(&conn, &stack).expect("put");

        assert!(get_stack(&conn, &stack.id, false).expect("get").is_none());
        let found = get_stack(&conn, &stack.id, true)
            .expect("get")
            .expect("tombstone visible");
        assert!(found.sync.is_deleted);
        assert!(list_stacks(&conn).expect("list").is_empty());
    }

    #[test]
    fn put_overwrites_existing_row_without_duplicating() {
        let conn = open_in_memory().expect("open");
        let mut stack = sample_stack("11111111-1111-7111-8111-111111111111", "v1");
        put_stack(&conn, &stack).expect("put");
        stack.title = "v2".into();
        stack.sync.revision = 3;
        stack.sync.sync_state = SyncState::Synced;
        put_stack(&conn, &stack).expect("put again");

        let all = list_stacks(&conn).expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "v2");
        assert_eq!(all[0].sync.revision, 3);
    }

    #[test]
    fn event_append_and_read_back() {
        let conn = open_in_memory().expect("open");
        let entity = EntityId::generate();
        let event = Event::from_payload(
            entity.clone(),
            &EventPayload::StackActivated(ActivationData::default()),
            500,
            Actor::human("u", "d", "app"),
        )
        .expect("event");
        insert_event(&conn, &event).expect("insert");

        let history = events_for_entity(&conn, &entity).expect("history");
        assert_eq!(history, vec![event.clone()]);

        let by_id = events_by_ids(&conn, &[event.id.clone()]).expect("by id");
        assert_eq!(by_id.len(), 1);

        // Duplicate append is rejected: the log is append-only and unique.
        assert!(insert_event(&conn, &event).is_err());
    }

    #[test]
    fn replay_order_is_ts_then_id() {
        let conn = open_in_memory().expect("open");
        let entity = EntityId::generate();
        let mut first = Event::from_payload(
            entity.clone(),
            &EventPayload::StackActivated(ActivationData::default()),
            200,
            Actor::human("u", "d", "app"),
        )
        .expect("event");
        first.id = EventId::new_unchecked("00000000-0000-7000-8000-00000000000a");
        let mut tie = first.clone();
        tie.id = EventId::new_unchecked("00000000-0000-7000-8000-000000000001");
        let mut later = first.clone();
        later.id = EventId::new_unchecked("00000000-0000-7000-8000-000000000002");
        later.ts_us = 300;

        for e in [&first, &tie, &later] {
            insert_event(&conn, e).expect("insert");
        }

        let replay = all_events_for_replay(&conn).expect("replay");
        let ids: Vec<&str> = replay.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "00000000-0000-7000-8000-000000000001",
                "00000000-0000-7000-8000-00000000000a",
                "00000000-0000-7000-8000-000000000002",
            ]
        );
    }
}
