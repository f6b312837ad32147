//! Sync reconciler: merges remote state into the local store.
//!
//! Merging is last-write-wins by `revision`, with one hard rule: a remote
//! update never silently overwrites an un-pushed local edit. That case is
//! materialized as a [`SyncConflict`] and left for explicit resolution.
//!
//! Inbound tombstones (`is_deleted = true`) are ordinary field updates
//! and follow the exact same rule — there is no special deletion path.
//!
//! Transport is not this module's concern: callers hand in an
//! already-decoded remote representation per aggregate type. Transport
//! failures never reach the store, so local rows stay `pending` and the
//! next sync attempt retries cleanly.

pub mod conflict;

pub use conflict::{ConflictStatus, SyncConflict};

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::clock;
use crate::error::ErrorCode;
use crate::model::{
    Arc, ArcStatus, Attachment, EntityId, EntityKind, Reminder, ReminderStatus, Stack,
    StackStatus, SyncMeta, SyncState, Task, TaskStatus,
};
use crate::reconcile;
use crate::store::{queries, with_write_tx};

// ---------------------------------------------------------------------------
// Merge decision
// ---------------------------------------------------------------------------

/// What to do with an incoming remote version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// No local row: create it from the remote version.
    Insert,
    /// Local row is clean (`synced`): adopt the remote version.
    Overwrite,
    /// Un-pushed local edit vs strictly newer remote revision: surface a
    /// conflict, leave local fields untouched.
    Conflict,
    /// Un-pushed local edit wins (remote revision is not newer): keep
    /// local state pending for the next push.
    KeepLocal,
}

/// Decide how to merge, given the local row's `(sync_state, revision)`
/// (or `None` when no row exists) and the remote revision.
///
/// Pure so the LWW rule is testable without a store.
#[must_use]
pub const fn merge_decision(
    local: Option<(SyncState, i64)>,
    remote_revision: i64,
) -> MergeDecision {
    match local {
        None => MergeDecision::Insert,
        Some((SyncState::Synced, _)) => MergeDecision::Overwrite,
        Some((SyncState::Pending | SyncState::Conflict, local_revision)) => {
            if remote_revision > local_revision {
                MergeDecision::Conflict
            } else {
                MergeDecision::KeepLocal
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SyncRow — the seam between the generic merge engine and each aggregate
// ---------------------------------------------------------------------------

trait SyncRow: Serialize + DeserializeOwned + Clone {
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;
    fn sync_meta(&self) -> &SyncMeta;
    fn sync_meta_mut(&mut self) -> &mut SyncMeta;
    fn fetch(conn: &Connection, id: &EntityId) -> Result<Option<Self>>;
    fn put(conn: &Connection, row: &Self) -> Result<()>;

    /// Invariant hook after an accepted remote write. Default: nothing.
    fn post_accept(_conn: &Connection) -> Result<()> {
        Ok(())
    }
}

macro_rules! sync_row {
    ($ty:ty, $kind:expr, $fetch:path, $put:path) => {
        impl SyncRow for $ty {
            const KIND: EntityKind = $kind;

            fn id(&self) -> &EntityId {
                &self.id
            }

            fn sync_meta(&self) -> &SyncMeta {
                &self.sync
            }

            fn sync_meta_mut(&mut self) -> &mut SyncMeta {
                &mut self.sync
            }

            fn fetch(conn: &Connection, id: &EntityId) -> Result<Option<Self>> {
                // Tombstoned rows must be found: reconciliation acts on
                // dead-but-present entities.
                $fetch(conn, id, true)
            }

            fn put(conn: &Connection, row: &Self) -> Result<()> {
                $put(conn, row)
            }
        }
    };
}

sync_row!(Task, EntityKind::Task, queries::get_task, queries::put_task);
sync_row!(
    Reminder,
    EntityKind::Reminder,
    queries::get_reminder,
    queries::put_reminder
);
sync_row!(Arc, EntityKind::Arc, queries::get_arc, queries::put_arc);
sync_row!(
    Attachment,
    EntityKind::Attachment,
    queries::get_attachment,
    queries::put_attachment
);

impl SyncRow for Stack {
    const KIND: EntityKind = EntityKind::Stack;

    fn id(&self) -> &EntityId {
        &self.id
    }

    fn sync_meta(&self) -> &SyncMeta {
        &self.sync
    }

    fn sync_meta_mut(&mut self) -> &mut SyncMeta {
        &mut self.sync
    }

    fn fetch(conn: &Connection, id: &EntityId) -> Result<Option<Self>> {
        queries::get_stack(conn, id, true)
    }

    fn put(conn: &Connection, row: &Self) -> Result<()> {
        queries::put_stack(conn, row)
    }

    fn post_accept(conn: &Connection) -> Result<()> {
        // A remote activation may collide with a local one; the invariant
        // holds on every mutation path, sync included.
        reconcile::reconcile_single_active(conn).map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Generic merge engine
// ---------------------------------------------------------------------------

fn upsert_row<T: SyncRow>(conn: &Connection, mut incoming: T) -> Result<T> {
    let now = clock::now_us();

    with_write_tx(conn, |conn| {
        let local = T::fetch(conn, incoming.id())?;
        let decision = merge_decision(
            local
                .as_ref()
                .map(|row| (row.sync_meta().sync_state, row.sync_meta().revision)),
            incoming.sync_meta().revision,
        );

        match decision {
            MergeDecision::Insert | MergeDecision::Overwrite => {
                incoming.sync_meta_mut().sync_state = SyncState::Synced;
                incoming.sync_meta_mut().last_synced_at_us = Some(now);
                T::put(conn, &incoming)?;
                T::post_accept(conn)?;
                tracing::debug!(
                    kind = %T::KIND,
                    entity_id = %incoming.id(),
                    revision = incoming.sync_meta().revision,
                    ?decision,
                    "accepted remote version"
                );
                Ok(incoming)
            }
            MergeDecision::Conflict => {
                let mut local = local.context("conflict decision implies a local row")?;
                let local_json =
                    serde_json::to_string(&local).context("serialize local version")?;
                let remote_json =
                    serde_json::to_string(&incoming).context("serialize remote version")?;
                let conflict = conflict::upsert_open_conflict(
                    conn,
                    T::KIND,
                    local.id(),
                    local.sync_meta().revision,
                    incoming.sync_meta().revision,
                    &local_json,
                    &remote_json,
                    now,
                )?;
                tracing::warn!(
                    kind = %T::KIND,
                    entity_id = %local.id(),
                    conflict_id = conflict.conflict_id,
                    local_revision = local.sync_meta().revision,
                    remote_revision = incoming.sync_meta().revision,
                    "remote update conflicts with pending local edit"
                );
                // Fields stay untouched until resolution; only the state
                // flag flips so the UI can surface the conflict.
                local.sync_meta_mut().sync_state = SyncState::Conflict;
                T::put(conn, &local)?;
                Ok(local)
            }
            MergeDecision::KeepLocal => {
                local.context("keep-local decision implies a local row")
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Remote representations
// ---------------------------------------------------------------------------

/// Decoded remote stack, as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStack {
    pub id: EntityId,
    pub server_id: String,
    pub revision: i64,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    pub status: StackStatus,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub activated_at_us: Option<i64>,
    #[serde(default)]
    pub arc_id: Option<EntityId>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub user_id: String,
    pub device_id: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl RemoteStack {
    fn into_row(self) -> Stack {
        Stack {
            id: self.id,
            title: self.title,
            note: self.note,
            status: self.status,
            is_active: self.is_active,
            activated_at_us: self.activated_at_us,
            arc_id: self.arc_id,
            position: self.position,
            created_at_us: self.created_at_us,
            updated_at_us: self.updated_at_us,
            sync: SyncMeta {
                server_id: Some(self.server_id),
                sync_state: SyncState::Synced,
                revision: self.revision,
                last_synced_at_us: None,
                is_deleted: self.is_deleted,
                user_id: self.user_id,
                device_id: self.device_id,
            },
        }
    }
}

/// Decoded remote task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTask {
    pub id: EntityId,
    pub server_id: String,
    pub revision: i64,
    pub stack_id: EntityId,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at_us: Option<i64>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub user_id: String,
    pub device_id: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl RemoteTask {
    fn into_row(self) -> Task {
        Task {
            id: self.id,
            stack_id: self.stack_id,
            title: self.title,
            note: self.note,
            status: self.status,
            completed_at_us: self.completed_at_us,
            position: self.position,
            created_at_us: self.created_at_us,
            updated_at_us: self.updated_at_us,
            sync: SyncMeta {
                server_id: Some(self.server_id),
                sync_state: SyncState::Synced,
                revision: self.revision,
                last_synced_at_us: None,
                is_deleted: self.is_deleted,
                user_id: self.user_id,
                device_id: self.device_id,
            },
        }
    }
}

/// Decoded remote reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteReminder {
    pub id: EntityId,
    pub server_id: String,
    pub revision: i64,
    pub task_id: EntityId,
    pub remind_at_us: i64,
    #[serde(default)]
    pub snoozed_until_us: Option<i64>,
    pub status: ReminderStatus,
    #[serde(default)]
    pub is_deleted: bool,
    pub user_id: String,
    pub device_id: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl RemoteReminder {
    fn into_row(self) -> Reminder {
        Reminder {
            id: self.id,
            task_id: self.task_id,
            remind_at_us: self.remind_at_us,
            snoozed_until_us: self.snoozed_until_us,
            status: self.status,
            created_at_us: self.created_at_us,
            updated_at_us: self.updated_at_us,
            sync: SyncMeta {
                server_id: Some(self.server_id),
                sync_state: SyncState::Synced,
                revision: self.revision,
                last_synced_at_us: None,
                is_deleted: self.is_deleted,
                user_id: self.user_id,
                device_id: self.device_id,
            },
        }
    }
}

/// Decoded remote arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArc {
    pub id: EntityId,
    pub server_id: String,
    pub revision: i64,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    pub status: ArcStatus,
    #[serde(default)]
    pub is_deleted: bool,
    pub user_id: String,
    pub device_id: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl RemoteArc {
    fn into_row(self) -> Arc {
        Arc {
            id: self.id,
            title: self.title,
            note: self.note,
            status: self.status,
            created_at_us: self.created_at_us,
            updated_at_us: self.updated_at_us,
            sync: SyncMeta {
                server_id: Some(self.server_id),
                sync_state: SyncState::Synced,
                revision: self.revision,
                last_synced_at_us: None,
                is_deleted: self.is_deleted,
                user_id: self.user_id,
                device_id: self.device_id,
            },
        }
    }
}

/// Decoded remote attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAttachment {
    pub id: EntityId,
    pub server_id: String,
    pub revision: i64,
    pub parent_id: EntityId,
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub byte_size: i64,
    #[serde(default)]
    pub is_deleted: bool,
    pub user_id: String,
    pub device_id: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl RemoteAttachment {
    fn into_row(self) -> Attachment {
        Attachment {
            id: self.id,
            parent_id: self.parent_id,
            file_name: self.file_name,
            content_type: self.content_type,
            byte_size: self.byte_size,
            created_at_us: self.created_at_us,
            updated_at_us: self.updated_at_us,
            sync: SyncMeta {
                server_id: Some(self.server_id),
                sync_state: SyncState::Synced,
                revision: self.revision,
                last_synced_at_us: None,
                is_deleted: self.is_deleted,
                user_id: self.user_id,
                device_id: self.device_id,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Public upsert entry points
// ---------------------------------------------------------------------------

/// Merge a remote stack into the store per the LWW-by-revision rule.
///
/// # Errors
///
/// Returns an error if the store read/write fails; the transaction rolls
/// back and local state is unchanged.
pub fn upsert_stack_from_sync(conn: &Connection, remote: RemoteStack) -> Result<Stack> {
    upsert_row(conn, remote.into_row())
}

/// Merge a remote task into the store.
///
/// # Errors
///
/// Same contract as [`upsert_stack_from_sync`].
pub fn upsert_task_from_sync(conn: &Connection, remote: RemoteTask) -> Result<Task> {
    upsert_row(conn, remote.into_row())
}

/// Merge a remote reminder into the store.
///
/// # Errors
///
/// Same contract as [`upsert_stack_from_sync`].
pub fn upsert_reminder_from_sync(conn: &Connection, remote: RemoteReminder) -> Result<Reminder> {
    upsert_row(conn, remote.into_row())
}

/// Merge a remote arc into the store.
///
/// # Errors
///
/// Same contract as [`upsert_stack_from_sync`].
pub fn upsert_arc_from_sync(conn: &Connection, remote: RemoteArc) -> Result<Arc> {
    upsert_row(conn, remote.into_row())
}

/// Merge a remote attachment into the store.
///
/// # Errors
///
/// Same contract as [`upsert_stack_from_sync`].
pub fn upsert_attachment_from_sync(
    conn: &Connection,
    remote: RemoteAttachment,
) -> Result<Attachment> {
    upsert_row(conn, remote.into_row())
}

// ---------------------------------------------------------------------------
// Conflict resolution
// ---------------------------------------------------------------------------

/// Which version wins an open conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local edit; its revision is bumped past the remote one so
    /// the next push supersedes the server version.
    KeepLocal,
    /// Adopt the remote version; the row becomes `synced`.
    AcceptRemote,
}

fn resolve_row<T: SyncRow>(
    conn: &Connection,
    conflict: &SyncConflict,
    resolution: ConflictResolution,
    now: i64,
) -> Result<()> {
    match resolution {
        ConflictResolution::KeepLocal => {
            let mut row: T = serde_json::from_str(&conflict.local_json)
                .context("deserialize local conflict version")?;
            row.sync_meta_mut().sync_state = SyncState::Pending;
            row.sync_meta_mut().revision = conflict.remote_revision + 1;
            T::put(conn, &row)?;
            conflict::mark_resolved(
                conn,
                conflict.conflict_id,
                ConflictStatus::ResolvedLocal,
                now,
            )
        }
        ConflictResolution::AcceptRemote => {
            let mut row: T = serde_json::from_str(&conflict.remote_json)
                .context("deserialize remote conflict version")?;
            row.sync_meta_mut().sync_state = SyncState::Synced;
            row.sync_meta_mut().last_synced_at_us = Some(now);
            T::put(conn, &row)?;
            T::post_accept(conn)?;
            conflict::mark_resolved(
                conn,
                conflict.conflict_id,
                ConflictStatus::ResolvedRemote,
                now,
            )
        }
    }
}

/// Apply an explicit resolution to an open conflict.
///
/// # Errors
///
/// Fails if the conflict does not exist, is already resolved, or the
/// store write fails.
pub fn resolve_conflict(
    conn: &Connection,
    conflict_id: i64,
    resolution: ConflictResolution,
) -> Result<()> {
    let now = clock::now_us();

    with_write_tx(conn, |conn| {
        let conflict = conflict::get_conflict(conn, conflict_id)?
            .with_context(|| format!("conflict {conflict_id} not found"))?;
        if conflict.status != ConflictStatus::Open {
            bail!(
                "{}: conflict {conflict_id} is already {}",
                ErrorCode::ConflictUnresolved,
                conflict.status
            );
        }

        match conflict.entity_kind {
            EntityKind::Stack => resolve_row::<Stack>(conn, &conflict, resolution, now),
            EntityKind::Task => resolve_row::<Task>(conn, &conflict, resolution, now),
            EntityKind::Reminder => resolve_row::<Reminder>(conn, &conflict, resolution, now),
            EntityKind::Arc => resolve_row::<Arc>(conn, &conflict, resolution, now),
            EntityKind::Attachment => resolve_row::<Attachment>(conn, &conflict, resolution, now),
        }
    })
}
