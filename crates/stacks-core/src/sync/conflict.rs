//! Persisted sync conflicts.
//!
//! A conflict is created when a remote update's revision beats an
//! un-pushed local edit. Both serialized versions are kept until an
//! explicit resolution call; conflicts are never silently dropped.

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::model::{EntityId, EntityKind, ParseEnumError, normalize};

/// Resolution status of a persisted conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    Open,
    ResolvedLocal,
    ResolvedRemote,
}

impl ConflictStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::ResolvedLocal => "resolved_local",
            Self::ResolvedRemote => "resolved_remote",
        }
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "open" => Ok(Self::Open),
            "resolved_local" => Ok(Self::ResolvedLocal),
            "resolved_remote" => Ok(Self::ResolvedRemote),
            _ => Err(ParseEnumError {
                expected: "conflict status",
                got: s.to_string(),
            }),
        }
    }
}

/// A persisted record of two irreconcilable versions of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConflict {
    pub conflict_id: i64,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub local_revision: i64,
    pub remote_revision: i64,
    /// The local (pending) version, serialized as JSON.
    pub local_json: String,
    /// The remote candidate version, serialized as JSON.
    pub remote_json: String,
    pub status: ConflictStatus,
    pub created_at_us: i64,
    pub resolved_at_us: Option<i64>,
}

const CONFLICT_COLUMNS: &str = "conflict_id, entity_kind, entity_id, local_revision, \
     remote_revision, local_json, remote_json, status, created_at_us, resolved_at_us";

fn enum_col_error(idx: usize, err: ParseEnumError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn conflict_from_row(row: &Row<'_>) -> rusqlite::Result<SyncConflict> {
    let kind: String = row.get(1)?;
    let entity_id: String = row.get(2)?;
    let status: String = row.get(7)?;
    Ok(SyncConflict {
        conflict_id: row.get(0)?,
        entity_kind: kind.parse().map_err(|e| enum_col_error(1, e))?,
        entity_id: EntityId::new_unchecked(entity_id),
        local_revision: row.get(3)?,
        remote_revision: row.get(4)?,
        local_json: row.get(5)?,
        remote_json: row.get(6)?,
        status: status.parse().map_err(|e| enum_col_error(7, e))?,
        created_at_us: row.get(8)?,
        resolved_at_us: row.get(9)?,
    })
}

/// Fetch the open conflict for an entity, if any. At most one can exist
/// (enforced by a partial unique index).
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn open_conflict_for(
    conn: &Connection,
    kind: EntityKind,
    entity_id: &EntityId,
) -> Result<Option<SyncConflict>> {
    let sql = format!(
        "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts \
         WHERE entity_kind = ?1 AND entity_id = ?2 AND status = 'open'"
    );
    conn.query_row(&sql, params![kind.as_str(), entity_id.as_str()], conflict_from_row)
        .optional()
        .with_context(|| format!("get open conflict for {kind} {entity_id}"))
}

/// Fetch a conflict by id.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn get_conflict(conn: &Connection, conflict_id: i64) -> Result<Option<SyncConflict>> {
    let sql = format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE conflict_id = ?1");
    conn.query_row(&sql, params![conflict_id], conflict_from_row)
        .optional()
        .with_context(|| format!("get conflict {conflict_id}"))
}

/// List every open conflict, oldest first — the resolution work queue.
///
/// # Errors
///
/// Returns an error if the read fails.
pub fn list_open_conflicts(conn: &Connection) -> Result<Vec<SyncConflict>> {
    let sql = format!(
        "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts \
         WHERE status = 'open' ORDER BY created_at_us ASC, conflict_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare open conflict listing")?;
    let rows = stmt
        .query_map([], conflict_from_row)
        .context("query open conflicts")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map open conflicts")
}

/// Create the open conflict for an entity, or refresh the remote side of
/// the existing one when another remote update lands before resolution.
/// Returns the conflict row.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn upsert_open_conflict(
    conn: &Connection,
    kind: EntityKind,
    entity_id: &EntityId,
    local_revision: i64,
    remote_revision: i64,
    local_json: &str,
    remote_json: &str,
    now_us: i64,
) -> Result<SyncConflict> {
    if let Some(existing) = open_conflict_for(conn, kind, entity_id)? {
        conn.execute(
            "UPDATE sync_conflicts SET remote_revision = ?2, remote_json = ?3 \
             WHERE conflict_id = ?1",
            params![existing.conflict_id, remote_revision, remote_json],
        )
        .context("refresh open conflict")?;
        return get_conflict(conn, existing.conflict_id)?
            .context("conflict vanished during refresh");
    }

    conn.execute(
        "INSERT INTO sync_conflicts (
            entity_kind, entity_id, local_revision, remote_revision,
            local_json, remote_json, status, created_at_us
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open', ?7)",
        params![
            kind.as_str(),
            entity_id.as_str(),
            local_revision,
            remote_revision,
            local_json,
            remote_json,
            now_us,
        ],
    )
    .with_context(|| format!("create conflict for {kind} {entity_id}"))?;

    open_conflict_for(conn, kind, entity_id)?.context("conflict vanished after insert")
}

/// Mark a conflict resolved.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn mark_resolved(
    conn: &Connection,
    conflict_id: i64,
    status: ConflictStatus,
    now_us: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE sync_conflicts SET status = ?2, resolved_at_us = ?3 WHERE conflict_id = ?1",
        params![conflict_id, status.to_string(), now_us],
    )
    .with_context(|| format!("mark conflict {conflict_id} {status}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_in_memory;

    #[test]
    fn upsert_creates_then_refreshes_remote_side() {
        let conn = open_in_memory().expect("open");
        let id = EntityId::generate();

        let first = upsert_open_conflict(
            &conn,
            EntityKind::Stack,
            &id,
            2,
            5,
            r#"{"v":"local"}"#,
            r#"{"v":"remote-5"}"#,
            100,
        )
        .expect("create");
        assert_eq!(first.status, ConflictStatus::Open);
        assert_eq!(first.remote_revision, 5);

        let refreshed = upsert_open_conflict(
            &conn,
            EntityKind::Stack,
            &id,
            2,
            6,
            r#"{"v":"local"}"#,
            r#"{"v":"remote-6"}"#,
            200,
        )
        .expect("refresh");
        assert_eq!(refreshed.conflict_id, first.conflict_id);
        assert_eq!(refreshed.remote_revision, 6);
        assert_eq!(refreshed.remote_json, r#"{"v":"remote-6"}"#);
        // The local side and creation time are untouched.
        assert_eq!(refreshed.local_revision, 2);
        assert_eq!(refreshed.created_at_us, 100);

        assert_eq!(list_open_conflicts(&conn).expect("list").len(), 1);
    }

    #[test]
    fn resolution_closes_the_queue_entry() {
        let conn = open_in_memory().expect("open");
        let id = EntityId::generate();
        let conflict = upsert_open_conflict(
            &conn,
            EntityKind::Task,
            &id,
            1,
            2,
            "{}",
            "{}",
            100,
        )
        .expect("create");

        mark_resolved(&conn, conflict.conflict_id, ConflictStatus::ResolvedRemote, 300)
            .expect("resolve");

        assert!(open_conflict_for(&conn, EntityKind::Task, &id)
            .expect("get")
            .is_none());
        let closed = get_conflict(&conn, conflict.conflict_id)
            .expect("get")
            .expect("present");
        assert_eq!(closed.status, ConflictStatus::ResolvedRemote);
        assert_eq!(closed.resolved_at_us, Some(300));
    }
}
