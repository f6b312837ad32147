//! Single-active-stack invariant enforcement.
//!
//! At most one stack may have `is_active = true` across the whole store.
//! The winner is decided by [`pick_active_winner`], a pure function over
//! the in-memory activation index — deliberately decoupled from the event
//! handlers so it can be tested without SQL and reused by the incremental
//! write path, batch replay, and sync.
//!
//! # Why the index includes inactive (and deleted) stacks
//!
//! `activated_at_us` records when a stack was *last* set active and is
//! preserved through deactivation, deletion, and demotion. The globally
//! latest activation decides everything: if that stack is still active it
//! wins and all others are demoted; if it has since been deactivated or
//! deleted, then every earlier activation was already superseded and no
//! stack stays active. This is what makes one reconcile pass at the end
//! of a batch produce the same end state as running the pass after every
//! event.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use crate::model::EntityId;

/// One row in the activation index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRecord {
    pub stack_id: EntityId,
    pub is_active: bool,
    /// When this stack was last set active. Survives deactivation.
    pub activated_at_us: Option<i64>,
}

/// Decide which stack, if any, keeps its activation: the stack with the
/// globally latest activation (ties broken by id) — and only if it is
/// still active. Returns `None` when no stack should remain active.
#[must_use]
pub fn pick_active_winner(index: &[ActivationRecord]) -> Option<&EntityId> {
    let latest = index
        .iter()
        .filter(|r| r.is_active || r.activated_at_us.is_some())
        .max_by_key(|r| (r.activated_at_us.unwrap_or(i64::MIN), r.stack_id.as_str()))?;
    latest.is_active.then_some(&latest.stack_id)
}

/// Load the activation index: every stack that is active or has ever
/// been activated, tombstoned rows included (a deleted stack's past
/// activation still supersedes earlier ones).
fn activation_index(conn: &Connection) -> Result<Vec<ActivationRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, is_active, activated_at_us FROM stacks \
             WHERE is_active = 1 OR activated_at_us IS NOT NULL",
        )
        .context("prepare activation index query")?;
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(ActivationRecord {
                stack_id: EntityId::new_unchecked(id),
                is_active: row.get(1)?,
                activated_at_us: row.get(2)?,
            })
        })
        .context("query activation index")?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("map activation index")
}

/// Enforce the invariant against the store: every active stack except the
/// winner (possibly every active stack) is deactivated. Returns the
/// number of stacks demoted.
///
/// Demotion flips only `is_active` — `activated_at_us` is bookkeeping
/// that must survive — and bumps `revision` / sets `sync_state =
/// 'pending'` so the correction is pushed on the next sync. No event is
/// emitted: replay derives state, it does not append.
///
/// # Errors
///
/// Returns an error if reading or writing the store fails.
pub fn reconcile_single_active(conn: &Connection) -> Result<usize> {
    let index = activation_index(conn)?;
    let winner = pick_active_winner(&index).cloned();

    let mut demoted = 0;
    for record in &index {
        if !record.is_active || Some(&record.stack_id) == winner.as_ref() {
            continue;
        }
        conn.execute(
            "UPDATE stacks SET is_active = 0, revision = revision + 1, \
             sync_state = 'pending' WHERE id = ?1",
            params![record.stack_id.as_str()],
        )
        .with_context(|| format!("deactivate losing stack {}", record.stack_id))?;
        demoted += 1;
    }

    if demoted > 0 {
        tracing::debug!(winner = ?winner.as_ref().map(EntityId::as_str), demoted, "reconciled single-active invariant");
    }

    Ok(demoted)
}
