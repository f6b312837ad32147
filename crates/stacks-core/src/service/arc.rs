//! Arc feature service.

use anyhow::{Context, Result, bail};
use rusqlite::Connection;

use super::validate_title;
use crate::error::ErrorCode;
use crate::event::payload::{ArcSnapshot, EventPayload, TombstoneData};
use crate::event::types::EventType;
use crate::model::{Actor, Arc, ArcStatus, EntityId};
use crate::recorder::EventRecorder;
use crate::store::queries;
use std::collections::BTreeMap;

/// Input for creating an arc.
#[derive(Debug, Clone, Default)]
pub struct NewArc {
    pub title: String,
    pub note: Option<String>,
}

/// Patch for updating an arc. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct ArcChanges {
    pub title: Option<String>,
    pub note: Option<Option<String>>,
    pub status: Option<ArcStatus>,
}

pub struct ArcService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ArcService<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn fetch_required(&self, id: &EntityId) -> Result<Arc> {
        queries::get_arc(self.conn, id, false)?
            .with_context(|| format!("{}: arc {id} not found", ErrorCode::EntityNotFound))
    }

    /// Create an arc.
    ///
    /// # Errors
    ///
    /// Fails on invalid input; nothing is recorded.
    pub fn create(&self, new: NewArc, actor: &Actor) -> Result<Arc> {
        validate_title("arc title", &new.title)?;

        let id = EntityId::generate();
        let payload = EventPayload::ArcCreated(ArcSnapshot {
            title: new.title,
            note: new.note,
            status: ArcStatus::Active,
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::ArcCreated, &id, &payload, actor)?;
        self.fetch_required(&id)
    }

    /// Apply a patch, recording an `arc.updated` snapshot.
    ///
    /// # Errors
    ///
    /// Fails if the arc does not exist or input is invalid.
    pub fn update(&self, id: &EntityId, changes: ArcChanges, actor: &Actor) -> Result<Arc> {
        let current = self.fetch_required(id)?;

        let title = changes.title.unwrap_or(current.title);
        validate_title("arc title", &title)?;

        let payload = EventPayload::ArcUpdated(ArcSnapshot {
            title,
            note: changes.note.unwrap_or(current.note),
            status: changes.status.unwrap_or(current.status),
            extra: BTreeMap::new(),
        });
        EventRecorder::new(self.conn).record(EventType::ArcUpdated, id, &payload, actor)?;
        self.fetch_required(id)
    }

    /// Tombstone an arc. Stacks keep their `arc_id` pointing at the
    /// tombstone; the relation resolves through including-deleted reads.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Fails if the arc never existed or the write fails.
    pub fn delete(&self, id: &EntityId, actor: &Actor) -> Result<()> {
        let Some(arc) = queries::get_arc(self.conn, id, true)? else {
            bail!("{}: arc {id} not found", ErrorCode::EntityNotFound);
        };
        if arc.sync.is_deleted {
            return Ok(());
        }
        EventRecorder::new(self.conn).record(
            EventType::ArcDeleted,
            id,
            &EventPayload::ArcDeleted(TombstoneData::default()),
            actor,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_in_memory;

    fn actor() -> Actor {
        Actor::human("user-1", "device-a", "app.stacks.ios")
    }

    #[test]
    fn create_and_complete_an_arc() {
        let conn = open_in_memory().expect("open");
        let service = ArcService::new(&conn);
        let arc = service
            .create(
                NewArc {
                    title: "Get fit".into(),
                    note: None,
                },
                &actor(),
            )
            .expect("create");
        assert_eq!(arc.status, ArcStatus::Active);

        let done = service
            .update(
                &arc.id,
                ArcChanges {
                    status: Some(ArcStatus::Completed),
                    ..ArcChanges::default()
                },
                &actor(),
            )
            .expect("update");
        assert_eq!(done.status, ArcStatus::Completed);
        assert_eq!(done.sync.revision, 2);
    }
}
