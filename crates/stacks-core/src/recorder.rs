//! Write-side API: append an event and mutate the entity store in one
//! transaction.
//!
//! Atomicity is the core contract: either the event row lands **and** the
//! matching entity mutation is applied, or neither is. The mutation goes
//! through the same per-event apply path the projector uses, so state
//! produced incrementally is identical to state produced by replaying the
//! log.

use anyhow::{Context, Result, bail, ensure};
use rusqlite::Connection;

use crate::clock;
use crate::error::ErrorCode;
use crate::event::{Event, EventPayload, EventType};
use crate::model::{Actor, EntityId};
use crate::projector::Projector;
use crate::store::{queries, with_write_tx};

/// Appends events and applies their entity mutations transactionally.
pub struct EventRecorder<'conn> {
    conn: &'conn Connection,
}

impl<'conn> EventRecorder<'conn> {
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Record one event at the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Fails without any visible partial state if the payload does not
    /// match `event_type` or if any write in the transaction fails.
    pub fn record(
        &self,
        event_type: EventType,
        entity_id: &EntityId,
        payload: &EventPayload,
        actor: &Actor,
    ) -> Result<Event> {
        self.record_at(event_type, entity_id, payload, actor, clock::now_us())
    }

    /// Record one event with an explicit timestamp. Wraps
    /// [`Self::record_in_tx`] in its own write transaction.
    ///
    /// # Errors
    ///
    /// Same as [`Self::record`].
    pub fn record_at(
        &self,
        event_type: EventType,
        entity_id: &EntityId,
        payload: &EventPayload,
        actor: &Actor,
        ts_us: i64,
    ) -> Result<Event> {
        with_write_tx(self.conn, |_| {
            self.record_in_tx(event_type, entity_id, payload, actor, ts_us)
        })
    }

    /// Record one event inside a transaction the caller already owns.
    /// Used by feature services that record several events atomically
    /// (e.g. deactivate-then-activate).
    ///
    /// # Errors
    ///
    /// Fails if the payload does not match `event_type`, the append is
    /// rejected, or the entity mutation fails.
    pub fn record_in_tx(
        &self,
        event_type: EventType,
        entity_id: &EntityId,
        payload: &EventPayload,
        actor: &Actor,
        ts_us: i64,
    ) -> Result<Event> {
        if payload.event_type() != event_type {
            bail!(
                "{}: payload shape for {} cannot be recorded as {event_type}",
                ErrorCode::PayloadTypeMismatch,
                payload.event_type(),
            );
        }

        let event = Event::from_payload(entity_id.clone(), payload, ts_us, actor.clone())
            .context("serialize event payload")?;

        queries::insert_event(self.conn, &event)
            .with_context(|| format!("{}: append {event_type}", ErrorCode::EventAppendFailed))?;

        let applied = Projector::new(self.conn)
            .apply_event(&event)
            .with_context(|| format!("apply {event_type} to entity store"))?;
        ensure!(applied, "freshly recorded event {} was deduplicated", event.id);

        tracing::debug!(
            event_id = %event.id,
            event_type = %event_type,
            entity_id = %entity_id,
            actor = %actor.actor_type,
            "recorded event"
        );

        Ok(event)
    }
}
