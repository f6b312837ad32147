//! Event data model for the append-only log.
//!
//! An [`Event`] is immutable once written: corrections are expressed as
//! new events, never as updates. The payload is carried as a raw JSON
//! value so that a single corrupt payload surfaces at apply time (where
//! the projector can report it per-event) rather than poisoning a whole
//! log read.

pub mod payload;
pub mod types;

pub use payload::{
    ActivationData, ArcSnapshot, AttachmentSnapshot, EventPayload, PayloadError,
    ReminderSnapshot, ReminderSnoozedData, StackSnapshot, TaskBlockedData, TaskCompletedData,
    TaskSnapshot, TombstoneData,
};
pub use types::{EventType, UnknownEventType};

use serde::{Deserialize, Serialize};

use crate::model::{Actor, EntityId, EventId};

/// A single event in the append-only log.
///
/// Events are ordered by `(ts_us, id)`: wall-clock timestamp first, with
/// the time-sortable event id as the deterministic tie-breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique, time-sortable identifier (UUIDv7).
    pub id: EventId,

    /// The type of mutation this event represents.
    pub event_type: EventType,

    /// The aggregate instance this event is about.
    pub entity_id: EntityId,

    /// Raw JSON payload whose shape depends on `event_type`. Decode with
    /// [`Event::decode_payload`].
    pub payload: serde_json::Value,

    /// Wall-clock timestamp in microseconds since the Unix epoch.
    pub ts_us: i64,

    /// Provenance: who produced the event, on which device, via which app.
    #[serde(flatten)]
    pub actor: Actor,
}

impl Event {
    /// Build a new event from a typed payload, stamping a fresh UUIDv7 id.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload fails to serialize (should not
    /// happen with well-formed data).
    pub fn from_payload(
        entity_id: EntityId,
        payload: &EventPayload,
        ts_us: i64,
        actor: Actor,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            id: EventId::generate(),
            event_type: payload.event_type(),
            entity_id,
            payload: payload.to_json_value()?,
            ts_us,
            actor,
        })
    }

    /// Decode the raw payload against this event's declared type.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] when the stored JSON does not match the
    /// schema registered for `event_type` — a data-integrity error for
    /// this single event.
    pub fn decode_payload(&self) -> Result<EventPayload, PayloadError> {
        EventPayload::decode_for(self.event_type, &self.payload)
    }

    /// Serialize the payload to canonical JSON text for storage.
    ///
    /// `serde_json` maps are key-sorted by default, so the same payload
    /// always produces the same bytes.
    #[must_use]
    pub fn payload_json(&self) -> String {
        self.payload.to_string()
    }
}

/// Sort events into replay order: ascending `(ts_us, id)`.
pub fn sort_for_replay(events: &mut [Event]) {
    events.sort_by(|a, b| a.ts_us.cmp(&b.ts_us).then_with(|| a.id.cmp(&b.id)));
}
