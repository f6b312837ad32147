//! Typed payload structs for each event type.
//!
//! The discriminant is external: it lives in the event's `event_type`
//! column, not inside the JSON. [`EventPayload::decode_for`] is the decode
//! registry — it maps a known [`EventType`] to the matching struct and
//! rejects mismatched or malformed JSON. Unknown fields are preserved via
//! `#[serde(flatten)]` for forward compatibility.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::types::EventType;
use crate::model::{ArcStatus, EntityId, ReminderStatus, StackStatus, TaskStatus};

// ---------------------------------------------------------------------------
// Snapshot payloads (`*.created`, `*.updated`, `attachment.added`)
// ---------------------------------------------------------------------------

/// Full scalar snapshot of a stack, as carried by `stack.created` and
/// `stack.updated`. Includes `is_active`: a `stack.updated` replay fully
/// restores the activation flag from its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSnapshot {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status: StackStatus,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub arc_id: Option<EntityId>,
    #[serde(default)]
    pub position: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Full scalar snapshot of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub stack_id: EntityId,
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub completed_at_us: Option<i64>,
    #[serde(default)]
    pub position: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Full scalar snapshot of a reminder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSnapshot {
    pub task_id: EntityId,
    pub remind_at_us: i64,
    #[serde(default)]
    pub snoozed_until_us: Option<i64>,
    #[serde(default)]
    pub status: ReminderStatus,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Full scalar snapshot of an arc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArcSnapshot {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status: ArcStatus,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Full scalar snapshot of an attachment. `parent_id` is what history
/// composition uses to pull attachment events into a stack or task
/// timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSnapshot {
    pub parent_id: EntityId,
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub byte_size: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// Status-transition payloads
// ---------------------------------------------------------------------------

/// Payload for `stack.activated` and `stack.deactivated`. Carries no
/// fields of its own; the governed flag is implied by the event type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationData {
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `task.completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCompletedData {
    pub completed_at_us: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `task.blocked`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBlockedData {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `reminder.snoozed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSnoozedData {
    pub snoozed_until_us: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for every tombstoning event (`*.deleted`,
/// `attachment.removed`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TombstoneData {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

// ---------------------------------------------------------------------------
// EventPayload — the unified payload union
// ---------------------------------------------------------------------------

/// Typed payload for an event. The variant always agrees with the event's
/// [`EventType`]; [`EventPayload::event_type`] returns the only type a
/// variant is valid for, and the recorder rejects mismatches before
/// anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    StackCreated(StackSnapshot),
    StackUpdated(StackSnapshot),
    StackActivated(ActivationData),
    StackDeactivated(ActivationData),
    StackDeleted(TombstoneData),
    TaskCreated(TaskSnapshot),
    TaskUpdated(TaskSnapshot),
    TaskCompleted(TaskCompletedData),
    TaskBlocked(TaskBlockedData),
    TaskDeleted(TombstoneData),
    ReminderCreated(ReminderSnapshot),
    ReminderUpdated(ReminderSnapshot),
    ReminderSnoozed(ReminderSnoozedData),
    ReminderDeleted(TombstoneData),
    ArcCreated(ArcSnapshot),
    ArcUpdated(ArcSnapshot),
    ArcDeleted(TombstoneData),
    AttachmentAdded(AttachmentSnapshot),
    AttachmentRemoved(TombstoneData),
}

/// Error returned when decoding an event's JSON payload fails.
#[derive(Debug, thiserror::Error)]
#[error("invalid {event_type} payload: {source}")]
pub struct PayloadError {
    /// The event type the payload was decoded against.
    pub event_type: EventType,
    /// The underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}

impl EventPayload {
    /// Decode a raw JSON value into the payload struct registered for
    /// `event_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] if the JSON does not match the schema
    /// registered for the given event type.
    pub fn decode_for(event_type: EventType, json: &Value) -> Result<Self, PayloadError> {
        fn de<T: serde::de::DeserializeOwned>(
            json: &Value,
            wrap: impl FnOnce(T) -> EventPayload,
            event_type: EventType,
        ) -> Result<EventPayload, PayloadError> {
            serde_json::from_value::<T>(json.clone())
                .map(wrap)
                .map_err(|source| PayloadError { event_type, source })
        }

        match event_type {
            EventType::StackCreated => de(json, Self::StackCreated, event_type),
            EventType::StackUpdated => de(json, Self::StackUpdated, event_type),
            EventType::StackActivated => de(json, Self::StackActivated, event_type),
            EventType::StackDeactivated => de(json, Self::StackDeactivated, event_type),
            EventType::StackDeleted => de(json, Self::StackDeleted, event_type),
            EventType::TaskCreated => de(json, Self::TaskCreated, event_type),
            EventType::TaskUpdated => de(json, Self::TaskUpdated, event_type),
            EventType::TaskCompleted => de(json, Self::TaskCompleted, event_type),
            EventType::TaskBlocked => de(json, Self::TaskBlocked, event_type),
            EventType::TaskDeleted => de(json, Self::TaskDeleted, event_type),
            EventType::ReminderCreated => de(json, Self::ReminderCreated, event_type),
            EventType::ReminderUpdated => de(json, Self::ReminderUpdated, event_type),
            EventType::ReminderSnoozed => de(json, Self::ReminderSnoozed, event_type),
            EventType::ReminderDeleted => de(json, Self::ReminderDeleted, event_type),
            EventType::ArcCreated => de(json, Self::ArcCreated, event_type),
            EventType::ArcUpdated => de(json, Self::ArcUpdated, event_type),
            EventType::ArcDeleted => de(json, Self::ArcDeleted, event_type),
            EventType::AttachmentAdded => de(json, Self::AttachmentAdded, event_type),
            EventType::AttachmentRemoved => de(json, Self::AttachmentRemoved, event_type),
        }
    }

    /// The event type this payload variant belongs to.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::StackCreated(_) => EventType::StackCreated,
            Self::StackUpdated(_) => EventType::StackUpdated,
            Self::StackActivated(_) => EventType::StackActivated,
            Self::StackDeactivated(_) => EventType::StackDeactivated,
            Self::StackDeleted(_) => EventType::StackDeleted,
            Self::TaskCreated(_) => EventType::TaskCreated,
            Self::TaskUpdated(_) => EventType::TaskUpdated,
            Self::TaskCompleted(_) => EventType::TaskCompleted,
            Self::TaskBlocked(_) => EventType::TaskBlocked,
            Self::TaskDeleted(_) => EventType::TaskDeleted,
            Self::ReminderCreated(_) => EventType::ReminderCreated,
            Self::ReminderUpdated(_) => EventType::ReminderUpdated,
            Self::ReminderSnoozed(_) => EventType::ReminderSnoozed,
            Self::ReminderDeleted(_) => EventType::ReminderDeleted,
            Self::ArcCreated(_) => EventType::ArcCreated,
            Self::ArcUpdated(_) => EventType::ArcUpdated,
            Self::ArcDeleted(_) => EventType::ArcDeleted,
            Self::AttachmentAdded(_) => EventType::AttachmentAdded,
            Self::AttachmentRemoved(_) => EventType::AttachmentRemoved,
        }
    }

    /// Serialize the payload to a [`serde_json::Value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the inner struct fails to serialize (should not
    /// happen with well-formed data).
    pub fn to_json_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::StackCreated(d) | Self::StackUpdated(d) => serde_json::to_value(d),
            Self::StackActivated(d) | Self::StackDeactivated(d) => serde_json::to_value(d),
            Self::StackDeleted(d)
            | Self::TaskDeleted(d)
            | Self::ReminderDeleted(d)
            | Self::ArcDeleted(d)
            | Self::AttachmentRemoved(d) => serde_json::to_value(d),
            Self::TaskCreated(d) | Self::TaskUpdated(d) => serde_json::to_value(d),
            Self::TaskCompleted(d) => serde_json::to_value(d),
            Self::TaskBlocked(d) => serde_json::to_value(d),
            Self::ReminderCreated(d) | Self::ReminderUpdated(d) => serde_json::to_value(d),
            Self::ReminderSnoozed(d) => serde_json::to_value(d),
            Self::ArcCreated(d) | Self::ArcUpdated(d) => serde_json::to_value(d),
            Self::AttachmentAdded(d) => serde_json::to_value(d),
        }
    }
}
