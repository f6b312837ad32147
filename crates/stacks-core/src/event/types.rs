//! Event type enum covering the full event catalog.
//!
//! The string representation uses the `<entity>.<verb>` dotted format
//! stored in the event log. Unknown strings are rejected explicitly; there
//! is no best-effort parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::EntityKind;

/// The 19 event types in the stacks event catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Create a stack (full snapshot payload).
    StackCreated,
    /// Overwrite a stack's scalar fields (full snapshot payload).
    StackUpdated,
    /// Mark a stack as the one currently worked in. Touches only `is_active`.
    StackActivated,
    /// Clear a stack's active flag. Touches only `is_active`.
    StackDeactivated,
    /// Tombstone a stack.
    StackDeleted,
    /// Create a task.
    TaskCreated,
    /// Overwrite a task's scalar fields.
    TaskUpdated,
    /// Transition a task to completed.
    TaskCompleted,
    /// Transition a task to blocked.
    TaskBlocked,
    /// Tombstone a task.
    TaskDeleted,
    /// Create a reminder.
    ReminderCreated,
    /// Overwrite a reminder's scalar fields.
    ReminderUpdated,
    /// Push a reminder's fire time forward.
    ReminderSnoozed,
    /// Tombstone a reminder.
    ReminderDeleted,
    /// Create an arc.
    ArcCreated,
    /// Overwrite an arc's scalar fields.
    ArcUpdated,
    /// Tombstone an arc.
    ArcDeleted,
    /// Attach a file to a stack or task.
    AttachmentAdded,
    /// Tombstone an attachment.
    AttachmentRemoved,
}

/// Error returned when parsing an unknown event type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event type '{}': expected one of the <entity>.<verb> catalog types \
             (stack.created, stack.activated, task.completed, …)",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventType {}

impl EventType {
    /// All known event types in catalog order.
    pub const ALL: [Self; 19] = [
        Self::StackCreated,
        Self::StackUpdated,
        Self::StackActivated,
        Self::StackDeactivated,
        Self::StackDeleted,
        Self::TaskCreated,
        Self::TaskUpdated,
        Self::TaskCompleted,
        Self::TaskBlocked,
        Self::TaskDeleted,
        Self::ReminderCreated,
        Self::ReminderUpdated,
        Self::ReminderSnoozed,
        Self::ReminderDeleted,
        Self::ArcCreated,
        Self::ArcUpdated,
        Self::ArcDeleted,
        Self::AttachmentAdded,
        Self::AttachmentRemoved,
    ];

    /// Return the canonical `<entity>.<verb>` string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StackCreated => "stack.created",
            Self::StackUpdated => "stack.updated",
            Self::StackActivated => "stack.activated",
            Self::StackDeactivated => "stack.deactivated",
            Self::StackDeleted => "stack.deleted",
            Self::TaskCreated => "task.created",
            Self::TaskUpdated => "task.updated",
            Self::TaskCompleted => "task.completed",
            Self::TaskBlocked => "task.blocked",
            Self::TaskDeleted => "task.deleted",
            Self::ReminderCreated => "reminder.created",
            Self::ReminderUpdated => "reminder.updated",
            Self::ReminderSnoozed => "reminder.snoozed",
            Self::ReminderDeleted => "reminder.deleted",
            Self::ArcCreated => "arc.created",
            Self::ArcUpdated => "arc.updated",
            Self::ArcDeleted => "arc.deleted",
            Self::AttachmentAdded => "attachment.added",
            Self::AttachmentRemoved => "attachment.removed",
        }
    }

    /// The aggregate table this event type targets.
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::StackCreated
            | Self::StackUpdated
            | Self::StackActivated
            | Self::StackDeactivated
            | Self::StackDeleted => EntityKind::Stack,
            Self::TaskCreated
            | Self::TaskUpdated
            | Self::TaskCompleted
            | Self::TaskBlocked
            | Self::TaskDeleted => EntityKind::Task,
            Self::ReminderCreated
            | Self::ReminderUpdated
            | Self::ReminderSnoozed
            | Self::ReminderDeleted => EntityKind::Reminder,
            Self::ArcCreated | Self::ArcUpdated | Self::ArcDeleted => EntityKind::Arc,
            Self::AttachmentAdded | Self::AttachmentRemoved => EntityKind::Attachment,
        }
    }

    /// True for `*.created` / `attachment.added` events, whose payload is
    /// required to reconstruct the entity during replay.
    #[must_use]
    pub const fn is_creation(self) -> bool {
        matches!(
            self,
            Self::StackCreated
                | Self::TaskCreated
                | Self::ReminderCreated
                | Self::ArcCreated
                | Self::AttachmentAdded
        )
    }

    /// True when applying this event can change a stack's `is_active`
    /// flag, which obliges a single-active reconcile pass.
    #[must_use]
    pub const fn affects_activation(self) -> bool {
        matches!(
            self,
            Self::StackCreated | Self::StackUpdated | Self::StackActivated | Self::StackDeactivated
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|et| et.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownEventType { raw: s.to_string() })
    }
}

// Custom serde: serialize as the `<entity>.<verb>` string.
impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
