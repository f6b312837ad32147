//! Per-row sync metadata shared by every aggregate.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

/// Where a row stands relative to the remote service.
///
/// `Synced` means the in-memory state equals the last-received or
/// last-pushed remote state. `Pending` means an un-pushed local edit
/// exists. `Conflict` means a remote update arrived while a local edit was
/// pending; an open [`crate::sync::SyncConflict`] row holds both versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Pending,
    Synced,
    Conflict,
}

impl SyncState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Conflict => "conflict",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "conflict" => Ok(Self::Conflict),
            _ => Err(ParseEnumError {
                expected: "sync state",
                got: s.to_string(),
            }),
        }
    }
}

/// The aggregate table a row (or conflict) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Stack,
    Task,
    Reminder,
    Arc,
    Attachment,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::Task => "task",
            Self::Reminder => "reminder",
            Self::Arc => "arc",
            Self::Attachment => "attachment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "stack" => Ok(Self::Stack),
            "task" => Ok(Self::Task),
            "reminder" => Ok(Self::Reminder),
            "arc" => Ok(Self::Arc),
            "attachment" => Ok(Self::Attachment),
            _ => Err(ParseEnumError {
                expected: "entity kind",
                got: s.to_string(),
            }),
        }
    }
}

/// Sync metadata common to every aggregate row.
///
/// `revision` strictly increases on every local or remote-accepted
/// mutation. `is_deleted` is a tombstone; rows are never physically
/// removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncMeta {
    pub server_id: Option<String>,
    pub sync_state: SyncState,
    pub revision: i64,
    pub last_synced_at_us: Option<i64>,
    pub is_deleted: bool,
    pub user_id: String,
    pub device_id: String,
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self {
            server_id: None,
            sync_state: SyncState::Pending,
            revision: 0,
            last_synced_at_us: None,
            is_deleted: false,
            user_id: String::new(),
            device_id: String::new(),
        }
    }
}
