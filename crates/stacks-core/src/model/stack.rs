//! Stack aggregate: an ordered working set of tasks.
//!
//! `is_active` and `status` are orthogonal state machines. Activation marks
//! the one stack the user is currently working in (at most one across the
//! whole store); `status` tracks workflow progress and is never touched by
//! activation events.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::EntityId;
use super::sync::SyncMeta;
use super::{ParseEnumError, normalize};

/// Workflow status of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackStatus {
    Planned,
    InProgress,
    Completed,
    Archived,
}

impl StackStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }
}

impl Default for StackStatus {
    fn default() -> Self {
        Self::Planned
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "planned" => Ok(Self::Planned),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            _ => Err(ParseEnumError {
                expected: "stack status",
                got: s.to_string(),
            }),
        }
    }
}

/// A stack row in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub id: EntityId,
    pub title: String,
    pub note: Option<String>,
    pub status: StackStatus,
    /// Whether this is the stack the user is currently working in.
    pub is_active: bool,
    /// When this stack was last set active. Survives deactivation and
    /// deletion: the single-active reconcile pass compares it across
    /// stacks to decide which activation was last (last writer wins).
    pub activated_at_us: Option<i64>,
    pub arc_id: Option<EntityId>,
    pub position: i64,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    #[serde(flatten)]
    pub sync: SyncMeta,
}
