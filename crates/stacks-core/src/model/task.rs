//! Task aggregate: a single actionable item inside a stack.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::EntityId;
use super::sync::SyncMeta;
use super::{ParseEnumError, normalize};

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "blocked" => Ok(Self::Blocked),
            _ => Err(ParseEnumError {
                expected: "task status",
                got: s.to_string(),
            }),
        }
    }
}

/// A task row in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: EntityId,
    pub stack_id: EntityId,
    pub title: String,
    pub note: Option<String>,
    pub status: TaskStatus,
    pub completed_at_us: Option<i64>,
    pub position: i64,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    #[serde(flatten)]
    pub sync: SyncMeta,
}
