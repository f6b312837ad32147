//! Arc aggregate: a long-running theme that groups stacks.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::EntityId;
use super::sync::SyncMeta;
use super::{ParseEnumError, normalize};

/// Lifecycle status of an arc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArcStatus {
    Active,
    Completed,
    Abandoned,
}

impl ArcStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl Default for ArcStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for ArcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArcStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(ParseEnumError {
                expected: "arc status",
                got: s.to_string(),
            }),
        }
    }
}

/// An arc row in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Arc {
    pub id: EntityId,
    pub title: String,
    pub note: Option<String>,
    pub status: ArcStatus,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    #[serde(flatten)]
    pub sync: SyncMeta,
}
