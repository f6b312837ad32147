//! Reminder aggregate: a scheduled nudge attached to a task.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::EntityId;
use super::sync::SyncMeta;
use super::{ParseEnumError, normalize};

/// Delivery status of a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    Scheduled,
    Snoozed,
    Delivered,
    Cancelled,
}

impl ReminderStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Snoozed => "snoozed",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for ReminderStatus {
    fn default() -> Self {
        Self::Scheduled
    }
}

impl fmt::Display for ReminderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "snoozed" => Ok(Self::Snoozed),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseEnumError {
                expected: "reminder status",
                got: s.to_string(),
            }),
        }
    }
}

/// A reminder row in the entity store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: EntityId,
    pub task_id: EntityId,
    pub remind_at_us: i64,
    pub snoozed_until_us: Option<i64>,
    pub status: ReminderStatus,
    pub created_at_us: i64,
    pub updated_at_us: i64,
    #[serde(flatten)]
    pub sync: SyncMeta,
}

#[cfg(test)]
mod tests {
    use super::ReminderStatus;
    use std::str::FromStr;

    #[test]
    fn status_roundtrips() {
        for value in [
            ReminderStatus::Scheduled,
            ReminderStatus::Snoozed,
            ReminderStatus::Delivered,
            ReminderStatus::Cancelled,
        ] {
            assert_eq!(
                ReminderStatus::from_str(&value.to_string()).expect("parse"),
                value
            );
        }
    }
}
