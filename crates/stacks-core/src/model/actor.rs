//! Actor provenance carried on every event.
//!
//! `ActorType` is a closed enumeration so downstream consumers (history UI,
//! analytics) can filter deterministically; it is never optional.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, normalize};

/// Who (or what) produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Human,
    Ai,
    System,
}

impl ActorType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Ai => "ai",
            Self::System => "system",
        }
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "human" => Ok(Self::Human),
            "ai" => Ok(Self::Ai),
            "system" => Ok(Self::System),
            _ => Err(ParseEnumError {
                expected: "actor type",
                got: s.to_string(),
            }),
        }
    }
}

/// Full provenance for one event: the actor plus the device and app that
/// recorded it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub actor_type: ActorType,
    pub actor_id: String,
    pub device_id: String,
    pub app_id: String,
}

impl Actor {
    /// Convenience constructor for a human actor.
    #[must_use]
    pub fn human(actor_id: &str, device_id: &str, app_id: &str) -> Self {
        Self {
            actor_type: ActorType::Human,
            actor_id: actor_id.to_string(),
            device_id: device_id.to_string(),
            app_id: app_id.to_string(),
        }
    }

    /// Convenience constructor for an AI actor.
    #[must_use]
    pub fn ai(actor_id: &str, device_id: &str, app_id: &str) -> Self {
        Self {
            actor_type: ActorType::Ai,
            actor_id: actor_id.to_string(),
            device_id: device_id.to_string(),
            app_id: app_id.to_string(),
        }
    }

    /// Convenience constructor for a system actor (timers, migrations).
    #[must_use]
    pub fn system(actor_id: &str, device_id: &str, app_id: &str) -> Self {
        Self {
            actor_type: ActorType::System,
            actor_id: actor_id.to_string(),
            device_id: device_id.to_string(),
            app_id: app_id.to_string(),
        }
    }
}
