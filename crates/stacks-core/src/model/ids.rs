//! Identifier newtypes for entities and events.
//!
//! Both are UUIDv7 strings: globally unique and time-sortable, so the event
//! id doubles as the tie-breaker when two events share a wall-clock
//! timestamp.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when parsing an identifier from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidId {
    pub raw: String,
}

impl fmt::Display for InvalidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid identifier '{}': expected a UUID", self.raw)
    }
}

impl std::error::Error for InvalidId {}

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh time-sortable (UUIDv7) identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            /// Wrap a string without validating it. Intended for values that
            /// were already validated, e.g. read back from the store.
            #[must_use]
            pub fn new_unchecked(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                Uuid::parse_str(trimmed).map_err(|_| InvalidId {
                    raw: s.to_string(),
                })?;
                Ok(Self(trimmed.to_string()))
            }
        }
    };
}

uuid_id!(EntityId, "Identifier of an aggregate instance (stack, task, …).");
uuid_id!(EventId, "Identifier of a single event in the append-only log.");
