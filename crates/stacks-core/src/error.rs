use std::fmt;

/// Machine-readable error codes for client-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    StoreOpenFailed,
    ConfigParseError,
    EntityNotFound,
    ValidationFailed,
    PayloadTypeMismatch,
    UnknownEventType,
    PayloadDecodeFailed,
    CreationPayloadLost,
    EventAppendFailed,
    LockContention,
    ConflictUnresolved,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::StoreOpenFailed => "E1001",
            Self::ConfigParseError => "E1002",
            Self::EntityNotFound => "E2001",
            Self::ValidationFailed => "E2002",
            Self::PayloadTypeMismatch => "E2003",
            Self::UnknownEventType => "E2004",
            Self::PayloadDecodeFailed => "E3001",
            Self::CreationPayloadLost => "E3002",
            Self::EventAppendFailed => "E5001",
            Self::LockContention => "E5002",
            Self::ConflictUnresolved => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and diagnostics.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::StoreOpenFailed => "Store could not be opened",
            Self::ConfigParseError => "Config file parse error",
            Self::EntityNotFound => "Entity not found",
            Self::ValidationFailed => "Input validation failed",
            Self::PayloadTypeMismatch => "Payload does not match event type",
            Self::UnknownEventType => "Unknown event type",
            Self::PayloadDecodeFailed => "Event payload decode failed",
            Self::CreationPayloadLost => "Creation payload unrecoverable",
            Self::EventAppendFailed => "Event append failed",
            Self::LockContention => "Write lock contention",
            Self::ConflictUnresolved => "Sync conflict awaiting resolution",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::StoreOpenFailed => Some("Check the store path and file permissions."),
            Self::ConfigParseError => Some("Fix syntax in stacks.toml and retry."),
            Self::EntityNotFound => None,
            Self::ValidationFailed => Some("Correct the rejected input; nothing was recorded."),
            Self::PayloadTypeMismatch => {
                Some("Construct the payload with the matching event type.")
            }
            Self::UnknownEventType => Some("Upgrade: this log was written by a newer app."),
            Self::PayloadDecodeFailed => {
                Some("The event is corrupt; other events still replay.")
            }
            Self::CreationPayloadLost => {
                Some("The entity cannot be rehydrated without its creation payload.")
            }
            Self::EventAppendFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other writer releases its lock."),
            Self::ConflictUnresolved => {
                Some("Resolve the open sync conflict before pushing this entity.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 12] = [
        ErrorCode::StoreOpenFailed,
        ErrorCode::ConfigParseError,
        ErrorCode::EntityNotFound,
        ErrorCode::ValidationFailed,
        ErrorCode::PayloadTypeMismatch,
        ErrorCode::UnknownEventType,
        ErrorCode::PayloadDecodeFailed,
        ErrorCode::CreationPayloadLost,
        ErrorCode::EventAppendFailed,
        ErrorCode::LockContention,
        ErrorCode::ConflictUnresolved,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let rendered = code.code();
            assert_eq!(rendered.len(), 5);
            assert!(rendered.starts_with('E'));
            assert!(rendered.chars().skip(1).all(|c| c.is_ascii_digit()));
            assert!(!code.message().is_empty());
        }
    }
}
