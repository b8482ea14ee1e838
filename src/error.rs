//! Error types

use std::fmt;

use thiserror::Error;

use crate::ascii::HexBytes;

pub type Result<T, E = Error> = core::result::Result<T, E>;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Error
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Error, Debug)]
pub enum Error {
    /// A message definition breaks a structural rule.
    #[error("invalid definition for message '{message}': {reason}")]
    InvalidDefinition {
        message: String,
        reason:  DefinitionError,
    },

    /// Lookup by name found nothing in the catalog.
    #[error("message '{0}' not found")]
    UnknownMessage(String),

    /// Generation needed a value that has neither an override nor a default.
    #[error("missing parameter '{fragment}' for message '{message}'")]
    MissingParameter { message: String, fragment: String },

    /// No matching message arrived before the deadline.
    #[error("{0}")]
    Timeout(Box<TimeoutReport>),

    /// The pending subscription was dropped before it could settle.
    #[error("wait for message '{0}' cancelled")]
    Cancelled(String),

    #[error("transport write failed")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(message: &str, reason: DefinitionError) -> Self {
        Error::InvalidDefinition {
            message: message.to_string(),
            reason,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("scan field is not followed by a terminator")]
    ScanNotTerminated,

    #[error("more than one scan field")]
    MultipleScans,

    #[error("scan field terminator resolves to a wildcard")]
    WildcardTerminator,

    #[error("duplicate fragment name '{0}'")]
    DuplicateFragment(String),

    #[error("duplicate message name '{0}'")]
    DuplicateMessage(String),

    #[error("message has no fragments")]
    EmptyMessage,
}

// ———————————————————————————————————————— Timeout Report —————————————————————————————————————————

/// Snapshot taken when a wait times out. Primary aid for spotting protocol desync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutReport {
    pub message_type: String,
    pub timeout_ms:   u128,
    pub buffer:       Vec<u8>,
    pub history:      Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub message_type: String,
    pub bytes:        Vec<u8>,
}

impl fmt::Display for TimeoutReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "timeout after {} ms waiting for '{}', buffer: {}, history: [",
            self.timeout_ms,
            self.message_type,
            HexBytes(&self.buffer)
        )?;
        for (i, entry) in self.history.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", entry.message_type, HexBytes(&entry.bytes))?;
        }
        write!(f, "]")
    }
}
