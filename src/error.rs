//! Error types for parley.

use std::io;
use thiserror::Error;

/// Result type alias for parley operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in parley operations.
///
/// Lookups against the store signal a missing conversation with `Ok(None)`
/// rather than [`Error::NotFound`], so a record deleted by someone else is a
/// normal outcome. `NotFound` is for callers that need a hard failure.
#[derive(Debug, Error)]
pub enum Error {
    /// The persistence layer failed (disk full, permissions, device gone).
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Conversation or message not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network or parse failure while receiving a reply.
    #[error("Stream failure: {0}")]
    StreamFailure(String),

    /// A conversation status name that is not recognized.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// Composer action requested while its precondition is unmet.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The store was closed and no longer accepts operations.
    #[error("Conversation store is closed")]
    StoreClosed,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error means persistence is degraded and the user
    /// should be told.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::Serde(_))
    }
}
