//! Error types for the DevDuo console core

use thiserror::Error;

use crate::record::Collection;

/// Result type alias for console operations
pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Errors raised by the store and identity collaborators.
///
/// None of these are fatal: controllers log them and keep their previous
/// snapshot.
#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("fetch from {collection} failed: {reason}")]
    TransientFetch {
        collection: Collection,
        reason: String,
    },

    #[error("record store error: {0}")]
    Store(#[from] sled::Error),

    #[error("record decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("identity collaborator unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ConsoleError {
    pub fn transient(collection: Collection, reason: impl Into<String>) -> Self {
        ConsoleError::TransientFetch {
            collection,
            reason: reason.into(),
        }
    }
}
