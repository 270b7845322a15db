use thiserror::Error;

use crate::types::LockKey;

/// Errors a store adapter reports for a single call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("item not found")]
    NotFound,
    /// The conditional check failed: the stored version (or presence) did not
    /// match what the caller expected.
    #[error("record version mismatch")]
    VersionMismatch,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Contention outlasted the wait budget, or no waiting was requested.
    #[error("lock '{key}' not granted: {reason}")]
    LockNotGranted { key: LockKey, reason: String },

    /// The lock was taken over by another process, or could not be renewed
    /// for a full lease. The handle is dead; acquire again.
    #[error("lock '{key}' was lost")]
    LockLost { key: LockKey },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => LockError::StoreUnavailable(msg),
            // Conditional failures are translated by the engines before they
            // get here; anything left over is an unexpected store answer.
            other => LockError::StoreUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
