//! Error types for the synchronization engine.

use relsync_core::{CoreError, RelationKey};
use thiserror::Error;

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while fetching identifiers or publishing descriptors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote system could not be reached or did not answer in time.
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// The remote system answered with a refusal or a malformed response.
    #[error("remote rejected: {0}")]
    RemoteRejected(String),

    /// The relationship disappeared between scheduling and execution.
    #[error("relationship not found: {key}")]
    NotFound {
        /// The missing relationship.
        key: RelationKey,
    },

    /// The identifier was still absent after waiting for a fetch.
    #[error("partner identifier still missing for {key}: {cause}")]
    MissingIdentifier {
        /// The relationship lacking an identifier.
        key: RelationKey,
        /// Why the fetch waited on did not provide it.
        cause: String,
    },

    /// All attempts failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Message of the last failure.
        last_error: String,
    },

    /// The fetch task ended without reporting an outcome.
    #[error("identifier fetch for {key} ended without a result")]
    FetchAborted {
        /// The relationship whose fetch was lost.
        key: RelationKey,
    },

    /// The worker pool no longer hands out permits.
    #[error("worker pool closed")]
    PoolClosed,

    /// Store error other than a missing record.
    #[error("store error: {0}")]
    Store(CoreError),
}

impl SyncError {
    /// Returns true if the failed step should be attempted again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RemoteUnavailable(_)
            | SyncError::RemoteRejected(_)
            | SyncError::MissingIdentifier { .. } => true,
            SyncError::Store(e) => e.is_version_conflict(),
            _ => false,
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::NotFound { key } => SyncError::NotFound { key },
            other => SyncError::Store(other),
        }
    }
}
