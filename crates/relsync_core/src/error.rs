//! Error types for the relationship layer.

use crate::types::RelationKey;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in relationship storage and service operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// No relationship exists for the key.
    #[error("relationship not found: {key}")]
    NotFound {
        /// The key that was looked up.
        key: RelationKey,
    },

    /// A relationship with this key already exists.
    #[error("relationship already exists: {key}")]
    AlreadyExists {
        /// The conflicting key.
        key: RelationKey,
    },

    /// The write was based on a stale version of the record.
    #[error("version conflict on {key}: stored={expected}, written={actual}")]
    VersionConflict {
        /// The key of the record.
        key: RelationKey,
        /// Version currently stored.
        expected: u64,
        /// Version carried by the rejected write.
        actual: u64,
    },

    /// The relationship is structurally invalid.
    #[error("invalid relationship: {0}")]
    InvalidRelationship(String),
}

impl CoreError {
    /// Returns true if the error only means the write lost a race and can be
    /// repeated against a fresh read.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, CoreError::VersionConflict { .. })
    }
}
