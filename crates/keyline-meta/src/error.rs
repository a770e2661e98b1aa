//! Error types for record operations.

use thiserror::Error;

/// Errors that can occur while building or mutating a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetaError {
    /// Blocks were appended to a key that has no version yet.
    #[error("appending new blocks to {key}, but no version exists")]
    NoVersionExists { key: String },

    /// A version-specific edit named a version other than the group's own.
    #[error("version {requested} does not match location group version {group}")]
    VersionMismatch { group: u64, requested: u64 },

    /// A record failed required-field validation.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// Applying a usage delta would exceed the bucket quota.
    #[error("quota exceeded on {bucket}: {kind} used {used} + {requested} > quota {quota}")]
    QuotaExceeded {
        bucket: String,
        kind: &'static str,
        used: i64,
        requested: i64,
        quota: i64,
    },

    /// A generation update would move the record backwards.
    #[error("generation regression: current {current}, requested {requested}")]
    GenerationRegression { current: u64, requested: u64 },
}

impl MetaError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        MetaError::MalformedRecord {
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for record operations.
pub type Result<T> = std::result::Result<T, MetaError>;
