use std::path::PathBuf;

use porter_types::{EntityKind, NaturalKey, StableKey};

/// Errors from entity store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("{kind} #{key} not found")]
    NotFound { kind: EntityKind, key: StableKey },

    /// A record with the same natural key already exists.
    #[error("unique constraint violated: {natural_key} already stored as #{existing}")]
    UniqueViolation {
        natural_key: NaturalKey,
        existing: StableKey,
    },

    /// A reference points at a row that does not exist.
    #[error("{kind} #{key}: {field} references missing {target} #{target_key}")]
    DanglingReference {
        kind: EntityKind,
        key: StableKey,
        field: &'static str,
        target: EntityKind,
        target_key: StableKey,
    },

    /// `create_or_fetch` was called for a kind without a natural key.
    #[error("{0} records have no natural key")]
    NoNaturalKey(EntityKind),

    /// A membership link was requested for a kind that is not linkable.
    #[error("{0} records cannot be linked to projects")]
    NotLinkable(EntityKind),

    /// A user with this email is already registered.
    #[error("user already exists: {0}")]
    DuplicateUser(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The snapshot file exists but cannot be loaded.
    #[error("corrupt snapshot {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// I/O error from the snapshot file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A writer panicked while holding the store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
