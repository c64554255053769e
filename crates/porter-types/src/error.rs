use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("invalid stable key: {0}")]
    InvalidKey(String),

    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("record kind mismatch: expected {expected}, got {actual}")]
    KindMismatch { expected: String, actual: String },
}
