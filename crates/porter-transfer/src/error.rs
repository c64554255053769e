use porter_graph::GraphError;
use porter_store::StoreError;
use porter_types::{EntityKind, NaturalKey, StableKey};

/// Errors produced by export and import.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("project not found: '{0}'")]
    ProjectNotFound(String),

    #[error("user not found: '{0}'")]
    UserNotFound(String),

    #[error("malformed document at {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    #[error("unsupported export version '{found}' (supported: {})", supported.join(", "))]
    VersionMismatch { found: String, supported: Vec<String> },

    #[error("cannot export {kind} #{key}: {field} {reason}")]
    Serialization {
        kind: EntityKind,
        key: StableKey,
        field: String,
        reason: String,
    },

    #[error("conflicting records for {natural_key}")]
    DuplicateConflict { natural_key: NaturalKey },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Document path of one record, e.g. `detections[id=7]`.
pub(crate) fn record_path(kind: EntityKind, key: StableKey) -> String {
    if kind == EntityKind::Project {
        return "project".to_string();
    }
    format!("{}[id={key}]", kind.collection())
}

/// Result alias for transfer operations.
pub type TransferResult<T> = Result<T, TransferError>;
