//! Error types for the dependency graph.

use porter_types::{EntityKind, StableKey};

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    /// The dependency table contains a cycle through these kinds.
    #[error("dependency cycle among: {}", kinds_list(.0))]
    CycleDetected(Vec<EntityKind>),

    /// A reference points at a record that is not present.
    #[error("{kind}[id={key}].{field} references missing {target} #{target_key}")]
    DanglingReference {
        kind: EntityKind,
        key: StableKey,
        field: &'static str,
        target: EntityKind,
        target_key: StableKey,
    },

    /// Two records of one kind share a stable key.
    #[error("duplicate {kind} key #{key}")]
    DuplicateKey { kind: EntityKind, key: StableKey },
}

fn kinds_list(kinds: &[EntityKind]) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
