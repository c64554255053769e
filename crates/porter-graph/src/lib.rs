//! Entity dependency graph for Porter.
//!
//! Export and import both walk a project's records kind by kind. The order
//! comes from a hand-declared table of which kinds reference which, sorted
//! topologically here. The same table decides which kinds drop out when an
//! import skips part of a document, and the integrity check verifies that a
//! document carries every record its references point at.

pub mod error;
pub mod integrity;
pub mod order;

pub use error::{GraphError, GraphResult};
pub use integrity::{check_document, check_entities, DanglingRef, IntegrityReport};
pub use order::{dependencies, processing_order, Dependency, DependencyGraph};
