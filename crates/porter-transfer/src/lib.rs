//! Project export and import for Porter.
//!
//! This crate moves one project's record graph between databases:
//! - [`export_project`] walks a project's owned records plus the shared
//!   records they reference into a versioned [`Document`](porter_types::Document)
//! - [`codec`] reads and writes documents as JSON
//! - [`import_document`] rebuilds the graph in a store as a new project,
//!   remapping every reference and reusing shared records by natural key
//! - [`demo`] seeds a synthetic project for trying the round trip
//!
//! # Invariants
//!
//! 1. Exported documents are closed: every reference resolves inside the
//!    document.
//! 2. Owner fields and credentials never appear in a document.
//! 3. An import writes everything or nothing.
//! 4. Stable keys from a document are never reused as store keys.

pub mod codec;
pub mod dedup;
pub mod demo;
pub mod error;
pub mod export;
pub mod import;
pub mod naming;
pub mod remap;

pub use codec::{decode, encode, read_document, write_document};
pub use dedup::{DuplicateIndex, DuplicatePolicy, Resolution};
pub use demo::{create_demo_project, delete_all_data, DemoProject};
pub use error::{TransferError, TransferResult};
pub use export::{export_project, EXPORT_TOOL};
pub use import::{import_document, ImportOptions, ImportPhase, ImportReport};
pub use naming::{default_export_filename, slugify, unique_project_name};
pub use remap::{RemapTable, RemapVisitor};
