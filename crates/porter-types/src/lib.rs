//! Foundation types for Porter.
//!
//! Porter moves a project's entity graph between databases: it serializes
//! every record a project owns into a self-contained [`Document`] and later
//! rebuilds an equivalent graph with fresh keys. This crate holds the schema
//! both directions share. Every other Porter crate depends on `porter-types`.
//!
//! # Key Types
//!
//! - [`StableKey`] -- identifier a record held in its source database
//! - [`EntityKind`] -- closed set of record kinds
//! - [`Ref`] -- typed reference to another record's stable key
//! - [`Record`] -- trait implemented by one statically declared struct per kind
//! - [`Entity`] -- tagged variant over all record types
//! - [`NaturalKey`] -- content-derived identity of shared records
//! - [`Document`] -- the versioned export container
//! - [`UserId`] / [`User`] -- owner identities (never exported)

pub mod counts;
pub mod document;
pub mod entity;
pub mod error;
pub mod identity;
pub mod key;
pub mod kind;
pub mod natural;
pub mod records;
pub mod reference;

pub use counts::KindCounts;
pub use document::{Document, EXPORT_VERSION, SUPPORTED_VERSIONS};
pub use entity::Entity;
pub use error::TypeError;
pub use identity::{User, UserId};
pub use key::StableKey;
pub use kind::EntityKind;
pub use natural::{content_hash, NaturalKey};
pub use records::{
    Algorithm, CategoryMap, Classification, Collection, Deployment, Detection, Device, Event,
    Identification, Occurrence, Pipeline, PipelineConfig, ProcessingService, Project, Record,
    Site, SourceImage, StorageSource, Tag, TaxaList, Taxon,
};
pub use reference::{Ref, RefVisitor, RefWalker, Slot, SlotCollector};
