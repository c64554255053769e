//! Persistence layer for Porter.
//!
//! Export reads a project graph through [`EntityReader`]; import writes a
//! new one through a [`Transaction`] obtained from [`EntityStore::begin`].
//! Shared records are deduplicated by the store's unique natural-key index,
//! which [`Transaction::create_or_fetch`] consults and updates in one step.
//!
//! # Backends
//!
//! - [`InMemoryEntityStore`] -- `RwLock`-guarded tables, optionally loaded
//!   from and saved to a JSON snapshot file
//!
//! # Design Rules
//!
//! 1. A transaction holds the write lock for its whole lifetime.
//! 2. Dropping a transaction without committing discards all of its writes.
//! 3. Every stored reference resolves to a stored row.
//! 4. At most one row per natural key.
//! 5. Lock poisoning and I/O failures are propagated, never ignored.

pub mod error;
pub mod identity;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use identity::{IdentityProvider, StaticIdentities};
pub use memory::InMemoryEntityStore;
pub use traits::{EntityReader, EntityStore, Fetched, ReaderExt, Transaction};
