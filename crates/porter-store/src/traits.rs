use porter_types::{Entity, EntityKind, NaturalKey, Project, Record, StableKey};

use crate::error::{StoreError, StoreResult};

/// Outcome of [`Transaction::create_or_fetch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fetched {
    pub key: StableKey,
    /// `true` when the row was created by this call.
    pub created: bool,
}

/// Read access to stored records.
///
/// Implemented by stores (committed state) and by transactions (staged
/// state, including their own uncommitted writes).
pub trait EntityReader {
    /// Read one record. Returns `Ok(None)` if it does not exist.
    fn get(&self, kind: EntityKind, key: StableKey) -> StoreResult<Option<Entity>>;

    /// All records of a kind, in key order.
    fn scan(&self, kind: EntityKind) -> StoreResult<Vec<Entity>>;

    /// Key of the record holding `natural_key`, if any.
    fn find_by_natural_key(&self, natural_key: &NaturalKey) -> StoreResult<Option<StableKey>>;

    /// The project with exactly this name.
    fn find_project(&self, name: &str) -> StoreResult<Option<Project>>;

    /// Keys of the `kind` records linked to a project.
    fn linked(&self, project: StableKey, kind: EntityKind) -> StoreResult<Vec<StableKey>>;

    /// Number of records of a kind.
    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        Ok(self.scan(kind)?.len())
    }
}

/// An atomic unit of work.
///
/// Writes are visible through the transaction's own [`EntityReader`] methods
/// immediately and to everybody else only after [`commit`](Self::commit).
/// Dropping a transaction without committing discards every write.
pub trait Transaction: EntityReader {
    /// Store a new record under a freshly assigned key and return that key.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when a record with the same
    /// natural key exists, and with [`StoreError::DanglingReference`] when a
    /// reference does not resolve.
    fn insert(&mut self, entity: Entity) -> StoreResult<StableKey>;

    /// Replace an existing record, keyed by its own stable key.
    fn update(&mut self, entity: Entity) -> StoreResult<()>;

    /// Return the record with the same natural key, or insert this one.
    /// The check and the insert are one step.
    fn create_or_fetch(&mut self, entity: Entity) -> StoreResult<Fetched>;

    /// Attach a shared record to a project. Idempotent.
    fn link(&mut self, project: StableKey, kind: EntityKind, key: StableKey) -> StoreResult<()>;

    /// Remove a record and its links. Returns `true` if it existed.
    fn delete(&mut self, kind: EntityKind, key: StableKey) -> StoreResult<bool>;

    /// Make every write visible.
    fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// A store of entity records that supports atomic units of work.
pub trait EntityStore: EntityReader + Send + Sync {
    /// Open a unit of work. Holds the store's write lock until committed or
    /// dropped.
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>>;
}

/// Typed read helpers over any [`EntityReader`].
pub trait ReaderExt: EntityReader {
    /// Read one record as its concrete type.
    fn get_record<R: Record>(&self, key: StableKey) -> StoreResult<Option<R>> {
        match self.get(R::KIND, key)? {
            Some(entity) => R::try_from(entity)
                .map(Some)
                .map_err(|e| StoreError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Read one record, failing with [`StoreError::NotFound`] if it is missing.
    fn require(&self, kind: EntityKind, key: StableKey) -> StoreResult<Entity> {
        self.get(kind, key)?
            .ok_or(StoreError::NotFound { kind, key })
    }

    /// All records of a type.
    fn scan_records<R: Record>(&self) -> StoreResult<Vec<R>> {
        self.scan(R::KIND)?
            .into_iter()
            .map(|e| R::try_from(e).map_err(|e| StoreError::Serialization(e.to_string())))
            .collect()
    }
}

impl<T: EntityReader + ?Sized> ReaderExt for T {}
