use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use porter_types::{Entity, EntityKind, NaturalKey, Project, StableKey, User};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::identity::IdentityProvider;
use crate::traits::{EntityReader, EntityStore, Fetched, Transaction};

/// A project membership link: (project, kind, key).
pub(crate) type Link = (StableKey, EntityKind, StableKey);

/// Everything the store holds. Cloned as a whole when a transaction starts.
#[derive(Clone, Debug, Default)]
pub(crate) struct StoreState {
    pub(crate) tables: BTreeMap<EntityKind, BTreeMap<StableKey, Entity>>,
    pub(crate) next_keys: BTreeMap<EntityKind, u64>,
    pub(crate) natural: BTreeMap<NaturalKey, StableKey>,
    pub(crate) links: BTreeSet<Link>,
    pub(crate) users: BTreeMap<String, User>,
}

impl StoreState {
    fn get(&self, kind: EntityKind, key: StableKey) -> Option<&Entity> {
        self.tables.get(&kind).and_then(|t| t.get(&key))
    }

    fn scan(&self, kind: EntityKind) -> Vec<Entity> {
        self.tables
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn find_project(&self, name: &str) -> Option<Project> {
        self.tables
            .get(&EntityKind::Project)?
            .values()
            .find_map(|e| match e {
                Entity::Project(p) if p.name == name => Some(p.clone()),
                _ => None,
            })
    }

    fn linked(&self, project: StableKey, kind: EntityKind) -> Vec<StableKey> {
        self.links
            .range((project, kind, StableKey::UNASSIGNED)..=(project, kind, StableKey::new(u64::MAX)))
            .map(|(_, _, key)| *key)
            .collect()
    }

    fn count(&self, kind: EntityKind) -> usize {
        self.tables.get(&kind).map_or(0, BTreeMap::len)
    }

    fn next_key(&mut self, kind: EntityKind) -> StableKey {
        let next = self.next_keys.entry(kind).or_insert(0);
        *next += 1;
        StableKey::new(*next)
    }

    /// Every reference of `entity` must point at a stored row.
    fn check_references(&self, entity: &Entity) -> StoreResult<()> {
        for slot in entity.references() {
            if self.get(slot.target, slot.key).is_none() {
                return Err(StoreError::DanglingReference {
                    kind: slot.source,
                    key: slot.source_key,
                    field: slot.field,
                    target: slot.target,
                    target_key: slot.key,
                });
            }
        }
        Ok(())
    }

    fn check_unique(&self, natural_key: &NaturalKey, owner: Option<StableKey>) -> StoreResult<()> {
        match self.natural.get(natural_key) {
            Some(existing) if Some(*existing) != owner => Err(StoreError::UniqueViolation {
                natural_key: natural_key.clone(),
                existing: *existing,
            }),
            _ => Ok(()),
        }
    }

    /// Put a row whose key is already set, maintaining the natural index.
    pub(crate) fn put(&mut self, entity: Entity) -> StoreResult<()> {
        let kind = entity.kind();
        let key = entity.key();
        if let Some(natural_key) = entity.natural_key() {
            self.check_unique(&natural_key, Some(key))?;
            self.natural.insert(natural_key, key);
        }
        let next = self.next_keys.entry(kind).or_insert(0);
        *next = (*next).max(key.get());
        self.tables.entry(kind).or_default().insert(key, entity);
        Ok(())
    }

    fn insert(&mut self, mut entity: Entity) -> StoreResult<StableKey> {
        let kind = entity.kind();
        if let Some(natural_key) = entity.natural_key() {
            self.check_unique(&natural_key, None)?;
        }
        let key = self.next_key(kind);
        entity.set_key(key);
        self.check_references(&entity)?;
        self.put(entity)?;
        debug!(%kind, %key, "inserted");
        Ok(key)
    }

    fn update(&mut self, entity: Entity) -> StoreResult<()> {
        let kind = entity.kind();
        let key = entity.key();
        let previous = self
            .get(kind, key)
            .ok_or(StoreError::NotFound { kind, key })?
            .natural_key();
        self.check_references(&entity)?;
        if let Some(natural_key) = entity.natural_key() {
            self.check_unique(&natural_key, Some(key))?;
        }
        if let Some(previous) = previous {
            self.natural.remove(&previous);
        }
        self.put(entity)
    }

    fn create_or_fetch(&mut self, entity: Entity) -> StoreResult<Fetched> {
        let kind = entity.kind();
        let natural_key = entity.natural_key().ok_or(StoreError::NoNaturalKey(kind))?;
        if let Some(existing) = self.natural.get(&natural_key) {
            return Ok(Fetched {
                key: *existing,
                created: false,
            });
        }
        let key = self.insert(entity)?;
        Ok(Fetched { key, created: true })
    }

    fn link(&mut self, project: StableKey, kind: EntityKind, key: StableKey) -> StoreResult<()> {
        if !kind.is_linked() {
            return Err(StoreError::NotLinkable(kind));
        }
        if self.get(EntityKind::Project, project).is_none() {
            return Err(StoreError::NotFound {
                kind: EntityKind::Project,
                key: project,
            });
        }
        if self.get(kind, key).is_none() {
            return Err(StoreError::NotFound { kind, key });
        }
        self.links.insert((project, kind, key));
        Ok(())
    }

    fn delete(&mut self, kind: EntityKind, key: StableKey) -> bool {
        let Some(removed) = self.tables.get_mut(&kind).and_then(|t| t.remove(&key)) else {
            return false;
        };
        if let Some(natural_key) = removed.natural_key() {
            self.natural.remove(&natural_key);
        }
        self.links
            .retain(|(p, k, t)| !(*k == kind && *t == key) && !(kind == EntityKind::Project && *p == key));
        true
    }
}

/// In-memory entity store guarded by a single `RwLock`.
///
/// A transaction takes the write lock and works on a private copy of the
/// whole state; commit swaps the copy in. Readers never observe a
/// half-applied unit of work. Persist across processes with
/// [`save`](Self::save) / [`open`](Self::open).
pub struct InMemoryEntityStore {
    state: RwLock<StoreState>,
}

impl InMemoryEntityStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
        }
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub(crate) fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    /// Total number of records across all kinds.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.tables.values().map(BTreeMap::len).sum())
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Register a user. Emails are unique.
    pub fn register_user(&self, email: &str) -> StoreResult<User> {
        let mut state = self.write()?;
        if state.users.contains_key(email) {
            return Err(StoreError::DuplicateUser(email.to_string()));
        }
        let user = User::new(email);
        state.users.insert(email.to_string(), user.clone());
        debug!(email, id = %user.id, "registered user");
        Ok(user)
    }

    /// All registered users, ordered by email.
    pub fn users(&self) -> StoreResult<Vec<User>> {
        Ok(self.read()?.users.values().cloned().collect())
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityReader for InMemoryEntityStore {
    fn get(&self, kind: EntityKind, key: StableKey) -> StoreResult<Option<Entity>> {
        Ok(self.read()?.get(kind, key).cloned())
    }

    fn scan(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        Ok(self.read()?.scan(kind))
    }

    fn find_by_natural_key(&self, natural_key: &NaturalKey) -> StoreResult<Option<StableKey>> {
        Ok(self.read()?.natural.get(natural_key).copied())
    }

    fn find_project(&self, name: &str) -> StoreResult<Option<Project>> {
        Ok(self.read()?.find_project(name))
    }

    fn linked(&self, project: StableKey, kind: EntityKind) -> StoreResult<Vec<StableKey>> {
        Ok(self.read()?.linked(project, kind))
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        Ok(self.read()?.count(kind))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn begin(&self) -> StoreResult<Box<dyn Transaction + '_>> {
        let guard = self.write()?;
        let staged = guard.clone();
        debug!("transaction started");
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            committed: false,
        }))
    }
}

impl IdentityProvider for InMemoryEntityStore {
    fn resolve(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(email).cloned())
    }
}

impl fmt::Debug for InMemoryEntityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.len().unwrap_or(0);
        f.debug_struct("InMemoryEntityStore")
            .field("record_count", &count)
            .finish()
    }
}

/// Unit of work over an [`InMemoryEntityStore`].
struct MemoryTransaction<'a> {
    guard: RwLockWriteGuard<'a, StoreState>,
    staged: StoreState,
    committed: bool,
}

impl EntityReader for MemoryTransaction<'_> {
    fn get(&self, kind: EntityKind, key: StableKey) -> StoreResult<Option<Entity>> {
        Ok(self.staged.get(kind, key).cloned())
    }

    fn scan(&self, kind: EntityKind) -> StoreResult<Vec<Entity>> {
        Ok(self.staged.scan(kind))
    }

    fn find_by_natural_key(&self, natural_key: &NaturalKey) -> StoreResult<Option<StableKey>> {
        Ok(self.staged.natural.get(natural_key).copied())
    }

    fn find_project(&self, name: &str) -> StoreResult<Option<Project>> {
        Ok(self.staged.find_project(name))
    }

    fn linked(&self, project: StableKey, kind: EntityKind) -> StoreResult<Vec<StableKey>> {
        Ok(self.staged.linked(project, kind))
    }

    fn count(&self, kind: EntityKind) -> StoreResult<usize> {
        Ok(self.staged.count(kind))
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn insert(&mut self, entity: Entity) -> StoreResult<StableKey> {
        self.staged.insert(entity)
    }

    fn update(&mut self, entity: Entity) -> StoreResult<()> {
        self.staged.update(entity)
    }

    fn create_or_fetch(&mut self, entity: Entity) -> StoreResult<Fetched> {
        self.staged.create_or_fetch(entity)
    }

    fn link(&mut self, project: StableKey, kind: EntityKind, key: StableKey) -> StoreResult<()> {
        self.staged.link(project, kind, key)
    }

    fn delete(&mut self, kind: EntityKind, key: StableKey) -> StoreResult<bool> {
        Ok(self.staged.delete(kind, key))
    }

    fn commit(mut self: Box<Self>) -> StoreResult<()> {
        *self.guard = std::mem::take(&mut self.staged);
        self.committed = true;
        debug!("transaction committed");
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("transaction rolled back");
        }
    }
}
