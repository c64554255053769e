//! Duplicate resolution for shared kinds.
//!
//! Shared records (taxa, algorithms, category maps, pipelines, processing
//! services) are identified by natural key rather than stable key. Within a
//! run the first record seen for a natural key wins; across runs the store's
//! unique natural-key index returns the existing row.

use std::collections::BTreeMap;

use porter_store::Transaction;
use porter_types::{Entity, NaturalKey, StableKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{TransferError, TransferResult};

/// What to do when a document holds two records with one natural key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first record, ignore later ones.
    #[default]
    FirstSeen,
    /// Fail when a later record differs from the first.
    Strict,
}

/// Outcome of resolving one shared record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub key: StableKey,
    pub created: bool,
}

/// Natural key -> (store key, first record seen) for one import run.
#[derive(Debug)]
pub struct DuplicateIndex {
    policy: DuplicatePolicy,
    seen: BTreeMap<NaturalKey, (StableKey, Entity)>,
}

impl DuplicateIndex {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            seen: BTreeMap::new(),
        }
    }

    /// Reuse the row holding `entity`'s natural key, or create it.
    ///
    /// `entity` must already be remapped; its own key is ignored.
    pub fn resolve(&mut self, tx: &mut (dyn Transaction + '_), entity: Entity) -> TransferResult<Resolution> {
        let Some(natural_key) = entity.natural_key() else {
            return Ok(Resolution {
                key: tx.insert(entity)?,
                created: true,
            });
        };

        let mut content = entity.clone();
        content.set_key(StableKey::UNASSIGNED);

        if let Some((key, first)) = self.seen.get(&natural_key) {
            if self.policy == DuplicatePolicy::Strict && *first != content {
                return Err(TransferError::DuplicateConflict { natural_key });
            }
            debug!(%natural_key, %key, "duplicate within document, keeping first");
            return Ok(Resolution {
                key: *key,
                created: false,
            });
        }

        let fetched = tx.create_or_fetch(entity)?;
        if !fetched.created {
            debug!(%natural_key, key = %fetched.key, "reusing stored record");
        }
        self.seen.insert(natural_key, (fetched.key, content));
        Ok(Resolution {
            key: fetched.key,
            created: fetched.created,
        })
    }

    pub fn is_strict(&self) -> bool {
        self.policy == DuplicatePolicy::Strict
    }

    /// Compare records sharing a natural key once every reference, including
    /// references to their own kind, is remapped. [`resolve`](Self::resolve)
    /// only sees first-pass records, whose self references are still empty.
    pub fn check_settled<I>(&self, records: I) -> TransferResult<()>
    where
        I: IntoIterator<Item = Entity>,
    {
        if !self.is_strict() {
            return Ok(());
        }
        let mut first: BTreeMap<NaturalKey, Entity> = BTreeMap::new();
        for mut entity in records {
            let Some(natural_key) = entity.natural_key() else {
                continue;
            };
            entity.set_key(StableKey::UNASSIGNED);
            match first.get(&natural_key) {
                Some(seen) if *seen != entity => {
                    return Err(TransferError::DuplicateConflict { natural_key });
                }
                Some(_) => {}
                None => {
                    first.insert(natural_key, entity);
                }
            }
        }
        Ok(())
    }

    /// Number of distinct natural keys resolved so far.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use porter_store::{EntityReader, EntityStore, InMemoryEntityStore};
    use porter_types::{EntityKind, ProcessingService, Ref, Taxon};

    use super::*;

    fn service(id: u64, name: &str, url: &str) -> Entity {
        ProcessingService {
            id: StableKey::new(id),
            name: name.into(),
            endpoint_url: url.into(),
        }
        .into()
    }

    #[test]
    fn first_seen_keeps_first_record() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().unwrap();
        let mut index = DuplicateIndex::new(DuplicatePolicy::FirstSeen);

        let a = index.resolve(tx.as_mut(), service(1, "Local", "http://ml:2000")).unwrap();
        let b = index.resolve(tx.as_mut(), service(2, "Renamed", "http://ml:2000")).unwrap();
        tx.commit().unwrap();

        assert!(a.created);
        assert_eq!(b, Resolution { key: a.key, created: false });
        let stored = store.scan(EntityKind::ProcessingService).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].as_record::<ProcessingService>().unwrap().name, "Local");
    }

    #[test]
    fn strict_rejects_differing_duplicates() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().unwrap();
        let mut index = DuplicateIndex::new(DuplicatePolicy::Strict);

        index.resolve(tx.as_mut(), service(1, "Local", "http://ml:2000")).unwrap();
        // Same content under another document key is not a conflict.
        index.resolve(tx.as_mut(), service(5, "Local", "http://ml:2000")).unwrap();
        let err = index
            .resolve(tx.as_mut(), service(2, "Renamed", "http://ml:2000"))
            .unwrap_err();
        assert!(matches!(err, TransferError::DuplicateConflict { .. }));
    }

    #[test]
    fn rows_from_earlier_runs_are_reused() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().unwrap();
        let existing = tx.insert(Taxon::new("Apis mellifera", "species").into()).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        let mut index = DuplicateIndex::new(DuplicatePolicy::Strict);
        let mut incoming = Taxon::new("Apis mellifera", "species");
        incoming.id = StableKey::new(77);
        let resolution = index.resolve(tx.as_mut(), incoming.into()).unwrap();
        assert_eq!(resolution, Resolution { key: existing, created: false });
        assert_eq!(index.len(), 1);
    }

    fn taxon(id: u64, name: &str, parent: Option<u64>) -> Entity {
        let mut taxon = Taxon::new(name, "species");
        taxon.id = StableKey::new(id);
        taxon.parent = parent.map(|p| Ref::new(StableKey::new(p)));
        taxon.into()
    }

    #[test]
    fn settled_records_with_different_parents_conflict() {
        let index = DuplicateIndex::new(DuplicatePolicy::Strict);
        let err = index
            .check_settled([taxon(3, "Agrotis", Some(1)), taxon(4, "Agrotis", Some(2))])
            .unwrap_err();
        assert!(matches!(err, TransferError::DuplicateConflict { .. }));

        index
            .check_settled([taxon(3, "Agrotis", Some(1)), taxon(4, "Agrotis", Some(1))])
            .unwrap();
    }

    #[test]
    fn settled_check_is_strict_only() {
        let index = DuplicateIndex::new(DuplicatePolicy::FirstSeen);
        index
            .check_settled([taxon(3, "Agrotis", Some(1)), taxon(4, "Agrotis", Some(2))])
            .unwrap();
    }
}
