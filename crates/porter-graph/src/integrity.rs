//! Reference integrity of a set of records.
//!
//! A document is closed when every reference it holds resolves to a record
//! of the target kind within the same document, and no kind repeats a
//! stable key.

use std::collections::{BTreeMap, BTreeSet};

use porter_types::{Document, Entity, EntityKind, StableKey};
use serde::Serialize;

use crate::error::{GraphError, GraphResult};

/// A reference whose target is absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DanglingRef {
    pub kind: EntityKind,
    pub key: StableKey,
    pub field: &'static str,
    pub target: EntityKind,
    pub target_key: StableKey,
}

/// Result of an integrity check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Number of records examined.
    pub records: usize,
    /// Number of references examined.
    pub references: usize,
    pub dangling: Vec<DanglingRef>,
    pub duplicate_keys: Vec<(EntityKind, StableKey)>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dangling.is_empty() && self.duplicate_keys.is_empty()
    }

    /// The first problem found, as an error.
    pub fn into_result(self) -> GraphResult<()> {
        if let Some(&(kind, key)) = self.duplicate_keys.first() {
            return Err(GraphError::DuplicateKey { kind, key });
        }
        if let Some(d) = self.dangling.into_iter().next() {
            return Err(GraphError::DanglingReference {
                kind: d.kind,
                key: d.key,
                field: d.field,
                target: d.target,
                target_key: d.target_key,
            });
        }
        Ok(())
    }
}

/// Check a set of records against itself.
pub fn check_entities<'a>(entities: impl IntoIterator<Item = &'a Entity>) -> IntegrityReport {
    let entities: Vec<&Entity> = entities.into_iter().collect();
    let mut report = IntegrityReport {
        records: entities.len(),
        ..Default::default()
    };

    let mut present: BTreeMap<EntityKind, BTreeSet<StableKey>> = BTreeMap::new();
    for entity in &entities {
        if !present.entry(entity.kind()).or_default().insert(entity.key()) {
            report.duplicate_keys.push((entity.kind(), entity.key()));
        }
    }

    for entity in &entities {
        for slot in entity.references() {
            report.references += 1;
            let found = present
                .get(&slot.target)
                .is_some_and(|keys| keys.contains(&slot.key));
            if !found {
                report.dangling.push(DanglingRef {
                    kind: slot.source,
                    key: slot.source_key,
                    field: slot.field,
                    target: slot.target,
                    target_key: slot.key,
                });
            }
        }
    }

    report
}

/// Check that a document is closed under its references.
pub fn check_document(document: &Document) -> IntegrityReport {
    let entities: Vec<Entity> = document.entities().collect();
    check_entities(&entities)
}
