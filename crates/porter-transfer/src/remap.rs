//! Session-scoped identifier remapping.
//!
//! Every record an import creates or reuses gets an entry
//! `(kind, old key) -> new key`. References are rewritten through the table
//! as records are walked, so a record's dependencies must be processed
//! before the record itself.

use std::collections::{BTreeMap, BTreeSet};

use porter_types::{EntityKind, RefVisitor, Slot, StableKey};

use crate::error::{record_path, TransferError, TransferResult};

/// Mapping from document keys to store keys for one import run.
#[derive(Clone, Debug, Default)]
pub struct RemapTable {
    keys: BTreeMap<(EntityKind, StableKey), StableKey>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old` of `kind` now lives at `new`. A document key seen
    /// twice within a kind is malformed.
    pub fn record(&mut self, kind: EntityKind, old: StableKey, new: StableKey) -> TransferResult<()> {
        if self.keys.insert((kind, old), new).is_some() {
            return Err(TransferError::malformed(
                record_path(kind, old),
                "duplicate stable key",
            ));
        }
        Ok(())
    }

    pub fn resolve(&self, kind: EntityKind, old: StableKey) -> Option<StableKey> {
        self.keys.get(&(kind, old)).copied()
    }

    /// Number of remapped records of `kind`.
    pub fn len(&self, kind: EntityKind) -> usize {
        self.keys.keys().filter(|(k, _)| *k == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Rewrites a record's references through a [`RemapTable`].
///
/// - References into a skipped kind are cleared (they are always optional,
///   since skipping closes over required edges).
/// - On the first pass, references to the record's own kind are cleared and
///   counted in [`deferred`](Self::deferred); they are written by a second
///   pass once every record of the kind exists.
/// - Anything else that does not resolve is a malformed document.
pub struct RemapVisitor<'a> {
    table: &'a RemapTable,
    skipped: &'a BTreeSet<EntityKind>,
    defer_self: bool,
    pub deferred: usize,
}

impl<'a> RemapVisitor<'a> {
    pub fn first_pass(table: &'a RemapTable, skipped: &'a BTreeSet<EntityKind>) -> Self {
        Self {
            table,
            skipped,
            defer_self: true,
            deferred: 0,
        }
    }

    pub fn second_pass(table: &'a RemapTable, skipped: &'a BTreeSet<EntityKind>) -> Self {
        Self {
            table,
            skipped,
            defer_self: false,
            deferred: 0,
        }
    }

    fn lookup(&self, slot: &Slot) -> TransferResult<StableKey> {
        self.table.resolve(slot.target, slot.key).ok_or_else(|| {
            TransferError::malformed(
                format!("{}.{}", record_path(slot.source, slot.source_key), slot.field),
                format!("references missing {} #{}", slot.target, slot.key),
            )
        })
    }
}

impl RefVisitor for RemapVisitor<'_> {
    type Error = TransferError;

    fn visit_required(&mut self, slot: Slot) -> TransferResult<StableKey> {
        self.lookup(&slot)
    }

    fn visit_optional(&mut self, slot: Slot) -> TransferResult<Option<StableKey>> {
        if self.skipped.contains(&slot.target) {
            return Ok(None);
        }
        if self.defer_self && slot.is_self_kind() {
            self.deferred += 1;
            return Ok(None);
        }
        self.lookup(&slot).map(Some)
    }
}
