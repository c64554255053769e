//! Typed references between records.
//!
//! A [`Ref<T>`] holds the stable key of a record of type `T`, so the target
//! kind of every reference is fixed at compile time. Records expose their
//! references through [`Record::visit_refs`](crate::Record::visit_refs): one
//! hand-written method per record type that hands every reference slot to a
//! [`RefVisitor`]. The same walk serves integrity checks (read only) and
//! import-time remapping (rewrite in place).

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::records::Record;

/// Reference to a record of type `T` by stable key.
///
/// Serialized as the bare key.
pub struct Ref<T> {
    key: StableKey,
    target: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    /// Reference the record with the given key.
    pub const fn new(key: StableKey) -> Self {
        Self {
            key,
            target: PhantomData,
        }
    }

    /// The referenced stable key.
    pub const fn key(&self) -> StableKey {
        self.key
    }
}

impl<T: Record> Ref<T> {
    /// Kind of the referenced record.
    pub const fn kind(&self) -> EntityKind {
        T::KIND
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl<T: Record> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref<{}>({})", T::KIND, self.key)
    }
}

impl<T> From<StableKey> for Ref<T> {
    fn from(key: StableKey) -> Self {
        Self::new(key)
    }
}

impl<T> Serialize for Ref<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.key.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Ref<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        StableKey::deserialize(deserializer).map(Self::new)
    }
}

/// One reference field of one record, as presented to a [`RefVisitor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    /// Kind of the record holding the reference.
    pub source: EntityKind,
    /// Stable key of the record holding the reference.
    pub source_key: StableKey,
    /// Field name as it appears in the document.
    pub field: &'static str,
    /// Kind the reference points at.
    pub target: EntityKind,
    /// Stable key currently held by the reference.
    pub key: StableKey,
    /// Required slots must always resolve; optional ones may be cleared.
    pub required: bool,
}

impl Slot {
    /// Returns `true` when the reference points at the holder's own kind.
    pub fn is_self_kind(&self) -> bool {
        self.source == self.target
    }
}

/// Receives every reference slot of a record.
///
/// The returned key replaces the one in the slot. For optional slots,
/// returning `None` clears the reference (list elements are dropped).
pub trait RefVisitor {
    type Error;

    fn visit_required(&mut self, slot: Slot) -> Result<StableKey, Self::Error>;

    fn visit_optional(&mut self, slot: Slot) -> Result<Option<StableKey>, Self::Error>;
}

/// Cursor over the reference fields of one record; keeps the per-field
/// bookkeeping out of the record implementations.
pub struct RefWalker<'v, V: RefVisitor> {
    visitor: &'v mut V,
    source: EntityKind,
    source_key: StableKey,
}

impl<'v, V: RefVisitor> RefWalker<'v, V> {
    pub fn new(visitor: &'v mut V, source: EntityKind, source_key: StableKey) -> Self {
        Self {
            visitor,
            source,
            source_key,
        }
    }

    fn slot(&self, field: &'static str, target: EntityKind, key: StableKey, required: bool) -> Slot {
        Slot {
            source: self.source,
            source_key: self.source_key,
            field,
            target,
            key,
            required,
        }
    }

    pub fn required<T: Record>(&mut self, field: &'static str, r: &mut Ref<T>) -> Result<(), V::Error> {
        let slot = self.slot(field, T::KIND, r.key, true);
        r.key = self.visitor.visit_required(slot)?;
        Ok(())
    }

    pub fn optional<T: Record>(
        &mut self,
        field: &'static str,
        r: &mut Option<Ref<T>>,
    ) -> Result<(), V::Error> {
        if let Some(current) = *r {
            let slot = self.slot(field, T::KIND, current.key, false);
            *r = self.visitor.visit_optional(slot)?.map(Ref::new);
        }
        Ok(())
    }

    pub fn many<T: Record>(&mut self, field: &'static str, refs: &mut Vec<Ref<T>>) -> Result<(), V::Error> {
        let mut kept = Vec::with_capacity(refs.len());
        for current in refs.iter() {
            let slot = self.slot(field, T::KIND, current.key, false);
            if let Some(key) = self.visitor.visit_optional(slot)? {
                kept.push(Ref::new(key));
            }
        }
        *refs = kept;
        Ok(())
    }
}

/// Visitor that records every slot and leaves keys untouched.
#[derive(Debug, Default)]
pub struct SlotCollector {
    pub slots: Vec<Slot>,
}

impl RefVisitor for SlotCollector {
    type Error = std::convert::Infallible;

    fn visit_required(&mut self, slot: Slot) -> Result<StableKey, Self::Error> {
        self.slots.push(slot);
        Ok(slot.key)
    }

    fn visit_optional(&mut self, slot: Slot) -> Result<Option<StableKey>, Self::Error> {
        self.slots.push(slot);
        Ok(Some(slot.key))
    }
}
