//! One statically declared record type per entity kind.
//!
//! Every record carries its stable key in `id` and its foreign keys as typed
//! [`Ref`](crate::Ref)s. The field list of each kind is fixed here; the
//! reference list is fixed by its [`Record::visit_refs`] implementation.

mod capture;
mod infrastructure;
mod ml;
mod project;
mod taxonomy;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use capture::{Collection, Event, SourceImage};
pub use infrastructure::{Deployment, Device, Site, StorageSource};
pub use ml::{
    Algorithm, CategoryMap, Classification, Detection, Identification, Occurrence, Pipeline,
    PipelineConfig, ProcessingService,
};
pub use project::Project;
pub use taxonomy::{Tag, TaxaList, Taxon};

use crate::entity::Entity;
use crate::error::TypeError;
use crate::identity::UserId;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::natural::NaturalKey;
use crate::reference::{RefVisitor, SlotCollector, Slot};

/// Behaviour shared by all record types.
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Into<Entity> + TryFrom<Entity, Error = TypeError>
{
    /// Kind of every record of this type.
    const KIND: EntityKind;

    /// The record's stable key.
    fn key(&self) -> StableKey;

    /// Replace the record's stable key.
    fn set_key(&mut self, key: StableKey);

    /// Hand every reference slot to `visitor`, replacing keys with what the
    /// visitor returns.
    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error>;

    /// Ownership edge: the record this one belongs to within a project
    /// graph. `None` for the project itself and for shared kinds.
    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        None
    }

    /// Content-derived identity for shared kinds.
    fn natural_key(&self) -> Option<NaturalKey> {
        None
    }

    /// Clear fields that must never leave the source database (owners,
    /// credentials).
    fn redact(&mut self) {}

    /// Point every owner/author field at `user`.
    fn assign_owner(&mut self, _user: UserId) {}

    /// All reference slots, without modifying the record.
    fn references(&self) -> Vec<Slot> {
        let mut collector = SlotCollector::default();
        let mut copy = self.clone();
        match copy.visit_refs(&mut collector) {
            Ok(()) => collector.slots,
            Err(never) => match never {},
        }
    }
}
