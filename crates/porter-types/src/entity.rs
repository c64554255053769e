use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::UserId;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::natural::NaturalKey;
use crate::records::{
    Algorithm, CategoryMap, Classification, Collection, Deployment, Detection, Device, Event,
    Identification, Occurrence, Pipeline, PipelineConfig, ProcessingService, Project, Record,
    Site, SourceImage, StorageSource, Tag, TaxaList, Taxon,
};
use crate::reference::{RefVisitor, Slot};

/// Any record, tagged with its kind.
///
/// This is the unit the store persists and the form in which heterogeneous
/// code (store tables, integrity checks) handles records. Typed code should
/// prefer the record structs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Project(Project),
    Site(Site),
    Device(Device),
    StorageSource(StorageSource),
    Deployment(Deployment),
    Event(Event),
    SourceImage(SourceImage),
    Collection(Collection),
    Taxon(Taxon),
    TaxaList(TaxaList),
    Tag(Tag),
    Detection(Detection),
    Classification(Classification),
    Occurrence(Occurrence),
    Identification(Identification),
    Algorithm(Algorithm),
    CategoryMap(CategoryMap),
    Pipeline(Pipeline),
    ProcessingService(ProcessingService),
    PipelineConfig(PipelineConfig),
}

macro_rules! dispatch {
    ($self:expr, $record:ident => $body:expr) => {
        match $self {
            Entity::Project($record) => $body,
            Entity::Site($record) => $body,
            Entity::Device($record) => $body,
            Entity::StorageSource($record) => $body,
            Entity::Deployment($record) => $body,
            Entity::Event($record) => $body,
            Entity::SourceImage($record) => $body,
            Entity::Collection($record) => $body,
            Entity::Taxon($record) => $body,
            Entity::TaxaList($record) => $body,
            Entity::Tag($record) => $body,
            Entity::Detection($record) => $body,
            Entity::Classification($record) => $body,
            Entity::Occurrence($record) => $body,
            Entity::Identification($record) => $body,
            Entity::Algorithm($record) => $body,
            Entity::CategoryMap($record) => $body,
            Entity::Pipeline($record) => $body,
            Entity::ProcessingService($record) => $body,
            Entity::PipelineConfig($record) => $body,
        }
    };
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Project(_) => EntityKind::Project,
            Entity::Site(_) => EntityKind::Site,
            Entity::Device(_) => EntityKind::Device,
            Entity::StorageSource(_) => EntityKind::StorageSource,
            Entity::Deployment(_) => EntityKind::Deployment,
            Entity::Event(_) => EntityKind::Event,
            Entity::SourceImage(_) => EntityKind::SourceImage,
            Entity::Collection(_) => EntityKind::Collection,
            Entity::Taxon(_) => EntityKind::Taxon,
            Entity::TaxaList(_) => EntityKind::TaxaList,
            Entity::Tag(_) => EntityKind::Tag,
            Entity::Detection(_) => EntityKind::Detection,
            Entity::Classification(_) => EntityKind::Classification,
            Entity::Occurrence(_) => EntityKind::Occurrence,
            Entity::Identification(_) => EntityKind::Identification,
            Entity::Algorithm(_) => EntityKind::Algorithm,
            Entity::CategoryMap(_) => EntityKind::CategoryMap,
            Entity::Pipeline(_) => EntityKind::Pipeline,
            Entity::ProcessingService(_) => EntityKind::ProcessingService,
            Entity::PipelineConfig(_) => EntityKind::PipelineConfig,
        }
    }

    pub fn key(&self) -> StableKey {
        dispatch!(self, r => r.key())
    }

    pub fn set_key(&mut self, key: StableKey) {
        dispatch!(self, r => r.set_key(key))
    }

    pub fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        dispatch!(self, r => r.visit_refs(visitor))
    }

    pub fn references(&self) -> Vec<Slot> {
        dispatch!(self, r => r.references())
    }

    pub fn scope(&self) -> Option<(EntityKind, StableKey)> {
        dispatch!(self, r => r.scope())
    }

    pub fn natural_key(&self) -> Option<NaturalKey> {
        dispatch!(self, r => r.natural_key())
    }

    pub fn redact(&mut self) {
        dispatch!(self, r => r.redact())
    }

    pub fn assign_owner(&mut self, user: UserId) {
        dispatch!(self, r => r.assign_owner(user))
    }

    /// Serialized record without the kind tag.
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        dispatch!(self, r => serde_json::to_value(r))
    }

    /// Parse an untagged record of the given kind.
    pub fn from_value(kind: EntityKind, value: serde_json::Value) -> serde_json::Result<Self> {
        fn parse<R: Record>(value: serde_json::Value) -> serde_json::Result<Entity> {
            serde_json::from_value::<R>(value).map(Into::into)
        }

        match kind {
            EntityKind::Project => parse::<Project>(value),
            EntityKind::Site => parse::<Site>(value),
            EntityKind::Device => parse::<Device>(value),
            EntityKind::StorageSource => parse::<StorageSource>(value),
            EntityKind::Deployment => parse::<Deployment>(value),
            EntityKind::Event => parse::<Event>(value),
            EntityKind::SourceImage => parse::<SourceImage>(value),
            EntityKind::Collection => parse::<Collection>(value),
            EntityKind::Taxon => parse::<Taxon>(value),
            EntityKind::TaxaList => parse::<TaxaList>(value),
            EntityKind::Tag => parse::<Tag>(value),
            EntityKind::Detection => parse::<Detection>(value),
            EntityKind::Classification => parse::<Classification>(value),
            EntityKind::Occurrence => parse::<Occurrence>(value),
            EntityKind::Identification => parse::<Identification>(value),
            EntityKind::Algorithm => parse::<Algorithm>(value),
            EntityKind::CategoryMap => parse::<CategoryMap>(value),
            EntityKind::Pipeline => parse::<Pipeline>(value),
            EntityKind::ProcessingService => parse::<ProcessingService>(value),
            EntityKind::PipelineConfig => parse::<PipelineConfig>(value),
        }
    }

    /// Copy of the inner record as type `R`, if this entity is of that kind.
    pub fn as_record<R: Record>(&self) -> Option<R> {
        R::try_from(self.clone()).ok()
    }
}

macro_rules! unwrap_variant {
    ($($variant:ident),* $(,)?) => {
        $(
            impl TryFrom<Entity> for $variant {
                type Error = TypeError;

                fn try_from(entity: Entity) -> Result<Self, TypeError> {
                    match entity {
                        Entity::$variant(record) => Ok(record),
                        other => Err(TypeError::KindMismatch {
                            expected: EntityKind::$variant.to_string(),
                            actual: other.kind().to_string(),
                        }),
                    }
                }
            }
        )*
    };
}

unwrap_variant!(
    Project,
    Site,
    Device,
    StorageSource,
    Deployment,
    Event,
    SourceImage,
    Collection,
    Taxon,
    TaxaList,
    Tag,
    Detection,
    Classification,
    Occurrence,
    Identification,
    Algorithm,
    CategoryMap,
    Pipeline,
    ProcessingService,
    PipelineConfig,
);
