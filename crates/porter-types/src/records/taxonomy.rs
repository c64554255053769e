use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::natural::NaturalKey;
use crate::reference::{Ref, RefVisitor, RefWalker};

use super::{Project, Record};

/// A taxon in the shared taxonomy. Identified across databases by its
/// scientific name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Taxon {
    pub id: StableKey,
    pub name: String,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub parent: Option<Ref<Taxon>>,
    #[serde(default)]
    pub synonym_of: Option<Ref<Taxon>>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ordering: Option<i64>,
}

impl Taxon {
    pub fn new(name: impl Into<String>, rank: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            name: name.into(),
            rank: rank.into(),
            parent: None,
            synonym_of: None,
            description: String::new(),
            ordering: None,
        }
    }
}

/// A project's curated list of taxa.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaxaList {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub taxa: Vec<Ref<Taxon>>,
}

/// A project-level label grouping taxa.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub taxa: Vec<Ref<Taxon>>,
}

impl Record for Taxon {
    const KIND: EntityKind = EntityKind::Taxon;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.optional("parent", &mut self.parent)?;
        walker.optional("synonym_of", &mut self.synonym_of)
    }

    fn natural_key(&self) -> Option<NaturalKey> {
        Some(NaturalKey::Taxon {
            name: self.name.clone(),
        })
    }
}

impl Record for TaxaList {
    const KIND: EntityKind = EntityKind::TaxaList;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.many("taxa", &mut self.taxa)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl Record for Tag {
    const KIND: EntityKind = EntityKind::Tag;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.many("taxa", &mut self.taxa)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl From<Taxon> for Entity {
    fn from(record: Taxon) -> Self {
        Entity::Taxon(record)
    }
}

impl From<TaxaList> for Entity {
    fn from(record: TaxaList) -> Self {
        Entity::TaxaList(record)
    }
}

impl From<Tag> for Entity {
    fn from(record: Tag) -> Self {
        Entity::Tag(record)
    }
}
