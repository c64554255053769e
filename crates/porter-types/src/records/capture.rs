use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::reference::{Ref, RefVisitor, RefWalker};

use super::{Deployment, Project, Record};

/// A capture session (typically one night) of a deployment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub deployment: Ref<Deployment>,
    pub group_by: String,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(project: StableKey, deployment: StableKey, group_by: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            deployment: Ref::new(deployment),
            group_by: group_by.into(),
            start: None,
            end: None,
        }
    }
}

/// Metadata of one captured image. Image bytes are never exported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceImage {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub deployment: Ref<Deployment>,
    #[serde(default)]
    pub event: Option<Ref<Event>>,
    pub path: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl SourceImage {
    pub fn new(project: StableKey, deployment: StableKey, path: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            deployment: Ref::new(deployment),
            event: None,
            path: path.into(),
            timestamp: None,
            width: None,
            height: None,
            size: None,
            checksum: None,
        }
    }
}

/// A named sample of source images.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub kwargs: Option<Value>,
    #[serde(default)]
    pub images: Vec<Ref<SourceImage>>,
}

impl Collection {
    pub fn new(project: StableKey, name: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            name: name.into(),
            description: String::new(),
            method: None,
            kwargs: None,
            images: Vec::new(),
        }
    }
}

impl Record for Event {
    const KIND: EntityKind = EntityKind::Event;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.required("deployment", &mut self.deployment)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl Record for SourceImage {
    const KIND: EntityKind = EntityKind::SourceImage;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.required("deployment", &mut self.deployment)?;
        walker.optional("event", &mut self.event)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl Record for Collection {
    const KIND: EntityKind = EntityKind::Collection;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.many("images", &mut self.images)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl From<Event> for Entity {
    fn from(record: Event) -> Self {
        Entity::Event(record)
    }
}

impl From<SourceImage> for Entity {
    fn from(record: SourceImage) -> Self {
        Entity::SourceImage(record)
    }
}

impl From<Collection> for Entity {
    fn from(record: Collection) -> Self {
        Entity::Collection(record)
    }
}
