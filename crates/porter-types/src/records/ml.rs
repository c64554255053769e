use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::identity::UserId;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::natural::{content_hash, NaturalKey};
use crate::reference::{Ref, RefVisitor, RefWalker};

use super::{Deployment, Event, Project, Record, SourceImage, Taxon};

/// A bounding box found on a source image by a detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: StableKey,
    pub source_image: Ref<SourceImage>,
    #[serde(default)]
    pub occurrence: Option<Ref<Occurrence>>,
    #[serde(default)]
    pub detection_algorithm: Option<Ref<Algorithm>>,
    /// `[x1, y1, x2, y2]` in image pixels.
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub frame_num: Option<u32>,
    #[serde(default)]
    pub detection_score: Option<f64>,
}

/// A classifier's prediction for one detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub id: StableKey,
    pub detection: Ref<Detection>,
    #[serde(default)]
    pub taxon: Option<Ref<Taxon>>,
    #[serde(default)]
    pub algorithm: Option<Ref<Algorithm>>,
    #[serde(default)]
    pub category_map: Option<Ref<CategoryMap>>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// An individual organism tracked across one or more detections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub event: Ref<Event>,
    pub deployment: Ref<Deployment>,
    #[serde(default)]
    pub determination: Option<Ref<Taxon>>,
    #[serde(default)]
    pub determination_score: Option<f64>,
}

/// A human identification of an occurrence.
///
/// The author is the importing user on the destination side; it is cleared
/// by [`Record::redact`] on export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Identification {
    pub id: StableKey,
    pub occurrence: Ref<Occurrence>,
    #[serde(default)]
    pub taxon: Option<Ref<Taxon>>,
    #[serde(default)]
    pub agreed_with_identification: Option<Ref<Identification>>,
    #[serde(default)]
    pub agreed_with_prediction: Option<Ref<Classification>>,
    #[serde(default)]
    pub withdrawn: bool,
    #[serde(default)]
    pub remarks: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<UserId>,
}

/// Label table of a classification model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    pub id: StableKey,
    pub data: Value,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A versioned ML model (detector or classifier).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Algorithm {
    pub id: StableKey,
    pub name: String,
    pub key: String,
    pub version: i32,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub category_map: Option<Ref<CategoryMap>>,
}

/// An ordered bundle of algorithms run together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: StableKey,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub version: i32,
    #[serde(default)]
    pub default_config: Option<Value>,
    #[serde(default)]
    pub algorithms: Vec<Ref<Algorithm>>,
}

/// An external service endpoint that runs pipelines.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProcessingService {
    pub id: StableKey,
    pub name: String,
    pub endpoint_url: String,
}

/// A project's settings for one pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub pipeline: Ref<Pipeline>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub config: Option<Value>,
}

impl Record for Detection {
    const KIND: EntityKind = EntityKind::Detection;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("source_image", &mut self.source_image)?;
        walker.optional("occurrence", &mut self.occurrence)?;
        walker.optional("detection_algorithm", &mut self.detection_algorithm)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::SourceImage, self.source_image.key()))
    }
}

impl Record for Classification {
    const KIND: EntityKind = EntityKind::Classification;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("detection", &mut self.detection)?;
        walker.optional("taxon", &mut self.taxon)?;
        walker.optional("algorithm", &mut self.algorithm)?;
        walker.optional("category_map", &mut self.category_map)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Detection, self.detection.key()))
    }
}

impl Record for Occurrence {
    const KIND: EntityKind = EntityKind::Occurrence;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.required("event", &mut self.event)?;
        walker.required("deployment", &mut self.deployment)?;
        walker.optional("determination", &mut self.determination)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl Record for Identification {
    const KIND: EntityKind = EntityKind::Identification;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("occurrence", &mut self.occurrence)?;
        walker.optional("taxon", &mut self.taxon)?;
        walker.optional("agreed_with_identification", &mut self.agreed_with_identification)?;
        walker.optional("agreed_with_prediction", &mut self.agreed_with_prediction)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Occurrence, self.occurrence.key()))
    }

    fn redact(&mut self) {
        self.author = None;
    }

    fn assign_owner(&mut self, user: UserId) {
        self.author = Some(user);
    }
}

impl Record for CategoryMap {
    const KIND: EntityKind = EntityKind::CategoryMap;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, _visitor: &mut V) -> Result<(), V::Error> {
        Ok(())
    }

    fn natural_key(&self) -> Option<NaturalKey> {
        Some(NaturalKey::CategoryMap {
            content_hash: content_hash(&self.data),
        })
    }
}

impl Record for Algorithm {
    const KIND: EntityKind = EntityKind::Algorithm;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.optional("category_map", &mut self.category_map)
    }

    fn natural_key(&self) -> Option<NaturalKey> {
        Some(NaturalKey::Algorithm {
            key: self.key.clone(),
            version: self.version,
        })
    }
}

impl Record for Pipeline {
    const KIND: EntityKind = EntityKind::Pipeline;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.many("algorithms", &mut self.algorithms)
    }

    fn natural_key(&self) -> Option<NaturalKey> {
        Some(NaturalKey::Pipeline {
            name: self.name.clone(),
            version: self.version,
        })
    }
}

impl Record for ProcessingService {
    const KIND: EntityKind = EntityKind::ProcessingService;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, _visitor: &mut V) -> Result<(), V::Error> {
        Ok(())
    }

    fn natural_key(&self) -> Option<NaturalKey> {
        Some(NaturalKey::ProcessingService {
            endpoint_url: self.endpoint_url.clone(),
        })
    }
}

impl Record for PipelineConfig {
    const KIND: EntityKind = EntityKind::PipelineConfig;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.required("pipeline", &mut self.pipeline)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl From<Detection> for Entity {
    fn from(record: Detection) -> Self {
        Entity::Detection(record)
    }
}

impl From<Classification> for Entity {
    fn from(record: Classification) -> Self {
        Entity::Classification(record)
    }
}

impl From<Occurrence> for Entity {
    fn from(record: Occurrence) -> Self {
        Entity::Occurrence(record)
    }
}

impl From<Identification> for Entity {
    fn from(record: Identification) -> Self {
        Entity::Identification(record)
    }
}

impl From<CategoryMap> for Entity {
    fn from(record: CategoryMap) -> Self {
        Entity::CategoryMap(record)
    }
}

impl From<Algorithm> for Entity {
    fn from(record: Algorithm) -> Self {
        Entity::Algorithm(record)
    }
}

impl From<Pipeline> for Entity {
    fn from(record: Pipeline) -> Self {
        Entity::Pipeline(record)
    }
}

impl From<ProcessingService> for Entity {
    fn from(record: ProcessingService) -> Self {
        Entity::ProcessingService(record)
    }
}

impl From<PipelineConfig> for Entity {
    fn from(record: PipelineConfig) -> Self {
        Entity::PipelineConfig(record)
    }
}
