//! The versioned export container.
//!
//! A document holds one project and every record its graph owns or
//! references, grouped into one collection per kind. It is produced once by
//! an export and never modified afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::counts::KindCounts;
use crate::entity::Entity;
use crate::kind::EntityKind;
use crate::records::{
    Algorithm, CategoryMap, Classification, Collection, Deployment, Detection, Device, Event,
    Identification, Occurrence, Pipeline, PipelineConfig, ProcessingService, Project, Site,
    SourceImage, StorageSource, Tag, TaxaList, Taxon,
};

/// Format version written by this build.
pub const EXPORT_VERSION: &str = "1.0";

/// Format versions this build can import.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub export_version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_tool: Option<String>,
    pub project: Project,
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub storage_sources: Vec<StorageSource>,
    #[serde(default)]
    pub deployments: Vec<Deployment>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub source_images: Vec<SourceImage>,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub taxa: Vec<Taxon>,
    #[serde(default)]
    pub taxa_lists: Vec<TaxaList>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub classifications: Vec<Classification>,
    #[serde(default)]
    pub occurrences: Vec<Occurrence>,
    #[serde(default)]
    pub identifications: Vec<Identification>,
    #[serde(default)]
    pub algorithms: Vec<Algorithm>,
    #[serde(default)]
    pub category_maps: Vec<CategoryMap>,
    #[serde(default)]
    pub pipelines: Vec<Pipeline>,
    #[serde(default)]
    pub processing_services: Vec<ProcessingService>,
    #[serde(default)]
    pub pipeline_configs: Vec<PipelineConfig>,
}

macro_rules! collections {
    ($mac:ident!($($args:tt)*)) => {
        $mac!($($args)*;
            Site => sites,
            Device => devices,
            StorageSource => storage_sources,
            Deployment => deployments,
            Event => events,
            SourceImage => source_images,
            Collection => collections,
            Taxon => taxa,
            TaxaList => taxa_lists,
            Tag => tags,
            Detection => detections,
            Classification => classifications,
            Occurrence => occurrences,
            Identification => identifications,
            Algorithm => algorithms,
            CategoryMap => category_maps,
            Pipeline => pipelines,
            ProcessingService => processing_services,
            PipelineConfig => pipeline_configs,
        )
    };
}

macro_rules! records_of {
    ($doc:expr, $kind:expr; $($variant:ident => $field:ident,)*) => {
        match $kind {
            EntityKind::Project => vec![Entity::Project($doc.project.clone())],
            $(EntityKind::$variant => $doc.$field.iter().cloned().map(Entity::$variant).collect(),)*
        }
    };
}

macro_rules! push_into {
    ($doc:expr, $entity:expr; $($variant:ident => $field:ident,)*) => {
        match $entity {
            Entity::Project(project) => $doc.project = project,
            $(Entity::$variant(record) => $doc.$field.push(record),)*
        }
    };
}

macro_rules! len_of {
    ($doc:expr, $kind:expr; $($variant:ident => $field:ident,)*) => {
        match $kind {
            EntityKind::Project => 1,
            $(EntityKind::$variant => $doc.$field.len(),)*
        }
    };
}

impl Document {
    /// Empty document for `project`, stamped with the current time.
    pub fn new(project: Project) -> Self {
        Self {
            export_version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            export_tool: None,
            project,
            sites: Vec::new(),
            devices: Vec::new(),
            storage_sources: Vec::new(),
            deployments: Vec::new(),
            events: Vec::new(),
            source_images: Vec::new(),
            collections: Vec::new(),
            taxa: Vec::new(),
            taxa_lists: Vec::new(),
            tags: Vec::new(),
            detections: Vec::new(),
            classifications: Vec::new(),
            occurrences: Vec::new(),
            identifications: Vec::new(),
            algorithms: Vec::new(),
            category_maps: Vec::new(),
            pipelines: Vec::new(),
            processing_services: Vec::new(),
            pipeline_configs: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.export_tool = Some(tool.into());
        self
    }

    /// The records of one kind, in document order.
    pub fn records(&self, kind: EntityKind) -> Vec<Entity> {
        collections!(records_of!(self, kind))
    }

    /// Number of records of one kind.
    pub fn len(&self, kind: EntityKind) -> usize {
        collections!(len_of!(self, kind))
    }

    /// Append a record to its kind's collection. A project replaces the
    /// document's project.
    pub fn push(&mut self, entity: Entity) {
        collections!(push_into!(self, entity))
    }

    /// Every record, grouped by kind in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        EntityKind::ALL.into_iter().flat_map(|kind| self.records(kind))
    }

    /// Per-kind record counts.
    pub fn summary(&self) -> KindCounts {
        EntityKind::ALL.into_iter().map(|kind| (kind, self.len(kind))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::StableKey;

    fn demo() -> Document {
        let mut project = Project::new("Demo");
        project.id = StableKey::new(1);
        let mut doc = Document::new(project);
        let mut site = Site::new(StableKey::new(1), "Ridge");
        site.id = StableKey::new(3);
        doc.push(site.into());
        let mut taxon = Taxon::new("Apis mellifera", "species");
        taxon.id = StableKey::new(8);
        doc.push(taxon.into());
        doc
    }

    #[test]
    fn push_routes_by_kind() {
        let doc = demo();
        assert_eq!(doc.sites.len(), 1);
        assert_eq!(doc.taxa.len(), 1);
        assert_eq!(doc.records(EntityKind::Taxon)[0].key(), StableKey::new(8));
        assert_eq!(doc.entities().count(), 3);
    }

    #[test]
    fn summary_counts_project_once() {
        let summary = demo().summary();
        assert_eq!(summary.get(EntityKind::Project), 1);
        assert_eq!(summary.get(EntityKind::Site), 1);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn missing_collections_default_to_empty() {
        let json = r#"{
            "export_version": "1.0",
            "exported_at": "2024-06-01T12:00:00Z",
            "project": {"id": 1, "name": "Old"},
            "sites": [{"id": 2, "project": 1, "name": "Ridge"}],
            "job_history": [1, 2, 3]
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.sites.len(), 1);
        assert!(doc.category_maps.is_empty());
        assert!(doc.export_tool.is_none());
    }

    #[test]
    fn document_layout_uses_collection_names() {
        let value = serde_json::to_value(demo().with_tool("porter export")).unwrap();
        for kind in EntityKind::ALL {
            assert!(value.get(kind.collection()).is_some(), "missing {}", kind.collection());
        }
        assert_eq!(value["export_tool"], "porter export");
    }
}
