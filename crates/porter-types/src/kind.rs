use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The closed set of record kinds a project graph is made of.
///
/// Declaration order follows the export document layout and is used as the
/// tie-breaker when the dependency graph yields several ready kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
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
}

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [EntityKind; 20] = [
        Self::Project,
        Self::Site,
        Self::Device,
        Self::StorageSource,
        Self::Deployment,
        Self::Event,
        Self::SourceImage,
        Self::Collection,
        Self::Taxon,
        Self::TaxaList,
        Self::Tag,
        Self::Detection,
        Self::Classification,
        Self::Occurrence,
        Self::Identification,
        Self::Algorithm,
        Self::CategoryMap,
        Self::Pipeline,
        Self::ProcessingService,
        Self::PipelineConfig,
    ];

    /// Snake-case name, as used in serialized records.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Site => "site",
            Self::Device => "device",
            Self::StorageSource => "storage_source",
            Self::Deployment => "deployment",
            Self::Event => "event",
            Self::SourceImage => "source_image",
            Self::Collection => "collection",
            Self::Taxon => "taxon",
            Self::TaxaList => "taxa_list",
            Self::Tag => "tag",
            Self::Detection => "detection",
            Self::Classification => "classification",
            Self::Occurrence => "occurrence",
            Self::Identification => "identification",
            Self::Algorithm => "algorithm",
            Self::CategoryMap => "category_map",
            Self::Pipeline => "pipeline",
            Self::ProcessingService => "processing_service",
            Self::PipelineConfig => "pipeline_config",
        }
    }

    /// Top-level key of this kind's collection in an export document.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Site => "sites",
            Self::Device => "devices",
            Self::StorageSource => "storage_sources",
            Self::Deployment => "deployments",
            Self::Event => "events",
            Self::SourceImage => "source_images",
            Self::Collection => "collections",
            Self::Taxon => "taxa",
            Self::TaxaList => "taxa_lists",
            Self::Tag => "tags",
            Self::Detection => "detections",
            Self::Classification => "classifications",
            Self::Occurrence => "occurrences",
            Self::Identification => "identifications",
            Self::Algorithm => "algorithms",
            Self::CategoryMap => "category_maps",
            Self::Pipeline => "pipelines",
            Self::ProcessingService => "processing_services",
            Self::PipelineConfig => "pipeline_configs",
        }
    }

    /// Human-readable plural label for summaries.
    pub fn label(self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Site => "Sites",
            Self::Device => "Devices",
            Self::StorageSource => "Storage Sources",
            Self::Deployment => "Deployments",
            Self::Event => "Events",
            Self::SourceImage => "Source Images",
            Self::Collection => "Collections",
            Self::Taxon => "Taxa",
            Self::TaxaList => "Taxa Lists",
            Self::Tag => "Tags",
            Self::Detection => "Detections",
            Self::Classification => "Classifications",
            Self::Occurrence => "Occurrences",
            Self::Identification => "Identifications",
            Self::Algorithm => "Algorithms",
            Self::CategoryMap => "Category Maps",
            Self::Pipeline => "Pipelines",
            Self::ProcessingService => "Processing Services",
            Self::PipelineConfig => "Pipeline Configs",
        }
    }

    /// Shared kinds are deduplicated by natural key across imports instead
    /// of being created anew for every project.
    pub fn is_shared(self) -> bool {
        matches!(
            self,
            Self::Taxon
                | Self::Algorithm
                | Self::CategoryMap
                | Self::Pipeline
                | Self::ProcessingService
        )
    }

    /// Shared kinds that are attached to projects through membership links
    /// rather than reached through references.
    pub fn is_linked(self) -> bool {
        matches!(self, Self::Taxon | Self::ProcessingService)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.collection() == s)
            .ok_or_else(|| TypeError::UnknownKind(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_is_sorted_and_complete() {
        for pair in EntityKind::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(EntityKind::ALL.len(), 20);
    }

    #[test]
    fn serde_name_matches_as_str() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn parse_accepts_name_and_collection() {
        assert_eq!("source_image".parse::<EntityKind>().unwrap(), EntityKind::SourceImage);
        assert_eq!("taxa".parse::<EntityKind>().unwrap(), EntityKind::Taxon);
        assert!("job".parse::<EntityKind>().is_err());
    }

    #[test]
    fn shared_set() {
        let shared: Vec<_> = EntityKind::ALL.into_iter().filter(|k| k.is_shared()).collect();
        assert_eq!(
            shared,
            vec![
                EntityKind::Taxon,
                EntityKind::Algorithm,
                EntityKind::CategoryMap,
                EntityKind::Pipeline,
                EntityKind::ProcessingService,
            ]
        );
    }

    #[test]
    fn linked_kinds_are_shared() {
        for kind in EntityKind::ALL {
            if kind.is_linked() {
                assert!(kind.is_shared(), "{kind} is linked but not shared");
            }
        }
    }

    #[test]
    fn collection_names_are_unique() {
        let mut names: Vec<_> = EntityKind::ALL.iter().map(|k| k.collection()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EntityKind::ALL.len());
    }
}
