//! The hand-declared dependency table and the orders derived from it.
//!
//! Kind `A` depends on kind `B` when records of `A` hold a reference to
//! records of `B`. References to a record's own kind are not listed; those
//! are resolved in a second pass once every record of the kind exists.

use std::collections::{BTreeMap, BTreeSet};

use porter_types::EntityKind;
use porter_types::EntityKind::*;
use serde::Serialize;
use tracing::debug;

use crate::error::{GraphError, GraphResult};

/// One edge of the dependency table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub kind: EntityKind,
    /// A required dependency must exist for the dependent record to exist.
    pub required: bool,
}

const fn req(kind: EntityKind) -> Dependency {
    Dependency { kind, required: true }
}

const fn opt(kind: EntityKind) -> Dependency {
    Dependency { kind, required: false }
}

const NONE: &[Dependency] = &[];
const PROJECT_ONLY: &[Dependency] = &[req(Project)];
const DEPLOYMENT: &[Dependency] = &[req(Project), opt(Site), opt(Device), opt(StorageSource)];
const EVENT: &[Dependency] = &[req(Project), req(Deployment)];
const SOURCE_IMAGE: &[Dependency] = &[req(Project), req(Deployment), opt(Event)];
const COLLECTION: &[Dependency] = &[req(Project), opt(SourceImage)];
const TAXON_SCOPED: &[Dependency] = &[req(Project), opt(Taxon)];
const DETECTION: &[Dependency] = &[req(SourceImage), opt(Occurrence), opt(Algorithm)];
const CLASSIFICATION: &[Dependency] = &[req(Detection), opt(Taxon), opt(Algorithm), opt(CategoryMap)];
const OCCURRENCE: &[Dependency] = &[req(Project), req(Event), req(Deployment), opt(Taxon)];
const IDENTIFICATION: &[Dependency] = &[req(Occurrence), opt(Taxon), opt(Classification)];
const ALGORITHM: &[Dependency] = &[opt(CategoryMap)];
const PIPELINE: &[Dependency] = &[opt(Algorithm)];
const PIPELINE_CONFIG: &[Dependency] = &[req(Project), req(Pipeline)];

/// Dependencies of `kind`, as declared for export and import.
pub fn dependencies(kind: EntityKind) -> &'static [Dependency] {
    match kind {
        Project | Taxon | CategoryMap | ProcessingService => NONE,
        Site | Device | StorageSource => PROJECT_ONLY,
        Deployment => DEPLOYMENT,
        Event => EVENT,
        SourceImage => SOURCE_IMAGE,
        Collection => COLLECTION,
        TaxaList | Tag => TAXON_SCOPED,
        Detection => DETECTION,
        Classification => CLASSIFICATION,
        Occurrence => OCCURRENCE,
        Identification => IDENTIFICATION,
        Algorithm => ALGORITHM,
        Pipeline => PIPELINE,
        PipelineConfig => PIPELINE_CONFIG,
    }
}

/// Directed graph over entity kinds.
#[derive(Clone, Debug)]
pub struct DependencyGraph {
    edges: BTreeMap<EntityKind, Vec<Dependency>>,
}

impl DependencyGraph {
    /// The graph of the declared dependency table.
    pub fn standard() -> Self {
        Self {
            edges: EntityKind::ALL
                .into_iter()
                .map(|kind| (kind, dependencies(kind).to_vec()))
                .collect(),
        }
    }

    /// A graph over arbitrary edges. Kinds without an entry have no
    /// dependencies and are not part of the graph.
    pub fn from_edges(edges: impl IntoIterator<Item = (EntityKind, Vec<Dependency>)>) -> Self {
        Self {
            edges: edges.into_iter().collect(),
        }
    }

    /// Kinds in the graph.
    pub fn kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        self.edges.keys().copied()
    }

    pub fn dependencies_of(&self, kind: EntityKind) -> &[Dependency] {
        self.edges.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the declared edge from `source` to `target`, if any.
    pub fn edge(&self, source: EntityKind, target: EntityKind) -> Option<Dependency> {
        self.dependencies_of(source)
            .iter()
            .copied()
            .find(|d| d.kind == target)
    }

    /// Every kind after all of its dependencies (Kahn's algorithm).
    ///
    /// When several kinds are ready at once the one declared first in
    /// [`EntityKind`] goes first, so the order is deterministic.
    pub fn topological_order(&self) -> GraphResult<Vec<EntityKind>> {
        let mut in_degree: BTreeMap<EntityKind, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<EntityKind, Vec<EntityKind>> = BTreeMap::new();
        for (&kind, deps) in &self.edges {
            in_degree.entry(kind).or_insert(0);
            for dep in deps {
                in_degree.entry(dep.kind).or_insert(0);
                *in_degree.entry(kind).or_insert(0) += 1;
                dependents.entry(dep.kind).or_default().push(kind);
            }
        }

        let mut ready: BTreeSet<EntityKind> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&kind, _)| kind)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(current) = ready.pop_first() {
            order.push(current);
            for &child in dependents.get(&current).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(&child) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() < in_degree.len() {
            let remaining: Vec<EntityKind> = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(kind, _)| kind)
                .collect();
            return Err(GraphError::CycleDetected(remaining));
        }

        debug!(kinds = order.len(), "computed dependency order");
        Ok(order)
    }

    /// `skipped` plus every kind that transitively requires one of them.
    ///
    /// Only required edges propagate a skip; optional references into a
    /// skipped kind are cleared instead.
    pub fn skipped_closure(&self, skipped: &BTreeSet<EntityKind>) -> BTreeSet<EntityKind> {
        let mut closed = skipped.clone();
        loop {
            let before = closed.len();
            for (&kind, deps) in &self.edges {
                if deps.iter().any(|d| d.required && closed.contains(&d.kind)) {
                    closed.insert(kind);
                }
            }
            if closed.len() == before {
                return closed;
            }
        }
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::standard()
    }
}

/// Processing order of the declared table.
pub fn processing_order() -> GraphResult<Vec<EntityKind>> {
    DependencyGraph::standard().topological_order()
}

#[cfg(test)]
mod tests {
    use porter_types::Entity;
    use serde_json::json;

    use super::*;
    use porter_types::EntityKind::*;

    fn position(order: &[EntityKind], kind: EntityKind) -> usize {
        order.iter().position(|k| *k == kind).unwrap()
    }

    // -----------------------------------------------------------------------
    // Topological order
    // -----------------------------------------------------------------------

    #[test]
    fn standard_order_covers_every_kind_once() {
        let order = processing_order().unwrap();
        assert_eq!(order.len(), EntityKind::ALL.len());
        let unique: BTreeSet<_> = order.iter().collect();
        assert_eq!(unique.len(), order.len());
        assert_eq!(order[0], Project);
    }

    #[test]
    fn dependencies_come_first() {
        let order = processing_order().unwrap();
        for kind in EntityKind::ALL {
            for dep in dependencies(kind) {
                assert!(
                    position(&order, dep.kind) < position(&order, kind),
                    "{} must precede {kind}",
                    dep.kind
                );
            }
        }
    }

    #[test]
    fn order_is_deterministic() {
        assert_eq!(processing_order().unwrap(), processing_order().unwrap());
        let order = processing_order().unwrap();
        assert_eq!(&order[..4], &[Project, Site, Device, StorageSource]);
    }

    #[test]
    fn cycle_is_detected() {
        let graph = DependencyGraph::from_edges([
            (Project, vec![]),
            (Site, vec![req(Project), opt(Device)]),
            (Device, vec![req(Deployment)]),
            (Deployment, vec![req(Site)]),
        ]);
        match graph.topological_order() {
            Err(GraphError::CycleDetected(kinds)) => {
                assert_eq!(kinds, vec![Site, Device, Deployment]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = DependencyGraph::from_edges([(Taxon, vec![opt(Taxon)])]);
        assert!(matches!(graph.topological_order(), Err(GraphError::CycleDetected(_))));
    }

    // -----------------------------------------------------------------------
    // Skip closure
    // -----------------------------------------------------------------------

    #[test]
    fn skipping_images_drops_detections_and_classifications() {
        let graph = DependencyGraph::standard();
        let closed = graph.skipped_closure(&[SourceImage, Collection].into());
        assert_eq!(
            closed,
            BTreeSet::from([SourceImage, Collection, Detection, Classification])
        );
    }

    #[test]
    fn skipping_ml_data_keeps_ml_configuration() {
        let graph = DependencyGraph::standard();
        let closed =
            graph.skipped_closure(&[Detection, Classification, Occurrence, Identification].into());
        assert_eq!(closed.len(), 4);
        assert!(!closed.contains(&Algorithm));
        assert!(!closed.contains(&CategoryMap));
        assert!(!closed.contains(&Pipeline));
    }

    #[test]
    fn skipping_deployments_cascades_through_required_edges() {
        let closed = DependencyGraph::standard().skipped_closure(&[Deployment].into());
        for kind in [Event, SourceImage, Occurrence, Detection, Classification, Identification] {
            assert!(closed.contains(&kind), "{kind} should be skipped");
        }
        assert!(!closed.contains(&Collection));
    }

    // -----------------------------------------------------------------------
    // Table agrees with the record types
    // -----------------------------------------------------------------------

    /// One record per kind with every reference field populated.
    fn fully_linked(kind: EntityKind) -> Entity {
        let value = match kind {
            Project => json!({"id": 1, "name": "P"}),
            Site | Device | StorageSource => json!({"id": 1, "project": 1, "name": "x"}),
            Deployment => json!({"id": 1, "project": 1, "name": "d", "research_site": 1,
                "device": 1, "data_source": 1}),
            Event => json!({"id": 1, "project": 1, "deployment": 1, "group_by": "2024-06-01"}),
            SourceImage => json!({"id": 1, "project": 1, "deployment": 1, "event": 1, "path": "a.jpg"}),
            Collection => json!({"id": 1, "project": 1, "name": "c", "images": [1, 2]}),
            Taxon => json!({"id": 2, "name": "t", "parent": 1, "synonym_of": 1}),
            TaxaList => json!({"id": 1, "project": 1, "name": "l", "taxa": [1]}),
            Tag => json!({"id": 1, "project": 1, "name": "g", "taxa": [1]}),
            Detection => json!({"id": 1, "source_image": 1, "occurrence": 1, "detection_algorithm": 1}),
            Classification => json!({"id": 1, "detection": 1, "taxon": 1, "algorithm": 1,
                "category_map": 1}),
            Occurrence => json!({"id": 1, "project": 1, "event": 1, "deployment": 1,
                "determination": 1}),
            Identification => json!({"id": 2, "occurrence": 1, "taxon": 1,
                "agreed_with_identification": 1, "agreed_with_prediction": 1}),
            Algorithm => json!({"id": 1, "name": "a", "key": "a", "version": 1, "category_map": 1}),
            CategoryMap => json!({"id": 1, "data": {}}),
            Pipeline => json!({"id": 1, "name": "p", "version": 1, "algorithms": [1]}),
            ProcessingService => json!({"id": 1, "name": "s", "endpoint_url": "http://x"}),
            PipelineConfig => json!({"id": 1, "project": 1, "pipeline": 1}),
        };
        Entity::from_value(kind, value).unwrap()
    }

    #[test]
    fn every_reference_target_is_a_declared_dependency() {
        let graph = DependencyGraph::standard();
        for kind in EntityKind::ALL {
            for slot in fully_linked(kind).references() {
                if slot.is_self_kind() {
                    assert!(!slot.required, "{kind}.{} self reference must be optional", slot.field);
                    continue;
                }
                let edge = graph
                    .edge(kind, slot.target)
                    .unwrap_or_else(|| panic!("{kind}.{} -> {} undeclared", slot.field, slot.target));
                assert_eq!(edge.required, slot.required, "{kind}.{}", slot.field);
            }
        }
    }

    #[test]
    fn every_declared_dependency_is_referenced() {
        let graph = DependencyGraph::standard();
        for kind in EntityKind::ALL {
            let targets: BTreeSet<_> = fully_linked(kind).references().iter().map(|s| s.target).collect();
            for dep in graph.dependencies_of(kind) {
                assert!(targets.contains(&dep.kind), "{kind} declares unused {}", dep.kind);
            }
        }
    }
}
