//! Project serializer.
//!
//! Collects every record a project owns (directly or through a chain of
//! ownership edges) and the shared records they reference, and lays them out
//! as a [`Document`]. Read only.

use std::collections::{BTreeMap, BTreeSet};

use porter_graph::{check_document, processing_order};
use porter_store::EntityReader;
use porter_types::{Document, Entity, EntityKind, Project, Record, StableKey};
use tracing::{debug, info};

use crate::error::{TransferError, TransferResult};

/// Tool name stamped into documents written by [`export_project`].
pub const EXPORT_TOOL: &str = "porter export";

/// Records selected for export, per kind, in key order.
#[derive(Default)]
struct Selection {
    rows: BTreeMap<EntityKind, BTreeMap<StableKey, Entity>>,
}

impl Selection {
    fn contains(&self, kind: EntityKind, key: StableKey) -> bool {
        self.rows.get(&kind).is_some_and(|t| t.contains_key(&key))
    }

    fn add(&mut self, entity: Entity) {
        self.rows
            .entry(entity.kind())
            .or_default()
            .insert(entity.key(), entity);
    }

    fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.rows.values().flat_map(BTreeMap::values)
    }
}

/// Export the project called `project_name`.
///
/// Fails with [`TransferError::ProjectNotFound`] if no project has that
/// name, and with [`TransferError::Serialization`] if a selected record
/// references a row that is missing or belongs to another project.
pub fn export_project<R: EntityReader + ?Sized>(reader: &R, project_name: &str) -> TransferResult<Document> {
    let project = reader
        .find_project(project_name)?
        .ok_or_else(|| TransferError::ProjectNotFound(project_name.to_string()))?;
    let project_key = project.id;

    let mut selection = Selection::default();
    selection.add(project.clone().into());
    select_owned(reader, &mut selection)?;
    select_shared(reader, project_key, &mut selection)?;
    verify_closed(reader, &selection)?;

    let document = build_document(project, &selection);
    for (kind, count) in document.summary().iter() {
        info!(project = %project_name, %kind, count, "exported");
    }
    check_document(&document).into_result()?;
    Ok(document)
}

/// Owned kinds, parents first: a row is selected when its scope row is.
fn select_owned<R: EntityReader + ?Sized>(reader: &R, selection: &mut Selection) -> TransferResult<()> {
    for kind in processing_order()? {
        if kind == EntityKind::Project || kind.is_shared() {
            continue;
        }
        for entity in reader.scan(kind)? {
            let owned = entity
                .scope()
                .is_some_and(|(scope_kind, scope_key)| selection.contains(scope_kind, scope_key));
            if owned {
                selection.add(entity);
            }
        }
    }
    Ok(())
}

/// Shared rows linked to the project or referenced from the selection,
/// closed over their own references.
fn select_shared<R: EntityReader + ?Sized>(
    reader: &R,
    project: StableKey,
    selection: &mut Selection,
) -> TransferResult<()> {
    let mut pending: Vec<(EntityKind, StableKey)> = Vec::new();
    for kind in [EntityKind::Taxon, EntityKind::ProcessingService] {
        pending.extend(reader.linked(project, kind)?.into_iter().map(|key| (kind, key)));
    }
    pending.extend(shared_targets(selection.entities()));

    let mut visited = BTreeSet::new();
    while let Some((kind, key)) = pending.pop() {
        if !visited.insert((kind, key)) || selection.contains(kind, key) {
            continue;
        }
        // Missing rows are reported by `verify_closed` with the referencing field.
        let Some(entity) = reader.get(kind, key)? else {
            continue;
        };
        pending.extend(shared_targets(std::iter::once(&entity)));
        debug!(%kind, %key, "selected shared record");
        selection.add(entity);
    }
    Ok(())
}

fn shared_targets<'a>(entities: impl Iterator<Item = &'a Entity>) -> Vec<(EntityKind, StableKey)> {
    entities
        .flat_map(Entity::references)
        .filter(|slot| slot.target.is_shared())
        .map(|slot| (slot.target, slot.key))
        .collect()
}

fn verify_closed<R: EntityReader + ?Sized>(reader: &R, selection: &Selection) -> TransferResult<()> {
    for entity in selection.entities() {
        for slot in entity.references() {
            if selection.contains(slot.target, slot.key) {
                continue;
            }
            let reason = if reader.get(slot.target, slot.key)?.is_some() {
                format!("references {} #{} outside project", slot.target, slot.key)
            } else {
                format!("references missing {} #{}", slot.target, slot.key)
            };
            return Err(TransferError::Serialization {
                kind: slot.source,
                key: slot.source_key,
                field: slot.field.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

fn build_document(mut project: Project, selection: &Selection) -> Document {
    project.redact();
    let mut document = Document::new(project).with_tool(EXPORT_TOOL);
    for kind in EntityKind::ALL {
        if kind == EntityKind::Project {
            continue;
        }
        for entity in selection.rows.get(&kind).into_iter().flat_map(BTreeMap::values) {
            let mut entity = entity.clone();
            entity.redact();
            document.push(entity);
        }
    }
    document
}

#[cfg(test)]
mod tests {
    use porter_store::{EntityStore, InMemoryEntityStore, Transaction};
    use porter_types::{Deployment, Ref, Site, StorageSource, Taxon, User, UserId};
    use proptest::prelude::*;

    use super::*;

    fn project(tx: &mut (dyn Transaction + '_), name: &str) -> StableKey {
        let mut project = Project::new(name);
        project.assign_owner(UserId::new());
        tx.insert(project.into()).unwrap()
    }

    #[test]
    fn unknown_project_is_reported() {
        let store = InMemoryEntityStore::new();
        match export_project(&store, "Nope") {
            Err(TransferError::ProjectNotFound(name)) => assert_eq!(name, "Nope"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn only_owned_rows_are_exported() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().unwrap();
        let a = project(tx.as_mut(), "A");
        let b = project(tx.as_mut(), "B");
        tx.insert(Site::new(a, "Ridge").into()).unwrap();
        tx.insert(Site::new(b, "Valley").into()).unwrap();
        tx.insert(Site::new(b, "Marsh").into()).unwrap();
        tx.commit().unwrap();

        let doc = export_project(&store, "A").unwrap();
        assert_eq!(doc.sites.len(), 1);
        assert_eq!(doc.sites[0].name, "Ridge");
        assert_eq!(doc.export_tool.as_deref(), Some(EXPORT_TOOL));
    }

    #[test]
    fn shared_closure_follows_parents_and_links() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().unwrap();
        let key = project(tx.as_mut(), "A");
        let order = tx.insert(Taxon::new("Lepidoptera", "order").into()).unwrap();
        let mut family = Taxon::new("Noctuidae", "family");
        family.parent = Some(Ref::new(order));
        let family = tx.insert(family.into()).unwrap();
        let mut species = Taxon::new("Agrotis ipsilon", "species");
        species.parent = Some(Ref::new(family));
        let species = tx.insert(species.into()).unwrap();
        tx.insert(Taxon::new("Apis mellifera", "species").into()).unwrap();
        tx.link(key, EntityKind::Taxon, species).unwrap();
        tx.commit().unwrap();

        let doc = export_project(&store, "A").unwrap();
        let names: Vec<_> = doc.taxa.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Lepidoptera", "Noctuidae", "Agrotis ipsilon"]);
        assert!(check_document(&doc).is_clean());
    }

    #[test]
    fn owners_and_credentials_are_left_out() {
        let store = InMemoryEntityStore::new();
        let user = User::new("a@example.com");
        let mut tx = store.begin().unwrap();
        let mut p = Project::new("A");
        p.assign_owner(user.id);
        let key = tx.insert(p.into()).unwrap();
        let mut source = StorageSource::new(key, "bucket");
        source.access_key = Some("AKIA".into());
        source.secret_key = Some("hunter2".into());
        tx.insert(source.into()).unwrap();
        tx.commit().unwrap();

        let doc = export_project(&store, "A").unwrap();
        assert!(doc.project.owner.is_none());
        assert!(doc.project.members.is_empty());
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains(&user.id.to_string()));
    }

    #[test]
    fn reference_into_another_project_fails() {
        let store = InMemoryEntityStore::new();
        let mut tx = store.begin().unwrap();
        let a = project(tx.as_mut(), "A");
        let b = project(tx.as_mut(), "B");
        let foreign = tx.insert(Site::new(b, "Valley").into()).unwrap();
        let mut deployment = Deployment::new(a, "North");
        deployment.research_site = Some(Ref::new(foreign));
        tx.insert(deployment.into()).unwrap();
        tx.commit().unwrap();

        let err = export_project(&store, "A").unwrap_err();
        match &err {
            TransferError::Serialization { kind, field, reason, .. } => {
                assert_eq!(*kind, EntityKind::Deployment);
                assert_eq!(field, "research_site");
                assert!(reason.ends_with("outside project"), "{reason}");
            }
            other => panic!("expected serialization error, got {other:?}"),
        }
        // Exporting the other project is unaffected.
        assert_eq!(export_project(&store, "B").unwrap().sites.len(), 1);
    }

    proptest! {
        #[test]
        fn exports_are_closed(
            sites in prop::collection::vec(0usize..2, 0..6),
            deployments in prop::collection::vec((0usize..2, any::<Option<usize>>()), 0..8),
            taxa in 1usize..5,
            links in prop::collection::vec(any::<usize>(), 0..4),
        ) {
            let store = InMemoryEntityStore::new();
            let mut tx = store.begin().unwrap();
            let projects = [project(tx.as_mut(), "A"), project(tx.as_mut(), "B")];

            let mut site_keys: [Vec<StableKey>; 2] = [Vec::new(), Vec::new()];
            for (i, owner) in sites.into_iter().enumerate() {
                let key = tx.insert(Site::new(projects[owner], format!("Site {i}")).into()).unwrap();
                site_keys[owner].push(key);
            }
            for (i, (owner, pick)) in deployments.into_iter().enumerate() {
                let mut deployment = Deployment::new(projects[owner], format!("Deployment {i}"));
                let own = &site_keys[owner];
                if !own.is_empty() {
                    deployment.research_site = pick.map(|p| Ref::new(own[p % own.len()]));
                }
                tx.insert(deployment.into()).unwrap();
            }
            let mut taxon_keys = Vec::new();
            for t in 0..taxa {
                let mut taxon = Taxon::new(format!("Taxon {t}"), "species");
                taxon.parent = taxon_keys.last().copied().map(Ref::new);
                taxon_keys.push(tx.insert(taxon.into()).unwrap());
            }
            for pick in links {
                tx.link(projects[0], EntityKind::Taxon, taxon_keys[pick % taxa]).unwrap();
            }
            tx.commit().unwrap();

            let doc = export_project(&store, "A").unwrap();
            prop_assert!(check_document(&doc).is_clean());
            prop_assert!(doc.sites.iter().all(|s| s.project.key() == projects[0]));
            prop_assert!(doc.deployments.iter().all(|d| d.project.key() == projects[0]));
        }
    }
}
