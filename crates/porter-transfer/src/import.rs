//! Project importer.
//!
//! An import run moves through
//!
//! ```text
//! Validating -> Walking(kind) ... -> Committing -> Done
//!      \              \                  \
//!       +--------------+------------------+--> Aborted
//! ```
//!
//! All writes go through one [`Transaction`](porter_store::Transaction).
//! An aborted run drops it, which discards every write made so far.

use std::collections::BTreeSet;
use std::fmt;

use porter_graph::{check_document, DependencyGraph};
use porter_store::{EntityStore, IdentityProvider, Transaction};
use porter_types::{Document, Entity, EntityKind, KindCounts, Record, StableKey, User, SUPPORTED_VERSIONS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dedup::{DuplicateIndex, DuplicatePolicy};
use crate::error::{record_path, TransferError, TransferResult};
use crate::naming::unique_project_name;
use crate::remap::{RemapTable, RemapVisitor};

/// Kinds dropped by `skip_images`, before closing over required edges.
const IMAGE_KINDS: [EntityKind; 2] = [EntityKind::SourceImage, EntityKind::Collection];

/// Kinds dropped by `skip_ml_data`.
const ML_DATA_KINDS: [EntityKind; 4] = [
    EntityKind::Detection,
    EntityKind::Classification,
    EntityKind::Occurrence,
    EntityKind::Identification,
];

/// Caller-selected import behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    /// Name for the new project. Defaults to the document's project name.
    pub project_name: Option<String>,
    pub skip_images: bool,
    pub skip_ml_data: bool,
    pub duplicate_policy: DuplicatePolicy,
}

impl ImportOptions {
    /// Kinds the caller asked to leave out.
    pub fn skipped_roots(&self) -> BTreeSet<EntityKind> {
        let mut roots = BTreeSet::new();
        if self.skip_images {
            roots.extend(IMAGE_KINDS);
        }
        if self.skip_ml_data {
            roots.extend(ML_DATA_KINDS);
        }
        roots
    }
}

/// States of an import run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "kind", rename_all = "snake_case")]
pub enum ImportPhase {
    Validating,
    Walking(EntityKind),
    Committing,
    Done,
    Aborted,
}

impl ImportPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::Walking(kind) => write!(f, "walking {kind}"),
            Self::Committing => f.write_str("committing"),
            Self::Done => f.write_str("done"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

/// Outcome of a successful import.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub project_key: StableKey,
    pub project_name: String,
    /// Email of the importing user, now the project's owner.
    pub user: String,
    /// Rows created, per kind.
    pub created: KindCounts,
    /// Shared records resolved to an existing row, per kind.
    pub reused: KindCounts,
    /// Kinds left out by the selectors, including dependents.
    pub skipped: Vec<EntityKind>,
    /// Phases the run passed through.
    pub phases: Vec<ImportPhase>,
}

impl ImportReport {
    /// Records taken from the document, created or reused.
    pub fn imported(&self) -> KindCounts {
        EntityKind::ALL
            .into_iter()
            .map(|kind| (kind, self.created.get(kind) + self.reused.get(kind)))
            .collect()
    }
}

/// Import `document` into `store` as a new project owned by the user with
/// the given email.
///
/// Either every record is written or, on any error, none is.
pub fn import_document<S, I>(
    store: &S,
    identities: &I,
    document: &Document,
    email: &str,
    options: &ImportOptions,
) -> TransferResult<ImportReport>
where
    S: EntityStore + ?Sized,
    I: IdentityProvider + ?Sized,
{
    let mut run = ImportRun::new(document, options);
    match run.execute(store, identities, email) {
        Ok(report) => Ok(report),
        Err(err) => {
            run.enter(ImportPhase::Aborted);
            warn!(error = %err, project = %document.project.name, "import aborted, nothing written");
            Err(err)
        }
    }
}

struct ImportRun<'d> {
    document: &'d Document,
    options: &'d ImportOptions,
    phases: Vec<ImportPhase>,
    remap: RemapTable,
    created: KindCounts,
    reused: KindCounts,
}

impl<'d> ImportRun<'d> {
    fn new(document: &'d Document, options: &'d ImportOptions) -> Self {
        Self {
            document,
            options,
            phases: Vec::new(),
            remap: RemapTable::new(),
            created: KindCounts::new(),
            reused: KindCounts::new(),
        }
    }

    fn enter(&mut self, phase: ImportPhase) {
        debug!(from = ?self.phases.last(), to = %phase, "import phase");
        self.phases.push(phase);
    }

    fn execute<S, I>(&mut self, store: &S, identities: &I, email: &str) -> TransferResult<ImportReport>
    where
        S: EntityStore + ?Sized,
        I: IdentityProvider + ?Sized,
    {
        self.enter(ImportPhase::Validating);
        let user = self.validate(identities, email)?;
        let graph = DependencyGraph::standard();
        let order = graph.topological_order()?;
        let skipped = graph.skipped_closure(&self.options.skipped_roots());

        let mut tx = store.begin()?;
        let (project_key, project_name) = self.create_project(tx.as_mut(), &user)?;

        let mut duplicates = DuplicateIndex::new(self.options.duplicate_policy);
        for kind in order {
            if kind == EntityKind::Project || skipped.contains(&kind) {
                continue;
            }
            self.enter(ImportPhase::Walking(kind));
            self.walk(tx.as_mut(), kind, &user, project_key, &skipped, &mut duplicates)?;
        }

        self.enter(ImportPhase::Committing);
        tx.commit()?;
        self.enter(ImportPhase::Done);

        for (kind, count) in self.created.iter() {
            info!(project = %project_name, %kind, count, "created");
        }
        for (kind, count) in self.reused.iter() {
            info!(project = %project_name, %kind, count, "reused existing");
        }

        Ok(ImportReport {
            project_key,
            project_name,
            user: user.email,
            created: self.created.clone(),
            reused: self.reused.clone(),
            skipped: skipped.into_iter().collect(),
            phases: self.phases.clone(),
        })
    }

    /// Version, importing user and document integrity.
    fn validate<I: IdentityProvider + ?Sized>(&self, identities: &I, email: &str) -> TransferResult<User> {
        let version = &self.document.export_version;
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(TransferError::VersionMismatch {
                found: version.clone(),
                supported: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
            });
        }

        let user = identities
            .resolve(email)?
            .ok_or_else(|| TransferError::UserNotFound(email.to_string()))?;

        let report = check_document(self.document);
        if let Some(&(kind, key)) = report.duplicate_keys.first() {
            return Err(TransferError::malformed(record_path(kind, key), "duplicate stable key"));
        }
        if let Some(dangling) = report.dangling.first() {
            return Err(TransferError::malformed(
                format!("{}.{}", record_path(dangling.kind, dangling.key), dangling.field),
                format!("references missing {} #{}", dangling.target, dangling.target_key),
            ));
        }
        debug!(records = report.records, references = report.references, "document is closed");
        Ok(user)
    }

    fn create_project(&mut self, tx: &mut (dyn Transaction + '_), user: &User) -> TransferResult<(StableKey, String)> {
        self.enter(ImportPhase::Walking(EntityKind::Project));
        let document = self.document;
        let source = &document.project;
        let requested = self
            .options
            .project_name
            .clone()
            .unwrap_or_else(|| source.name.clone());
        let name = unique_project_name(&*tx, &requested)?;
        if name != requested {
            warn!(requested = %requested, assigned = %name, "project name taken, renamed");
        }

        let mut project = source.clone();
        project.name = name.clone();
        project.assign_owner(user.id);
        let key = tx.insert(project.into())?;
        self.remap.record(EntityKind::Project, source.id, key)?;
        self.created.increment(EntityKind::Project);
        debug!(%key, %name, "created project");
        Ok((key, name))
    }

    /// Write every record of one kind.
    ///
    /// References to the kind itself are left empty on the first pass and
    /// filled in afterwards, once every record of the kind has a new key.
    fn walk(
        &mut self,
        tx: &mut (dyn Transaction + '_),
        kind: EntityKind,
        user: &User,
        project: StableKey,
        skipped: &BTreeSet<EntityKind>,
        duplicates: &mut DuplicateIndex,
    ) -> TransferResult<()> {
        let mut deferred: Vec<(Entity, StableKey)> = Vec::new();

        for original in self.document.records(kind) {
            let mut entity = original.clone();
            let mut visitor = RemapVisitor::first_pass(&self.remap, skipped);
            entity.visit_refs(&mut visitor)?;
            let has_deferred = visitor.deferred > 0;
            entity.assign_owner(user.id);

            let (key, created) = if kind.is_shared() {
                let resolution = duplicates.resolve(tx, entity)?;
                if kind.is_linked() {
                    tx.link(project, kind, resolution.key)?;
                }
                (resolution.key, resolution.created)
            } else {
                (tx.insert(entity)?, true)
            };

            self.remap.record(kind, original.key(), key)?;
            if created {
                self.created.increment(kind);
                if has_deferred {
                    deferred.push((original, key));
                }
            } else {
                self.reused.increment(kind);
            }
        }

        for (mut entity, key) in deferred {
            entity.set_key(key);
            let mut visitor = RemapVisitor::second_pass(&self.remap, skipped);
            entity.visit_refs(&mut visitor)?;
            entity.assign_owner(user.id);
            tx.update(entity)?;
        }

        if kind.is_shared() && duplicates.is_strict() {
            let settled = self
                .document
                .records(kind)
                .into_iter()
                .map(|mut entity| -> TransferResult<Entity> {
                    entity.visit_refs(&mut RemapVisitor::second_pass(&self.remap, skipped))?;
                    entity.assign_owner(user.id);
                    Ok(entity)
                })
                .collect::<TransferResult<Vec<_>>>()?;
            duplicates.check_settled(settled)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use porter_store::{EntityReader, InMemoryEntityStore, ReaderExt};
    use porter_types::{
        Classification, Detection, Identification, Occurrence, ProcessingService, Project, Ref, Site,
        Taxon, UserId,
    };

    use super::*;
    use crate::demo::create_demo_project;
    use crate::export::export_project;

    const EMAIL: &str = "a@example.com";

    fn key(n: u64) -> StableKey {
        StableKey::new(n)
    }

    fn store_with_user() -> (InMemoryEntityStore, User) {
        let store = InMemoryEntityStore::new();
        let user = store.register_user(EMAIL).unwrap();
        (store, user)
    }

    fn demo_document() -> Document {
        let (source, owner) = store_with_user();
        create_demo_project(&source, &owner, "Demo").unwrap();
        export_project(&source, "Demo").unwrap()
    }

    fn small_document() -> Document {
        let mut project = Project::new("Demo");
        project.id = key(1);
        let mut doc = Document::new(project);
        let mut site = Site::new(key(1), "Ridge");
        site.id = key(1);
        doc.push(site.into());
        let mut taxon = Taxon::new("Apis mellifera", "species");
        taxon.id = key(1);
        doc.push(taxon.into());
        doc
    }

    fn import(store: &InMemoryEntityStore, doc: &Document, options: &ImportOptions) -> TransferResult<ImportReport> {
        import_document(store, store, doc, EMAIL, options)
    }

    #[test]
    fn round_trip_preserves_counts() {
        let doc = demo_document();
        let (target, _) = store_with_user();
        let report = import(&target, &doc, &ImportOptions::default()).unwrap();
        assert_eq!(report.project_name, "Demo");
        assert_eq!(report.imported(), doc.summary());

        let again = export_project(&target, "Demo").unwrap();
        assert_eq!(again.summary(), doc.summary());
    }

    #[test]
    fn same_document_twice_renames_and_shares_taxon() {
        let (store, _) = store_with_user();
        let doc = small_document();

        let first = import(&store, &doc, &ImportOptions::default()).unwrap();
        let second = import(&store, &doc, &ImportOptions::default()).unwrap();

        assert_eq!(first.project_name, "Demo");
        assert_eq!(second.project_name, "Demo (1)");
        assert_eq!(store.count(EntityKind::Taxon).unwrap(), 1);
        assert_eq!(store.count(EntityKind::Site).unwrap(), 2);
        assert_eq!(second.reused.get(EntityKind::Taxon), 1);
        assert_eq!(second.created.get(EntityKind::Taxon), 0);

        let taxon = store.scan(EntityKind::Taxon).unwrap()[0].key();
        for report in [&first, &second] {
            assert_eq!(store.linked(report.project_key, EntityKind::Taxon).unwrap(), vec![taxon]);
        }
    }

    #[test]
    fn shared_records_are_deduplicated_across_imports() {
        let doc = demo_document();
        let (store, _) = store_with_user();
        import(&store, &doc, &ImportOptions::default()).unwrap();
        let second = import(&store, &doc, &ImportOptions::default()).unwrap();

        for kind in EntityKind::ALL.into_iter().filter(|k| k.is_shared()) {
            assert_eq!(store.count(kind).unwrap(), doc.len(kind), "{kind}");
            assert_eq!(second.created.get(kind), 0, "{kind}");
        }
        assert_eq!(store.count(EntityKind::Site).unwrap(), 2 * doc.len(EntityKind::Site));
    }

    #[test]
    fn phases_are_recorded_in_order() {
        let (store, _) = store_with_user();
        let report = import(&store, &small_document(), &ImportOptions::default()).unwrap();
        assert_eq!(report.phases.first(), Some(&ImportPhase::Validating));
        assert_eq!(report.phases[1], ImportPhase::Walking(EntityKind::Project));
        assert_eq!(report.phases.last(), Some(&ImportPhase::Done));
        assert!(report.phases.contains(&ImportPhase::Committing));
        assert!(!report.phases.contains(&ImportPhase::Aborted));
        assert_eq!(report.phases.iter().filter(|p| p.is_terminal()).count(), 1);
    }

    #[test]
    fn owner_fields_point_at_importing_user() {
        let mut doc = demo_document();
        let stranger = UserId::new();
        doc.project.assign_owner(stranger);
        for identification in &mut doc.identifications {
            identification.author = Some(stranger);
        }
        assert!(!doc.identifications.is_empty());

        let (store, user) = store_with_user();
        let report = import(&store, &doc, &ImportOptions::default()).unwrap();

        let project = store.get_record::<Project>(report.project_key).unwrap().unwrap();
        assert_eq!(project.owner, Some(user.id));
        assert_eq!(project.members, vec![user.id]);
        for identification in store.scan_records::<Identification>().unwrap() {
            assert_eq!(identification.author, Some(user.id));
        }
    }

    #[test]
    fn taxon_hierarchy_is_relinked() {
        let doc = demo_document();
        let (store, _) = store_with_user();
        import(&store, &doc, &ImportOptions::default()).unwrap();

        let taxa = store.scan_records::<Taxon>().unwrap();
        let by_name = |name: &str| taxa.iter().find(|t| t.name == name).unwrap();
        let species = by_name("Agrotis ipsilon");
        let family = by_name("Noctuidae");
        assert_eq!(species.parent, Some(Ref::new(family.id)));
        assert_eq!(family.parent, Some(Ref::new(by_name("Lepidoptera").id)));
    }

    #[test]
    fn skip_images_drops_dependents() {
        let doc = demo_document();
        let (store, _) = store_with_user();
        let options = ImportOptions {
            skip_images: true,
            ..Default::default()
        };
        let report = import(&store, &doc, &options).unwrap();

        for kind in [
            EntityKind::SourceImage,
            EntityKind::Collection,
            EntityKind::Detection,
            EntityKind::Classification,
        ] {
            assert!(report.skipped.contains(&kind), "{kind}");
            assert_eq!(store.count(kind).unwrap(), 0, "{kind}");
        }
        assert_eq!(store.count(EntityKind::Occurrence).unwrap(), doc.len(EntityKind::Occurrence));
        for identification in store.scan_records::<Identification>().unwrap() {
            assert!(identification.agreed_with_prediction.is_none());
        }
    }

    #[test]
    fn skip_ml_data_keeps_structure() {
        let doc = demo_document();
        let (store, _) = store_with_user();
        let options = ImportOptions {
            skip_ml_data: true,
            ..Default::default()
        };
        import(&store, &doc, &options).unwrap();

        assert_eq!(store.count(EntityKind::Detection).unwrap(), 0);
        assert_eq!(store.count(EntityKind::Occurrence).unwrap(), 0);
        assert_eq!(store.count(EntityKind::SourceImage).unwrap(), doc.len(EntityKind::SourceImage));
        assert_eq!(store.count(EntityKind::Algorithm).unwrap(), doc.len(EntityKind::Algorithm));
        assert_eq!(store.count(EntityKind::Pipeline).unwrap(), doc.len(EntityKind::Pipeline));
    }

    #[test]
    fn late_failure_leaves_store_untouched() {
        let mut doc = demo_document();
        let mut clash = doc.processing_services[0].clone();
        clash.id = key(999);
        clash.name = "Someone else's".into();
        doc.processing_services.push(clash);

        let (store, _) = store_with_user();
        let options = ImportOptions {
            duplicate_policy: DuplicatePolicy::Strict,
            ..Default::default()
        };
        let err = import(&store, &doc, &options).unwrap_err();
        assert!(matches!(err, TransferError::DuplicateConflict { .. }), "{err:?}");

        assert!(store.find_project("Demo").unwrap().is_none());
        for kind in EntityKind::ALL {
            assert_eq!(store.count(kind).unwrap(), 0, "{kind}");
        }

        // The same document imports cleanly under the default policy.
        let report = import(&store, &doc, &ImportOptions::default()).unwrap();
        assert_eq!(report.project_name, "Demo");
    }

    #[test]
    fn unknown_user_is_rejected_before_writing() {
        let store = InMemoryEntityStore::new();
        let err = import(&store, &small_document(), &ImportOptions::default()).unwrap_err();
        assert!(matches!(&err, TransferError::UserNotFound(email) if email == EMAIL));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let (store, _) = store_with_user();
        let mut doc = small_document();
        doc.export_version = "2.0".into();
        let err = import(&store, &doc, &ImportOptions::default()).unwrap_err();
        assert!(matches!(err, TransferError::VersionMismatch { .. }));
        for kind in EntityKind::ALL {
            assert_eq!(store.count(kind).unwrap(), 0, "{kind}");
        }
    }

    #[test]
    fn dangling_reference_reports_field_path() {
        let (store, _) = store_with_user();
        let mut doc = demo_document();
        let detection = doc
            .detections
            .iter_mut()
            .find(|d| d.occurrence.is_some())
            .unwrap();
        detection.occurrence = Some(Ref::new(key(4040)));
        let id = detection.id;

        match import(&store, &doc, &ImportOptions::default()) {
            Err(TransferError::MalformedDocument { path, reason }) => {
                assert_eq!(path, format!("detections[id={id}].occurrence"));
                assert_eq!(reason, "references missing occurrence #4040");
            }
            other => panic!("expected malformed, got {other:?}"),
        }
        for kind in EntityKind::ALL {
            assert_eq!(store.count(kind).unwrap(), 0, "{kind}");
        }
    }

    fn taxon(id: u64, name: &str, parent: Option<u64>) -> Taxon {
        let mut taxon = Taxon::new(name, "genus");
        taxon.id = key(id);
        taxon.parent = parent.map(|p| Ref::new(key(p)));
        taxon
    }

    #[test]
    fn strict_rejects_taxa_with_different_parents() {
        let mut doc = small_document();
        doc.push(taxon(10, "Noctuidae", None).into());
        doc.push(taxon(11, "Erebidae", None).into());
        doc.push(taxon(12, "Agrotis", Some(10)).into());
        doc.push(taxon(13, "Agrotis", Some(11)).into());

        let (store, _) = store_with_user();
        let strict = ImportOptions {
            duplicate_policy: DuplicatePolicy::Strict,
            ..Default::default()
        };
        let err = import(&store, &doc, &strict).unwrap_err();
        assert!(matches!(err, TransferError::DuplicateConflict { .. }), "{err:?}");
        for kind in EntityKind::ALL {
            assert_eq!(store.count(kind).unwrap(), 0, "{kind}");
        }

        import(&store, &doc, &ImportOptions::default()).unwrap();
        let taxa = store.scan_records::<Taxon>().unwrap();
        let agrotis: Vec<_> = taxa.iter().filter(|t| t.name == "Agrotis").collect();
        assert_eq!(agrotis.len(), 1);
        let noctuidae = taxa.iter().find(|t| t.name == "Noctuidae").unwrap();
        assert_eq!(agrotis[0].parent, Some(Ref::new(noctuidae.id)));
    }

    #[test]
    fn strict_accepts_parents_that_collapse_to_one_row() {
        let mut doc = small_document();
        doc.push(taxon(10, "Noctuidae", None).into());
        doc.push(taxon(11, "Noctuidae", None).into());
        doc.push(taxon(12, "Agrotis", Some(10)).into());
        doc.push(taxon(13, "Agrotis", Some(11)).into());

        let (store, _) = store_with_user();
        let strict = ImportOptions {
            duplicate_policy: DuplicatePolicy::Strict,
            ..Default::default()
        };
        import(&store, &doc, &strict).unwrap();
        assert_eq!(store.count(EntityKind::Taxon).unwrap(), 3);
    }

    #[test]
    fn reused_taxa_keep_their_stored_hierarchy() {
        let (store, _) = store_with_user();
        let mut earlier = small_document();
        earlier.push(taxon(12, "Agrotis", None).into());
        import(&store, &earlier, &ImportOptions::default()).unwrap();

        let mut later = small_document();
        later.push(taxon(10, "Noctuidae", None).into());
        later.push(taxon(12, "Agrotis", Some(10)).into());
        let report = import(&store, &later, &ImportOptions::default()).unwrap();
        assert_eq!(report.reused.get(EntityKind::Taxon), 2);
        assert_eq!(report.created.get(EntityKind::Taxon), 1);

        let agrotis = store
            .scan_records::<Taxon>()
            .unwrap()
            .into_iter()
            .find(|t| t.name == "Agrotis")
            .unwrap();
        assert_eq!(agrotis.parent, None);
    }

    #[test]
    fn project_name_override() {
        let (store, _) = store_with_user();
        let options = ImportOptions {
            project_name: Some("Field season".into()),
            ..Default::default()
        };
        let report = import(&store, &small_document(), &options).unwrap();
        assert_eq!(report.project_name, "Field season");
        assert!(store.find_project("Field season").unwrap().is_some());
    }

    #[test]
    fn references_point_at_new_rows() {
        let doc = demo_document();
        let (store, _) = store_with_user();
        // Pre-existing rows shift the keys the import receives.
        let mut tx = store.begin().unwrap();
        let other = tx.insert(Project::new("Other").into()).unwrap();
        tx.insert(Site::new(other, "Elsewhere").into()).unwrap();
        tx.commit().unwrap();

        let report = import(&store, &doc, &ImportOptions::default()).unwrap();
        let sites: Vec<Site> = store.scan_records::<Site>().unwrap();
        assert!(sites.iter().filter(|s| s.name != "Elsewhere").all(|s| s.project.key() == report.project_key));

        for classification in store.scan_records::<Classification>().unwrap() {
            let detection = store.get_record::<Detection>(classification.detection.key()).unwrap();
            assert!(detection.is_some());
        }
        for occurrence in store.scan_records::<Occurrence>().unwrap() {
            assert_eq!(occurrence.project.key(), report.project_key);
        }
        assert_eq!(
            store.scan_records::<ProcessingService>().unwrap().len(),
            doc.processing_services.len()
        );
    }
}
