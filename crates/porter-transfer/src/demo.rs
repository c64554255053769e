//! Synthetic demo project.
//!
//! Seeds one project with at least one record of every kind, for trying out
//! export and import and for producing reusable demo documents.

use chrono::{Duration, TimeZone, Utc};
use porter_graph::processing_order;
use porter_store::{EntityStore, Transaction};
use porter_types::{
    Algorithm, CategoryMap, Classification, Collection, Deployment, Detection, Device, Entity,
    EntityKind, Event, Identification, KindCounts, Occurrence, Pipeline, PipelineConfig,
    ProcessingService, Project, Record, Ref, Site, SourceImage, StableKey, StorageSource, Tag, TaxaList,
    Taxon, User,
};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::error::TransferResult;
use crate::naming::unique_project_name;

/// What [`create_demo_project`] wrote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DemoProject {
    pub key: StableKey,
    pub name: String,
    pub created: KindCounts,
}

/// Wraps a transaction and counts what it writes.
struct Seeder<'t, 's> {
    tx: &'t mut (dyn Transaction + 's),
    created: KindCounts,
}

impl Seeder<'_, '_> {
    fn insert(&mut self, entity: impl Into<Entity>) -> TransferResult<StableKey> {
        let entity = entity.into();
        let kind = entity.kind();
        let key = self.tx.insert(entity)?;
        self.created.increment(kind);
        Ok(key)
    }

    fn shared(&mut self, entity: impl Into<Entity>) -> TransferResult<StableKey> {
        let entity = entity.into();
        let kind = entity.kind();
        let fetched = self.tx.create_or_fetch(entity)?;
        if fetched.created {
            self.created.increment(kind);
        } else {
            debug!(%kind, key = %fetched.key, "demo reuses existing record");
        }
        Ok(fetched.key)
    }

    fn taxon(&mut self, name: &str, rank: &str, parent: Option<StableKey>) -> TransferResult<StableKey> {
        let mut taxon = Taxon::new(name, rank);
        taxon.parent = parent.map(Ref::new);
        self.shared(taxon)
    }
}

/// Create a demo project owned by `owner`. A taken name gets a numeric
/// suffix; shared records already in the store are reused.
pub fn create_demo_project<S: EntityStore + ?Sized>(
    store: &S,
    owner: &User,
    name: &str,
) -> TransferResult<DemoProject> {
    let mut tx = store.begin()?;
    let name = unique_project_name(&*tx, name)?;
    let mut seeder = Seeder {
        tx: tx.as_mut(),
        created: KindCounts::new(),
    };

    let mut project = Project::new(&name);
    project.description = "Synthetic light-trap survey for trying out export and import".into();
    project.is_draft = false;
    project.default_event_time_threshold = Some(120);
    project.created_at = Some(Utc::now());
    project.assign_owner(owner.id);
    let project = seeder.insert(project)?;

    let mut site = Site::new(project, "Vermont Ridge");
    site.latitude = Some(44.4759);
    site.longitude = Some(-73.2121);
    site.elevation = Some(310.0);
    let site = seeder.insert(site)?;

    let mut device = Device::new(project, "Light trap 1");
    device.hardware_version = "AMI-2".into();
    let device = seeder.insert(device)?;

    let mut bucket = StorageSource::new(project, "Demo bucket");
    bucket.endpoint_url = "https://storage.example.org".into();
    bucket.bucket = "demo-captures".into();
    bucket.public_base_url = "https://storage.example.org/demo-captures".into();
    let bucket = seeder.insert(bucket)?;

    let mut deployment = Deployment::new(project, "Ridge station");
    deployment.research_site = Some(Ref::new(site));
    deployment.device = Some(Ref::new(device));
    deployment.data_source = Some(Ref::new(bucket));
    deployment.data_source_regex = r".*\.jpg".into();
    let deployment = seeder.insert(deployment)?;

    let night = Utc
        .with_ymd_and_hms(2024, 6, 1, 22, 0, 0)
        .single()
        .unwrap_or_else(Utc::now);
    let mut event = Event::new(project, deployment, "2024-06-01");
    event.start = Some(night);
    event.end = Some(night + Duration::hours(6));
    let event = seeder.insert(event)?;

    let mut images = Vec::new();
    for i in 0..3i64 {
        let taken = night + Duration::minutes(30 * i);
        let mut image = SourceImage::new(
            project,
            deployment,
            format!("2024/06/01/{}.jpg", taken.format("%H%M%S")),
        );
        image.event = Some(Ref::new(event));
        image.timestamp = Some(taken);
        image.width = Some(4096);
        image.height = Some(2160);
        images.push(seeder.insert(image)?);
    }

    let mut sample = Collection::new(project, "First night sample");
    sample.method = Some("random".into());
    sample.kwargs = Some(json!({"size": images.len()}));
    sample.images = images.iter().copied().map(Ref::new).collect();
    seeder.insert(sample)?;

    let order = seeder.taxon("Lepidoptera", "order", None)?;
    let family = seeder.taxon("Noctuidae", "family", Some(order))?;
    let moth = seeder.taxon("Agrotis ipsilon", "species", Some(family))?;
    let bee = seeder.taxon("Apis mellifera", "species", None)?;
    let taxa = [order, family, moth, bee];
    for taxon in taxa {
        seeder.tx.link(project, EntityKind::Taxon, taxon)?;
    }

    seeder.insert(TaxaList {
        id: StableKey::UNASSIGNED,
        project: Ref::new(project),
        name: "Vermont moths".into(),
        description: String::new(),
        taxa: [order, family, moth].into_iter().map(Ref::new).collect(),
    })?;
    seeder.insert(Tag {
        id: StableKey::UNASSIGNED,
        project: Ref::new(project),
        name: "Pollinators".into(),
        description: String::new(),
        color: "#f2c14e".into(),
        taxa: vec![Ref::new(bee)],
    })?;

    let labels = vec!["Agrotis ipsilon".to_string(), "Apis mellifera".to_string()];
    let category_map = seeder.shared(CategoryMap {
        id: StableKey::UNASSIGNED,
        data: json!([
            {"index": 0, "label": labels[0], "gbif_key": 5109945},
            {"index": 1, "label": labels[1], "gbif_key": 1341976},
        ]),
        labels,
    })?;
    let detector = seeder.shared(Algorithm {
        id: StableKey::UNASSIGNED,
        name: "Moth detector".into(),
        key: "moth-detector".into(),
        version: 1,
        task_type: "detection".into(),
        category_map: None,
    })?;
    let classifier = seeder.shared(Algorithm {
        id: StableKey::UNASSIGNED,
        name: "Vermont species classifier".into(),
        key: "vermont-species-classifier".into(),
        version: 1,
        task_type: "classification".into(),
        category_map: Some(Ref::new(category_map)),
    })?;
    let pipeline = seeder.shared(Pipeline {
        id: StableKey::UNASSIGNED,
        name: "Vermont moths".into(),
        slug: "vermont-moths".into(),
        version: 1,
        default_config: Some(json!({"detection_threshold": 0.5})),
        algorithms: vec![Ref::new(detector), Ref::new(classifier)],
    })?;
    let service = seeder.shared(ProcessingService {
        id: StableKey::UNASSIGNED,
        name: "Local ML backend".into(),
        endpoint_url: "http://ml-backend:2000".into(),
    })?;
    seeder.tx.link(project, EntityKind::ProcessingService, service)?;
    seeder.insert(PipelineConfig {
        id: StableKey::UNASSIGNED,
        project: Ref::new(project),
        pipeline: Ref::new(pipeline),
        enabled: true,
        config: None,
    })?;

    let mut predictions = Vec::new();
    let mut occurrences = Vec::new();
    for (i, image) in images.iter().enumerate() {
        let taxon = if i % 2 == 0 { moth } else { bee };
        let score = 0.9 - 0.1 * i as f64;
        let occurrence = seeder.insert(Occurrence {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            event: Ref::new(event),
            deployment: Ref::new(deployment),
            determination: Some(Ref::new(taxon)),
            determination_score: Some(score),
        })?;
        let detection = seeder.insert(Detection {
            id: StableKey::UNASSIGNED,
            source_image: Ref::new(*image),
            occurrence: Some(Ref::new(occurrence)),
            detection_algorithm: Some(Ref::new(detector)),
            bbox: Some(vec![100.0, 120.0, 340.0, 300.0]),
            path: Some(format!("crops/{i}.jpg")),
            timestamp: None,
            frame_num: None,
            detection_score: Some(0.95),
        })?;
        predictions.push(seeder.insert(Classification {
            id: StableKey::UNASSIGNED,
            detection: Ref::new(detection),
            taxon: Some(Ref::new(taxon)),
            algorithm: Some(Ref::new(classifier)),
            category_map: Some(Ref::new(category_map)),
            score: Some(score),
            timestamp: None,
        })?);
        occurrences.push((occurrence, taxon));
    }

    let (first_occurrence, first_taxon) = occurrences[0];
    let confirmed = seeder.insert(Identification {
        id: StableKey::UNASSIGNED,
        occurrence: Ref::new(first_occurrence),
        taxon: Some(Ref::new(first_taxon)),
        agreed_with_identification: None,
        agreed_with_prediction: Some(Ref::new(predictions[0])),
        withdrawn: false,
        remarks: "Clear forewing markings".into(),
        created_at: Some(Utc::now()),
        author: Some(owner.id),
    })?;
    seeder.insert(Identification {
        id: StableKey::UNASSIGNED,
        occurrence: Ref::new(first_occurrence),
        taxon: Some(Ref::new(first_taxon)),
        agreed_with_identification: Some(Ref::new(confirmed)),
        agreed_with_prediction: None,
        withdrawn: false,
        remarks: String::new(),
        created_at: Some(Utc::now()),
        author: Some(owner.id),
    })?;

    let created = seeder.created;
    tx.commit()?;
    info!(project = %name, records = created.total(), "created demo project");
    Ok(DemoProject {
        key: project,
        name,
        created,
    })
}

/// Delete every record in the store, children first. User accounts stay.
pub fn delete_all_data<S: EntityStore + ?Sized>(store: &S) -> TransferResult<KindCounts> {
    let mut tx = store.begin()?;
    let mut deleted = KindCounts::new();
    for kind in processing_order()?.into_iter().rev() {
        for entity in tx.scan(kind)? {
            if tx.delete(kind, entity.key())? {
                deleted.increment(kind);
            }
        }
        if deleted.get(kind) > 0 {
            info!(%kind, count = deleted.get(kind), "deleted");
        }
    }
    tx.commit()?;
    Ok(deleted)
}
