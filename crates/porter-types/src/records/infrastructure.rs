use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::reference::{Ref, RefVisitor, RefWalker};

use super::{Project, Record};

/// A research site where devices are deployed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation: Option<f64>,
}

impl Site {
    pub fn new(project: StableKey, name: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            name: name.into(),
            description: String::new(),
            latitude: None,
            longitude: None,
            elevation: None,
        }
    }
}

/// A capture device (camera trap, light trap station).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub hardware_version: String,
    #[serde(default)]
    pub software_version: String,
}

impl Device {
    pub fn new(project: StableKey, name: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            name: name.into(),
            description: String::new(),
            hardware_version: String::new(),
            software_version: String::new(),
        }
    }
}

/// An S3-compatible bucket images are read from.
///
/// Access credentials stay in the source database; they are cleared by
/// [`Record::redact`] and therefore absent from export documents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageSource {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub public_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

impl StorageSource {
    pub fn new(project: StableKey, name: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            name: name.into(),
            endpoint_url: String::new(),
            bucket: String::new(),
            prefix: String::new(),
            public_base_url: String::new(),
            access_key: None,
            secret_key: None,
        }
    }
}

/// A device installed at a site for a period of time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: StableKey,
    pub project: Ref<Project>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub research_site: Option<Ref<Site>>,
    #[serde(default)]
    pub device: Option<Ref<Device>>,
    #[serde(default)]
    pub data_source: Option<Ref<StorageSource>>,
    #[serde(default)]
    pub data_source_subdir: String,
    #[serde(default)]
    pub data_source_regex: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Deployment {
    pub fn new(project: StableKey, name: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            project: Ref::new(project),
            name: name.into(),
            description: String::new(),
            research_site: None,
            device: None,
            data_source: None,
            data_source_subdir: String::new(),
            data_source_regex: String::new(),
            latitude: None,
            longitude: None,
        }
    }
}

impl Record for Site {
    const KIND: EntityKind = EntityKind::Site;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl Record for Device {
    const KIND: EntityKind = EntityKind::Device;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl Record for StorageSource {
    const KIND: EntityKind = EntityKind::StorageSource;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }

    fn redact(&mut self) {
        self.access_key = None;
        self.secret_key = None;
    }
}

impl Record for Deployment {
    const KIND: EntityKind = EntityKind::Deployment;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, visitor: &mut V) -> Result<(), V::Error> {
        let mut walker = RefWalker::new(visitor, Self::KIND, self.id);
        walker.required("project", &mut self.project)?;
        walker.optional("research_site", &mut self.research_site)?;
        walker.optional("device", &mut self.device)?;
        walker.optional("data_source", &mut self.data_source)
    }

    fn scope(&self) -> Option<(EntityKind, StableKey)> {
        Some((EntityKind::Project, self.project.key()))
    }
}

impl From<Site> for Entity {
    fn from(record: Site) -> Self {
        Entity::Site(record)
    }
}

impl From<Device> for Entity {
    fn from(record: Device) -> Self {
        Entity::Device(record)
    }
}

impl From<StorageSource> for Entity {
    fn from(record: StorageSource) -> Self {
        Entity::StorageSource(record)
    }
}

impl From<Deployment> for Entity {
    fn from(record: Deployment) -> Self {
        Entity::Deployment(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_lists_all_references() {
        let mut deployment = Deployment::new(StableKey::new(1), "North field");
        deployment.research_site = Some(Ref::new(StableKey::new(2)));
        deployment.data_source = Some(Ref::new(StableKey::new(3)));

        let slots = deployment.references();
        let fields: Vec<_> = slots.iter().map(|s| (s.field, s.target)).collect();
        assert_eq!(
            fields,
            vec![
                ("project", EntityKind::Project),
                ("research_site", EntityKind::Site),
                ("data_source", EntityKind::StorageSource),
            ]
        );
        assert!(slots[0].required);
        assert!(!slots[1].required);
    }

    #[test]
    fn storage_credentials_are_redacted() {
        let mut source = StorageSource::new(StableKey::new(1), "bucket");
        source.access_key = Some("AKIA".into());
        source.secret_key = Some("hunter2".into());
        source.redact();

        let json = serde_json::to_string(&source).unwrap();
        assert!(!json.contains("access_key"));
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn site_scope_is_project() {
        let site = Site::new(StableKey::new(4), "Ridge");
        assert_eq!(site.scope(), Some((EntityKind::Project, StableKey::new(4))));
    }
}
