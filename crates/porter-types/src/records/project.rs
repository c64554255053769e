use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::Entity;
use crate::identity::UserId;
use crate::key::StableKey;
use crate::kind::EntityKind;
use crate::reference::RefVisitor;

use super::Record;

/// The top-level ownership boundary. All exported data is scoped to one
/// project.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: StableKey,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_draft")]
    pub is_draft: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub image_base_url: String,
    #[serde(default)]
    pub default_event_method: Option<String>,
    /// Minutes of inactivity that split two capture events.
    #[serde(default)]
    pub default_event_time_threshold: Option<i64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub default_filters: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<UserId>,
}

fn default_draft() -> bool {
    true
}

impl Project {
    /// A draft project with the given name and no other content.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StableKey::UNASSIGNED,
            name: name.into(),
            description: String::new(),
            is_draft: true,
            priority: 0,
            image_base_url: String::new(),
            default_event_method: None,
            default_event_time_threshold: None,
            summary: String::new(),
            details: String::new(),
            default_filters: None,
            created_at: None,
            updated_at: None,
            owner: None,
            members: Vec::new(),
        }
    }
}

impl Record for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn key(&self) -> StableKey {
        self.id
    }

    fn set_key(&mut self, key: StableKey) {
        self.id = key;
    }

    fn visit_refs<V: RefVisitor>(&mut self, _visitor: &mut V) -> Result<(), V::Error> {
        Ok(())
    }

    fn redact(&mut self) {
        self.owner = None;
        self.members.clear();
    }

    fn assign_owner(&mut self, user: UserId) {
        self.owner = Some(user);
        self.members = vec![user];
    }
}

impl From<Project> for Entity {
    fn from(record: Project) -> Self {
        Entity::Project(record)
    }
}
