use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kind::EntityKind;

/// Domain tag prepended to category map content before hashing.
const CATEGORY_MAP_DOMAIN: &str = "porter-category-map-v1";

/// Content-derived identity of a shared record.
///
/// Two records of the same shared kind with equal natural keys are the same
/// thing, no matter which database or stable key they came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    Taxon { name: String },
    Algorithm { key: String, version: i32 },
    Pipeline { name: String, version: i32 },
    ProcessingService { endpoint_url: String },
    CategoryMap { content_hash: String },
}

impl NaturalKey {
    /// Kind of the record this key identifies.
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Taxon { .. } => EntityKind::Taxon,
            Self::Algorithm { .. } => EntityKind::Algorithm,
            Self::Pipeline { .. } => EntityKind::Pipeline,
            Self::ProcessingService { .. } => EntityKind::ProcessingService,
            Self::CategoryMap { .. } => EntityKind::CategoryMap,
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Taxon { name } => write!(f, "taxon '{name}'"),
            Self::Algorithm { key, version } => write!(f, "algorithm '{key}' v{version}"),
            Self::Pipeline { name, version } => write!(f, "pipeline '{name}' v{version}"),
            Self::ProcessingService { endpoint_url } => {
                write!(f, "processing service at {endpoint_url}")
            }
            Self::CategoryMap { content_hash } => {
                write!(f, "category map {}", &content_hash[..content_hash.len().min(12)])
            }
        }
    }
}

/// Hex BLAKE3 digest of a JSON value's canonical text.
///
/// Object keys are ordered, so maps with equal entries hash equally
/// regardless of the order they were written in.
pub fn content_hash(data: &Value) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(CATEGORY_MAP_DOMAIN.as_bytes());
    hasher.update(b":");
    hasher.update(data.to_string().as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn content_hash_is_order_insensitive() {
        let a = json!({"b": 2, "a": 1});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn content_hash_is_domain_separated() {
        let data = json!([1, 2, 3]);
        let raw = hex::encode(blake3::hash(data.to_string().as_bytes()).as_bytes());
        assert_ne!(content_hash(&data), raw);
    }

    #[test]
    fn kind_matches_variant() {
        let key = NaturalKey::Algorithm {
            key: "moth-classifier".into(),
            version: 3,
        };
        assert_eq!(key.kind(), EntityKind::Algorithm);
        assert_eq!(key.to_string(), "algorithm 'moth-classifier' v3");
    }

    #[test]
    fn category_map_display_is_abbreviated() {
        let key = NaturalKey::CategoryMap {
            content_hash: content_hash(&json!({})),
        };
        let shown = key.to_string();
        assert!(shown.starts_with("category map "));
        assert_eq!(shown.len(), "category map ".len() + 12);
    }
}
