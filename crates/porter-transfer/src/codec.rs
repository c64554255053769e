//! JSON encoding of export documents.
//!
//! Decoding goes through an untyped [`Value`] first so that a version
//! mismatch is reported as such rather than as a field error, and so that a
//! bad record is reported with its document path.

use std::io::Write;
use std::path::Path;

use porter_types::{Document, Entity, EntityKind, SUPPORTED_VERSIONS};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{TransferError, TransferResult};

/// Encode a document. An `indent` of zero writes compact JSON.
pub fn encode(document: &Document, indent: usize) -> TransferResult<Vec<u8>> {
    let encoded = if indent == 0 {
        serde_json::to_vec(document)
    } else {
        encode_pretty(document, indent)
    };
    encoded.map_err(|e| TransferError::malformed("$", e.to_string()))
}

fn encode_pretty(document: &Document, indent: usize) -> serde_json::Result<Vec<u8>> {
    let pad = vec![b' '; indent];
    let mut out = Vec::new();
    {
        let formatter = PrettyFormatter::with_indent(&pad);
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        document.serialize(&mut ser)?;
    }
    Ok(out)
}

/// Decode and validate a document.
pub fn decode(bytes: &[u8]) -> TransferResult<Document> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| TransferError::malformed("$", e.to_string()))?;
    let Value::Object(mut root) = value else {
        return Err(TransferError::malformed("$", "expected a JSON object"));
    };

    let version = match root.get("export_version") {
        Some(Value::String(v)) => v.clone(),
        Some(_) => return Err(TransferError::malformed("export_version", "expected a string")),
        None => return Err(TransferError::malformed("export_version", "missing")),
    };
    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        return Err(TransferError::VersionMismatch {
            found: version,
            supported: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
        });
    }

    let exported_at = match root.remove("exported_at") {
        Some(v) => serde_json::from_value(v)
            .map_err(|e| TransferError::malformed("exported_at", e.to_string()))?,
        None => return Err(TransferError::malformed("exported_at", "missing")),
    };

    let project = match root.remove("project") {
        Some(v) => Entity::from_value(EntityKind::Project, v)
            .map_err(|e| TransferError::malformed("project", e.to_string()))?,
        None => return Err(TransferError::malformed("project", "missing")),
    };
    let Entity::Project(project) = project else {
        return Err(TransferError::malformed("project", "not a project record"));
    };

    let mut document = Document::new(project);
    document.export_version = version;
    document.exported_at = exported_at;
    document.export_tool = match root.remove("export_tool") {
        Some(Value::String(tool)) => Some(tool),
        _ => None,
    };

    for kind in EntityKind::ALL.into_iter().filter(|k| *k != EntityKind::Project) {
        for entity in decode_collection(&mut root, kind)? {
            document.push(entity);
        }
    }

    debug!(records = document.summary().total(), "decoded document");
    Ok(document)
}

fn decode_collection(root: &mut Map<String, Value>, kind: EntityKind) -> TransferResult<Vec<Entity>> {
    let collection = kind.collection();
    let items = match root.remove(collection) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(TransferError::malformed(collection, "expected an array")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let path = match item.get("id").and_then(Value::as_u64) {
                Some(id) => format!("{collection}[id={id}]"),
                None => format!("{collection}[{index}]"),
            };
            Entity::from_value(kind, item).map_err(|e| TransferError::malformed(path, e.to_string()))
        })
        .collect()
}

/// Read and decode a document file.
pub fn read_document(path: impl AsRef<Path>) -> TransferResult<Document> {
    let bytes = std::fs::read(path.as_ref())?;
    decode(&bytes)
}

/// Encode a document to a file and return the number of bytes written.
///
/// The file is written beside its destination and renamed into place.
pub fn write_document(path: impl AsRef<Path>, document: &Document, indent: usize) -> TransferResult<u64> {
    let path = path.as_ref();
    let bytes = encode(document, indent)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(&bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| TransferError::Io(e.error))?;

    debug!(path = %path.display(), bytes = bytes.len(), "wrote document");
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use porter_types::{Project, Site, StableKey};

    use super::*;

    fn sample() -> Document {
        let mut project = Project::new("Moths");
        project.id = StableKey::new(1);
        let mut doc = Document::new(project).with_tool("porter export");
        let mut site = Site::new(StableKey::new(1), "Ridge");
        site.id = StableKey::new(4);
        doc.push(site.into());
        doc
    }

    #[test]
    fn indent_controls_layout() {
        let compact = encode(&sample(), 0).unwrap();
        assert!(!compact.contains(&b'\n'));

        let pretty = String::from_utf8(encode(&sample(), 4).unwrap()).unwrap();
        assert!(pretty.contains("\n    \"export_version\": \"1.0\""));
    }

    #[test]
    fn decode_restores_encoded_document() {
        let doc = sample();
        let back = decode(&encode(&doc, 2).unwrap()).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let json = br#"{"export_version": "2.0", "exported_at": "2024-06-01T00:00:00Z", "project": {"id": 1, "name": "X"}}"#;
        match decode(json) {
            Err(TransferError::VersionMismatch { found, supported }) => {
                assert_eq!(found, "2.0");
                assert_eq!(supported, vec!["1.0".to_string()]);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn numeric_version_is_malformed() {
        let json = br#"{"export_version": 1.0, "exported_at": "2024-06-01T00:00:00Z", "project": {"id": 1, "name": "X"}}"#;
        match decode(json) {
            Err(TransferError::MalformedDocument { path, .. }) => assert_eq!(path, "export_version"),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn missing_project_is_malformed() {
        let json = br#"{"export_version": "1.0", "exported_at": "2024-06-01T00:00:00Z"}"#;
        assert!(matches!(
            decode(json),
            Err(TransferError::MalformedDocument { path, .. }) if path == "project"
        ));
    }

    #[test]
    fn bad_record_reports_its_path() {
        let json = br#"{
            "export_version": "1.0",
            "exported_at": "2024-06-01T00:00:00Z",
            "project": {"id": 1, "name": "X"},
            "detections": [{"id": 7, "occurrence": 3}]
        }"#;
        match decode(json) {
            Err(TransferError::MalformedDocument { path, reason }) => {
                assert_eq!(path, "detections[id=7]");
                assert!(reason.contains("source_image"), "{reason}");
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keys_and_missing_collections_are_tolerated() {
        let json = br#"{
            "export_version": "1.0",
            "exported_at": "2024-06-01T00:00:00Z",
            "project": {"id": 1, "name": "X"},
            "job_history": [{"id": 1}]
        }"#;
        let doc = decode(json).unwrap();
        assert_eq!(doc.summary().total(), 1);
    }

    #[test]
    fn files_round_trip_with_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        let size = write_document(&path, &sample(), 2).unwrap();
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());
        assert_eq!(read_document(&path).unwrap().sites.len(), 1);
    }

    #[test]
    fn rewriting_replaces_the_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");
        std::fs::write(&path, vec![b'x'; 64 * 1024]).unwrap();

        let size = write_document(&path, &sample(), 0).unwrap();
        assert_eq!(size, std::fs::metadata(&path).unwrap().len());
        decode(&std::fs::read(&path).unwrap()).unwrap();
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_directory_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("export.json");
        assert!(matches!(write_document(&path, &sample(), 2), Err(TransferError::Io(_))));
        assert!(!path.exists());
    }
}
