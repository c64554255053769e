//! Project names and export file names.

use chrono::{DateTime, Utc};
use porter_store::{EntityReader, StoreResult};

/// URL-safe form of a project name: lowercase word characters, runs of
/// whitespace and hyphens collapsed to one `-`, other punctuation dropped.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug.to_string()
    }
}

/// `<slug>_export_<YYYYmmdd_HHMMSS>.json`
pub fn default_export_filename(project_name: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_export_{}.json",
        slugify(project_name),
        now.format("%Y%m%d_%H%M%S")
    )
}

/// First of `base`, `base (1)`, `base (2)`, ... that no project uses.
pub fn unique_project_name<R: EntityReader + ?Sized>(reader: &R, base: &str) -> StoreResult<String> {
    if reader.find_project(base)?.is_none() {
        return Ok(base.to_string());
    }
    let mut counter = 1u64;
    loop {
        let candidate = format!("{base} ({counter})");
        if reader.find_project(&candidate)?.is_none() {
            return Ok(candidate);
        }
        counter += 1;
    }
}
