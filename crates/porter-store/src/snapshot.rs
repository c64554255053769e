//! JSON snapshot persistence for [`InMemoryEntityStore`].
//!
//! The whole state is written as one document next to its destination and
//! renamed into place, so a crash never leaves a half-written database.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use porter_types::{Entity, EntityKind, StableKey, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::memory::{InMemoryEntityStore, StoreState};

const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    format: u32,
    #[serde(default)]
    next_keys: BTreeMap<EntityKind, u64>,
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    rows: Vec<Entity>,
    #[serde(default)]
    links: Vec<SnapshotLink>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotLink {
    project: StableKey,
    kind: EntityKind,
    key: StableKey,
}

impl InMemoryEntityStore {
    /// Load a store from a snapshot file. A missing file yields an empty
    /// store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no snapshot, starting empty");
            return Ok(Self::new());
        }

        let corrupt = |reason: String| StoreError::CorruptSnapshot {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(corrupt(format!("unsupported snapshot format {}", snapshot.format)));
        }

        let mut state = StoreState::default();
        let row_count = snapshot.rows.len();
        for row in snapshot.rows {
            state.put(row).map_err(|e| corrupt(e.to_string()))?;
        }
        for (kind, next) in snapshot.next_keys {
            let slot = state.next_keys.entry(kind).or_insert(0);
            *slot = (*slot).max(next);
        }
        state.links = snapshot
            .links
            .into_iter()
            .map(|l| (l.project, l.kind, l.key))
            .collect();
        state.users = snapshot
            .users
            .into_iter()
            .map(|u| (u.email.clone(), u))
            .collect();

        info!(path = %path.display(), rows = row_count, "loaded snapshot");
        Ok(Self::from_state(state))
    }

    /// Write the committed state to `path`, replacing it atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let snapshot = {
            let state = self.read()?;
            Snapshot {
                format: SNAPSHOT_FORMAT,
                next_keys: state.next_keys.clone(),
                users: state.users.values().cloned().collect(),
                rows: state.tables.values().flat_map(|t| t.values().cloned()).collect(),
                links: state
                    .links
                    .iter()
                    .map(|&(project, kind, key)| SnapshotLink { project, kind, key })
                    .collect(),
            }
        };

        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&data)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| StoreError::Io(e.error))?;

        info!(path = %path.display(), rows = snapshot.rows.len(), "saved snapshot");
        Ok(())
    }
}
