use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use harvest_common::Manifest;
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::{StoreError, StoreResult};

/// One persisted manifest together with the digest computed when it was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredManifest {
    pub manifest: Manifest,
    pub sha256: String,
}

/// Current-version manifest storage, one entry per server id.
///
/// There is no cross-process locking: concurrent crawls writing the same
/// store race with last-writer-wins.
pub trait ManifestStore: Send + Sync {
    fn load(&self, server_id: &str) -> StoreResult<Option<StoredManifest>>;

    fn save(&self, server_id: &str, stored: &StoredManifest) -> StoreResult<()>;
}

/// Server ids become file names, so they must not escape the store directory.
pub fn validate_server_id(server_id: &str) -> StoreResult<()> {
    let bad = server_id.trim().is_empty()
        || server_id.starts_with('.')
        || server_id.contains(['/', '\\', '\0'])
        || server_id.contains("..");
    if bad {
        return Err(StoreError::InvalidServerId(server_id.to_string()));
    }
    Ok(())
}

/// `<dir>/<server_id>.json`, each file holding `{"manifest": ..., "sha256": ...}`.
pub struct FsManifestStore {
    dir: PathBuf,
}

impl FsManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, server_id: &str) -> StoreResult<PathBuf> {
        validate_server_id(server_id)?;
        Ok(self.dir.join(format!("{server_id}.json")))
    }
}

impl ManifestStore for FsManifestStore {
    fn load(&self, server_id: &str) -> StoreResult<Option<StoredManifest>> {
        let path = self.path_for(server_id)?;
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let stored = serde_json::from_str(&content).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        Ok(Some(stored))
    }

    fn save(&self, server_id: &str, stored: &StoredManifest) -> StoreResult<()> {
        let path = self.path_for(server_id)?;
        let body = serde_json::to_vec_pretty(stored).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &body)
    }
}

/// In-process store, for tests and dry runs.
#[derive(Default)]
pub struct MemoryManifestStore {
    entries: Mutex<HashMap<String, StoredManifest>>,
}

impl MemoryManifestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ManifestStore for MemoryManifestStore {
    fn load(&self, server_id: &str) -> StoreResult<Option<StoredManifest>> {
        validate_server_id(server_id)?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(server_id).cloned())
    }

    fn save(&self, server_id: &str, stored: &StoredManifest) -> StoreResult<()> {
        validate_server_id(server_id)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(server_id.to_string(), stored.clone());
        Ok(())
    }
}
