//! Artifact storage backends behind a `save(uri)` / `load(uri)` pair.

use crate::error::BundleError;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Byte-level storage for persisted artifacts.
///
/// `save` must be atomic: a concurrent or subsequent `load` observes either
/// the previous complete object or the new complete object.
pub trait ArtifactStore: Send + Sync {
    fn save(&self, uri: &str, bytes: &[u8]) -> Result<(), BundleError>;

    /// Fails with `BundleError::NotFound` when nothing is stored at `uri`.
    fn load(&self, uri: &str) -> Result<Vec<u8>, BundleError>;
}

/// Local filesystem store. Accepts plain paths and `file://` URIs.
#[derive(Debug, Clone, Default)]
pub struct LocalStore;

impl LocalStore {
    pub fn new() -> Self {
        Self
    }

    fn resolve(uri: &str) -> Result<PathBuf, BundleError> {
        if let Some(path) = uri.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if uri.contains("://") {
            return Err(BundleError::UnsupportedLocation { uri: uri.to_string() });
        }
        Ok(PathBuf::from(uri))
    }

    fn storage_err(uri: &str) -> impl FnOnce(std::io::Error) -> BundleError + '_ {
        move |source| BundleError::Storage {
            uri: uri.to_string(),
            source,
        }
    }
}

impl ArtifactStore for LocalStore {
    fn save(&self, uri: &str, bytes: &[u8]) -> Result<(), BundleError> {
        let path = Self::resolve(uri)?;
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        fs::create_dir_all(dir).map_err(Self::storage_err(uri))?;

        // Write beside the target, then rename over it.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());
        let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(Self::storage_err(uri)(e));
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Artifact written");
        Ok(())
    }

    fn load(&self, uri: &str) -> Result<Vec<u8>, BundleError> {
        let path = Self::resolve(uri)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BundleError::NotFound { uri: uri.to_string() })
            }
            Err(e) => Err(Self::storage_err(uri)(e)),
        }
    }
}

/// In-process store keyed by URI. Clones share the same objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace an object without going through serialization.
    pub fn put_raw(&self, uri: &str, bytes: Vec<u8>) {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.to_string(), bytes);
    }
}

impl ArtifactStore for MemoryStore {
    fn save(&self, uri: &str, bytes: &[u8]) -> Result<(), BundleError> {
        self.put_raw(uri, bytes.to_vec());
        Ok(())
    }

    fn load(&self, uri: &str) -> Result<Vec<u8>, BundleError> {
        // A writer panicking mid-insert cannot leave the map half-updated.
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects
            .get(uri)
            .cloned()
            .ok_or_else(|| BundleError::NotFound { uri: uri.to_string() })
    }
}
