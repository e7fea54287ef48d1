use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::contract::{ObjectStore, WriteOptions};
use crate::error::{ListingError, Side, StoreError};
use crate::ignore::IgnoreRules;
use crate::key::{Key, KeySet, ObjectMeta};

/// A directory tree exposed as an object store.
pub struct FsStore {
    root: PathBuf,
    ignore: IgnoreRules,
    missing_root_is_empty: bool,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, ignore: IgnoreRules) -> Self {
        Self {
            root: root.into(),
            ignore,
            missing_root_is_empty: false,
        }
    }

    /// List a missing root as empty instead of failing. Set when the tree is
    /// the target side; writes create the root on demand.
    pub fn missing_root_is_empty(mut self, enabled: bool) -> Self {
        self.missing_root_is_empty = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self) -> Result<KeySet, ListingError> {
        if !self.root.exists() && self.missing_root_is_empty {
            info!(root = %self.root.display(), "Local root does not exist yet; listing as empty");
            return Ok(KeySet::new());
        }
        if !self.root.is_dir() {
            error!(root = %self.root.display(), "Local root is missing");
            return Err(ListingError::MissingRoot(self.root.clone()));
        }
        let mut keyset = KeySet::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| ListingError::Store {
                side: Side::Local,
                source: StoreError::Io(e.into()),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if self.ignore.is_ignored(&name) {
                debug!(path = %entry.path().display(), "Ignoring local file");
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| ListingError::Malformed {
                    side: Side::Local,
                    reason: e.to_string(),
                })?;
            let key = Key::from_relative_path(relative).map_err(|e| ListingError::Malformed {
                side: Side::Local,
                reason: e.to_string(),
            })?;
            let size = entry.metadata().ok().map(|m| m.len());
            keyset
                .insert(
                    key,
                    ObjectMeta {
                        size,
                        content_type: None,
                    },
                )
                .map_err(|e| ListingError::Malformed {
                    side: Side::Local,
                    reason: e.to_string(),
                })?;
        }
        info!(root = %self.root.display(), keys = keyset.len(), "Local listing complete");
        Ok(keyset)
    }

    fn write_atomic(&self, key: &Key, bytes: &[u8]) -> Result<(), StoreError> {
        let path = key.to_path(&self.root);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        std::io::Write::write_all(&mut tmp, bytes)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn remove(&self, key: &Key) -> Result<(), StoreError> {
        let path = key.to_path(&self.root);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Local file already absent");
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
        // Prune directories the delete left empty, never the root itself.
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    fn side(&self) -> Side {
        Side::Local
    }

    async fn list(&self) -> Result<KeySet, ListingError> {
        self.scan()
    }

    async fn read(&self, key: &Key) -> Result<Vec<u8>, StoreError> {
        let path = key.to_path(&self.root);
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(key.to_string())
            } else {
                StoreError::Io(e)
            }
        })
    }

    async fn write(
        &self,
        key: &Key,
        bytes: Vec<u8>,
        _options: &WriteOptions,
    ) -> Result<(), StoreError> {
        self.write_atomic(key, &bytes)?;
        debug!(key = %key, size = bytes.len(), "Wrote local file");
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        self.remove(key)?;
        debug!(key = %key, "Deleted local file");
        Ok(())
    }
}
