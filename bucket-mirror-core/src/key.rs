//! Normalised object identities and listing snapshots.

use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// Forward-slash separated relative path, identical on both sides.
///
/// Equality is exact string equality: no case folding, no separator tolerance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    /// Validate a key as received from a remote listing.
    pub fn parse(raw: &str) -> Result<Self, KeyError> {
        if raw.is_empty() {
            return Err(KeyError::Empty);
        }
        if raw.starts_with('/') {
            return Err(KeyError::Absolute(raw.to_string()));
        }
        if raw
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(KeyError::BadSegment(raw.to_string()));
        }
        Ok(Key(raw.to_string()))
    }

    /// Build a key from a path relative to a local root.
    pub fn from_relative_path(path: &Path) -> Result<Self, KeyError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    let part = part
                        .to_str()
                        .ok_or_else(|| KeyError::NotUtf8(path.to_string_lossy().into_owned()))?;
                    segments.push(part);
                }
                Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(KeyError::Absolute(path.to_string_lossy().into_owned()))
                }
                Component::ParentDir => {
                    return Err(KeyError::BadSegment(path.to_string_lossy().into_owned()))
                }
            }
        }
        Key::parse(&segments.join("/"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path segment, the part ignore rules look at.
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Location of this key below a local root.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |path, segment| path.join(segment))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Key {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Key::parse(&value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

/// Minimal per-object metadata. Never a content hash: identity is existence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

/// Immutable snapshot of one side, produced by a single listing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    entries: BTreeMap<Key, ObjectMeta>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key; a key seen twice in one listing is an error.
    pub fn insert(&mut self, key: Key, meta: ObjectMeta) -> Result<(), KeyError> {
        match self.entries.entry(key) {
            btree_map::Entry::Occupied(entry) => {
                Err(KeyError::DuplicateKey(entry.key().as_str().to_string()))
            }
            btree_map::Entry::Vacant(entry) => {
                entry.insert(meta);
                Ok(())
            }
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn meta(&self, key: &Key) -> Option<&ObjectMeta> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in lexicographic order.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &ObjectMeta)> {
        self.entries.iter()
    }
}

/// Builds a set of bare keys with empty metadata.
///
/// Repeated keys collapse into a single entry. Listings never go through
/// this path; they use [`KeySet::insert`], which rejects duplicates.
impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        KeySet {
            entries: iter.into_iter().map(|k| (k, ObjectMeta::default())).collect(),
        }
    }
}
