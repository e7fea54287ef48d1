//! In-memory [`ObjectStore`] with scripted failures, exported for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::contract::{ObjectStore, WriteOptions};
use crate::error::{ListingError, Side, StoreError};
use crate::key::{Key, KeySet, ObjectMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Fails this many times with a transient error, then succeeds.
    TransientTimes(usize),
    /// Always fails with a permanent error.
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub options: WriteOptions,
}

#[derive(Default)]
struct State {
    objects: BTreeMap<Key, StoredObject>,
    write_failures: HashMap<Key, Failure>,
    delete_failures: HashMap<Key, Failure>,
    list_failure: Option<String>,
    calls: Vec<String>,
}

pub struct MemoryStore {
    side: Side,
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            state: Mutex::new(State::default()),
        }
    }

    /// Store populated with `keys`, each holding its own name as content.
    pub fn with_keys(side: Side, keys: &[&str]) -> Self {
        let store = Self::new(side);
        for key in keys {
            store.put(key, key.as_bytes());
        }
        store
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn put(&self, key: &str, bytes: &[u8]) {
        let key = Key::parse(key).expect("test key must be valid");
        self.state().objects.insert(
            key,
            StoredObject {
                bytes: bytes.to_vec(),
                options: WriteOptions::default(),
            },
        );
    }

    pub fn fail_writes(&self, key: &str, failure: Failure) {
        let key = Key::parse(key).expect("test key must be valid");
        self.state().write_failures.insert(key, failure);
    }

    pub fn fail_deletes(&self, key: &str, failure: Failure) {
        let key = Key::parse(key).expect("test key must be valid");
        self.state().delete_failures.insert(key, failure);
    }

    pub fn fail_listing(&self, reason: &str) {
        self.state().list_failure = Some(reason.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.write_failures.clear();
        state.delete_failures.clear();
        state.list_failure = None;
    }

    pub fn keys(&self) -> Vec<String> {
        self.state()
            .objects
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        let key = Key::parse(key).ok()?;
        self.state().objects.get(&key).cloned()
    }

    /// Mutating calls in the order they were issued, e.g. `"write A/1.mp3"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }
}

fn trip(failures: &mut HashMap<Key, Failure>, key: &Key) -> Result<(), StoreError> {
    match failures.get_mut(key) {
        Some(Failure::Permanent) => Err(StoreError::Permanent(format!("scripted failure for {key}"))),
        Some(Failure::TransientTimes(remaining)) if *remaining > 0 => {
            *remaining -= 1;
            Err(StoreError::Transient(format!("scripted timeout for {key}")))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn side(&self) -> Side {
        self.side
    }

    async fn list(&self) -> Result<KeySet, ListingError> {
        let state = self.state();
        if let Some(reason) = &state.list_failure {
            return Err(ListingError::Store {
                side: self.side,
                source: StoreError::Transient(reason.clone()),
            });
        }
        let mut keyset = KeySet::new();
        for (key, object) in &state.objects {
            // Reserved names stay invisible, as with the real bindings.
            if key.base_name() == crate::config::DEFAULT_MANIFEST_KEY {
                continue;
            }
            let meta = ObjectMeta {
                size: Some(object.bytes.len() as u64),
                content_type: object.options.content_type.clone(),
            };
            keyset
                .insert(key.clone(), meta)
                .map_err(|e| ListingError::Malformed {
                    side: self.side,
                    reason: e.to_string(),
                })?;
        }
        Ok(keyset)
    }

    async fn read(&self, key: &Key) -> Result<Vec<u8>, StoreError> {
        self.state()
            .objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn write(
        &self,
        key: &Key,
        bytes: Vec<u8>,
        options: &WriteOptions,
    ) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("write {key}"));
        trip(&mut state.write_failures, key)?;
        state.objects.insert(
            key.clone(),
            StoredObject {
                bytes,
                options: options.clone(),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &Key) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(format!("delete {key}"));
        trip(&mut state.delete_failures, key)?;
        state.objects.remove(key);
        Ok(())
    }
}
