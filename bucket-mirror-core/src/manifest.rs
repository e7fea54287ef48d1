use tracing::{error, info};

use crate::config::ManifestConfig;
use crate::contract::{ObjectStore, WriteOptions};
use crate::error::StoreError;
use crate::key::{Key, KeySet};
use crate::retry::RetryPolicy;

/// Serialise the keys of `keyset` as a pretty JSON array in lexicographic order.
pub fn render(keyset: &KeySet) -> Result<Vec<u8>, serde_json::Error> {
    let keys: Vec<&str> = keyset.keys().map(Key::as_str).collect();
    serde_json::to_vec_pretty(&keys)
}

/// Write the manifest to its well-known key on `store`.
///
/// The key's base name is part of every side's ignore rules, so the manifest
/// never shows up in a later plan.
pub async fn publish(
    store: &dyn ObjectStore,
    keyset: &KeySet,
    config: &ManifestConfig,
    retry: &RetryPolicy,
) -> Result<(), StoreError> {
    let key = Key::parse(&config.key)?;
    let body = render(keyset).map_err(|e| StoreError::Permanent(e.to_string()))?;
    let options = WriteOptions {
        content_type: Some("application/json".to_string()),
        cache_control: Some(config.cache_control.clone()),
    };
    let (result, attempts) = retry
        .run("publish manifest", || store.write(&key, body.clone(), &options))
        .await;
    match &result {
        Ok(()) => info!(
            side = %store.side(),
            key = %key,
            entries = keyset.len(),
            attempts,
            "[SYNC] Published manifest"
        ),
        Err(e) => error!(side = %store.side(), key = %key, error = %e, "[SYNC] Failed to publish manifest"),
    }
    result
}
