#![allow(unused)]

//! # contract: storage abstraction shared by both sides of a mirror
//!
//! This module defines the traits every storage binding implements so that
//! the reconciler, executor and manifest publisher never know whether they
//! talk to a directory tree or a bucket.
//!
//! ## Interface
//! - [`ObjectStore`]: `list`, `read`, `write`, `delete` over [`Key`]s.
//! - [`PageSource`]: one page of a cursor-paginated remote listing;
//!   [`collect_pages`] turns it into a single all-or-nothing [`KeySet`].
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall`, and the mocks are exported under
//!   the `test-export-mocks` feature so integration tests can script failures.
//!
//! ## Error contract
//! - Per-call failures are [`StoreError`]s; implementors must classify
//!   throttling and timeouts as [`StoreError::Transient`] so the retry budget
//!   applies to them and only to them.
//! - `list` either returns a complete snapshot or a [`ListingError`].

use std::collections::HashSet;

use async_trait::async_trait;
use mockall::{automock, predicate::*};
use tracing::{debug, info, warn};

use crate::error::{ListingError, Side, StoreError};
use crate::ignore::IgnoreRules;
use crate::key::{Key, KeySet, ObjectMeta};
use crate::retry::RetryPolicy;

/// Metadata hints attached to a write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
}

/// A storage side: a local tree or a remote bucket.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Which side this binding represents, used for logs and errors.
    fn side(&self) -> Side;

    /// Enumerate every visible key. Ignored names are already filtered out.
    async fn list(&self) -> Result<KeySet, ListingError>;

    /// Read the full contents of one object.
    async fn read(&self, key: &Key) -> Result<Vec<u8>, StoreError>;

    /// Create or replace one object.
    async fn write(
        &self,
        key: &Key,
        bytes: Vec<u8>,
        options: &WriteOptions,
    ) -> Result<(), StoreError>;

    /// Remove one object. Removing an absent object is not an error.
    async fn delete(&self, key: &Key) -> Result<(), StoreError>;
}

/// One page of a remote listing. Keys are raw, not yet validated.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<(String, ObjectMeta)>,
    /// Continuation cursor; `None` when the listing is exhausted.
    pub next: Option<String>,
}

/// A cursor-paginated listing API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, cursor: Option<String>) -> Result<ListPage, StoreError>;
}

/// Follow cursors until exhausted and assemble one KeySet.
///
/// Any page failure (after retries), a cursor seen twice or a key listed twice
/// fails the whole listing; no partial snapshot is ever returned.
pub async fn collect_pages<P>(
    source: &P,
    side: Side,
    ignore: &IgnoreRules,
    retry: &RetryPolicy,
) -> Result<KeySet, ListingError>
where
    P: PageSource + ?Sized,
{
    let mut keyset = KeySet::new();
    let mut cursor: Option<String> = None;
    let mut seen_cursors: HashSet<String> = HashSet::new();
    let mut pages = 0usize;
    let mut skipped = 0usize;

    loop {
        let (page, _attempts) = retry
            .run("list page", || source.fetch_page(cursor.clone()))
            .await;
        let page = page.map_err(|source| ListingError::Store { side, source })?;
        pages += 1;
        debug!(%side, page = pages, entries = page.entries.len(), "Fetched listing page");

        for (raw, meta) in page.entries {
            if raw.ends_with('/') {
                // Directory marker objects carry no content.
                continue;
            }
            let key = match Key::parse(&raw) {
                Ok(key) => key,
                Err(e) => {
                    warn!(%side, key = %raw, error = %e, "Skipping key that cannot be mirrored");
                    skipped += 1;
                    continue;
                }
            };
            if ignore.is_ignored(key.base_name()) {
                continue;
            }
            keyset.insert(key, meta).map_err(|e| ListingError::Malformed {
                side,
                reason: e.to_string(),
            })?;
        }

        match page.next {
            Some(next) => {
                if !seen_cursors.insert(next.clone()) {
                    return Err(ListingError::Malformed {
                        side,
                        reason: format!("continuation cursor {next:?} repeated"),
                    });
                }
                cursor = Some(next);
            }
            None => break,
        }
    }

    info!(%side, pages, keys = keyset.len(), skipped, "Listing complete");
    Ok(keyset)
}
