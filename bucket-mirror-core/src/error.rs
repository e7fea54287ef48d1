//! Error taxonomy shared by every component.
//!
//! Listing failures are fatal to a run, per-item storage failures are
//! recorded and isolated, ledger write failures are surfaced as warnings.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which storage side an operation concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}

/// A string that cannot be used as a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("key is empty")]
    Empty,
    #[error("key {0:?} must not begin with '/'")]
    Absolute(String),
    #[error("key {0:?} contains an empty, '.' or '..' segment")]
    BadSegment(String),
    #[error("path {0:?} is not valid UTF-8")]
    NotUtf8(String),
    #[error("duplicate key {0:?} in a single listing")]
    DuplicateKey(String),
}

/// Failure of a single storage primitive (read, write, delete, page fetch).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("transient storage failure: {0}")]
    Transient(String),
    #[error("storage failure: {0}")]
    Permanent(String),
    #[error(transparent)]
    InvalidKey(#[from] KeyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// A KeySet could not be produced. Never carries a partial snapshot.
#[derive(Debug, Error)]
pub enum ListingError {
    #[error("{side} listing failed: {source}")]
    Store {
        side: Side,
        #[source]
        source: StoreError,
    },
    #[error("{side} listing returned a malformed response: {reason}")]
    Malformed { side: Side, reason: String },
    #[error("local root {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),
}

/// Ledger could not be read or appended to.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("failed to open ledger {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to record {id:?} in ledger {path}: {source}")]
    Write {
        path: PathBuf,
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger id {0:?} must be non-empty and single-line")]
    InvalidId(String),
}

/// Invalid configuration detected before any storage is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Fatal errors that abort a run before any target state is mutated.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(
        "truth side ({side}) is empty while the target holds {target_count} objects; \
         refusing to delete them (set allow_empty_truth to override)"
    )]
    EmptyTruth { side: Side, target_count: usize },
    #[error(transparent)]
    Config(#[from] ConfigError),
}
