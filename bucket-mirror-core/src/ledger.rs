//! Ingestion Ledger: durable, append-only set of processed item ids.
//!
//! The ledger gates a costly fetch: an id is checked before the fetch and
//! recorded (and flushed to disk) only after the fetch succeeded. A crash
//! between the two costs one harmless re-fetch on restart; an unseen id is
//! never skipped. Entries are never removed.

use std::collections::HashSet;
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::error::LedgerError;

pub struct Ledger {
    path: PathBuf,
    ids: HashSet<String>,
    order: Vec<String>,
    file: File,
}

impl Ledger {
    /// Load an existing ledger or create an empty one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| LedgerError::Open {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;

        let mut contents = Vec::new();
        (&file).read_to_end(&mut contents).map_err(open_err)?;

        // Only newline-terminated lines were recorded; a trailing fragment is
        // a torn append and is cut off so the next append starts a fresh line.
        let complete = contents
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        if complete < contents.len() {
            warn!(
                path = %path.display(),
                fragment = %String::from_utf8_lossy(&contents[complete..]),
                "[LEDGER] Dropping unterminated last line"
            );
            file.set_len(complete as u64).map_err(open_err)?;
            file.sync_data().map_err(open_err)?;
        }
        let contents = std::str::from_utf8(&contents[..complete]).map_err(|e| {
            open_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let mut ids = HashSet::new();
        let mut order = Vec::new();
        for line in contents.lines() {
            let id = line.trim();
            if !id.is_empty() && ids.insert(id.to_string()) {
                order.push(id.to_string());
            }
        }
        info!(path = %path.display(), entries = ids.len(), "[LEDGER] Opened ledger");
        Ok(Self {
            path,
            ids,
            order,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seen(&self, id: &str) -> bool {
        self.ids.contains(id.trim())
    }

    /// Append `id` and flush it to disk before returning. Recording a seen id is a no-op.
    pub fn record(&mut self, id: &str) -> Result<(), LedgerError> {
        let id = validate_id(id)?;
        if self.ids.contains(id) {
            return Ok(());
        }
        let write_err = |source| LedgerError::Write {
            path: self.path.clone(),
            id: id.to_string(),
            source,
        };
        self.file
            .write_all(format!("{id}\n").as_bytes())
            .map_err(write_err)?;
        self.file.sync_data().map_err(write_err)?;
        self.ids.insert(id.to_string());
        self.order.push(id.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Recorded ids in recording order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Trimmed id, or an error when it is blank or spans several lines.
pub fn validate_id(id: &str) -> Result<&str, LedgerError> {
    let id = id.trim();
    if id.is_empty() || id.contains('\n') || id.contains('\r') {
        return Err(LedgerError::InvalidId(id.to_string()));
    }
    Ok(id)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Fetched but not recorded; they will be fetched once more next run.
    pub record_warnings: Vec<(String, String)>,
}

impl IngestReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Run `fetch` for every id the ledger has not seen, recording each success.
pub async fn ingest_all<I, F, Fut, E>(ledger: &mut Ledger, ids: I, mut fetch: F) -> IngestReport
where
    I: IntoIterator<Item = String>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut report = IngestReport::default();
    for id in ids {
        if let Err(e) = validate_id(&id) {
            error!(id = ?id, error = %e, "[LEDGER] Invalid id, not fetched");
            report.failed.push((id, e.to_string()));
            continue;
        }
        if ledger.seen(&id) {
            info!(id = %id, "[LEDGER] Already ingested, skipping");
            report.skipped.push(id);
            continue;
        }
        match fetch(id.clone()).await {
            Ok(()) => {
                if let Err(e) = ledger.record(&id) {
                    warn!(id = %id, error = %e, "[LEDGER] Fetched but could not record; it will be fetched again");
                    report.record_warnings.push((id.clone(), e.to_string()));
                }
                report.fetched.push(id);
            }
            Err(e) => {
                error!(id = %id, error = %e, "[LEDGER] Fetch failed, not recorded");
                report.failed.push((id, e.to_string()));
            }
        }
    }
    info!(
        fetched = report.fetched.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "[LEDGER] Ingestion finished"
    );
    report
}
