//! Plan Executor: applies a [`Plan`] to the target side.
//!
//! Every transfer and delete is an independent unit: failures are recorded
//! per key and never stop the batch. Items run through a bounded
//! `buffer_unordered` pool; a cancelled token stops new items from starting
//! while in-flight ones complete or fail on their own. A crash or cancel
//! leaves the target at some subset of the goal, and the next run's
//! reconciliation picks up exactly the remainder.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::contract::{ObjectStore, WriteOptions};
use crate::error::StoreError;
use crate::key::{Key, KeySet};
use crate::reconcile::Plan;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Transfer,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ItemOutcome {
    Success,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub kind: OperationKind,
    pub outcome: ItemOutcome,
    pub attempts: usize,
}

/// Outcome of one `execute` call. `Unchanged` keys never appear here.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub outcomes: BTreeMap<Key, ItemReport>,
    /// Planned items that never started because the run was cancelled.
    pub not_attempted: Vec<Key>,
}

impl ExecutionReport {
    fn count(&self, kind: OperationKind, success: bool) -> usize {
        self.outcomes
            .values()
            .filter(|r| r.kind == kind && (r.outcome == ItemOutcome::Success) == success)
            .count()
    }

    pub fn transferred(&self) -> usize {
        self.count(OperationKind::Transfer, true)
    }

    pub fn deleted(&self) -> usize {
        self.count(OperationKind::Delete, true)
    }

    /// Failed items with their kind and reason, in key order.
    pub fn failures(&self) -> Vec<(&Key, OperationKind, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(key, report)| match &report.outcome {
                ItemOutcome::Failed(reason) => Some((key, report.kind, reason.as_str())),
                ItemOutcome::Success => None,
            })
            .collect()
    }

    /// Every planned item was attempted and succeeded.
    pub fn is_success(&self) -> bool {
        self.not_attempted.is_empty() && self.failures().is_empty()
    }
}

pub struct Executor {
    config: ExecutorConfig,
}

enum ItemResult {
    Done(Key, ItemReport),
    Skipped(Key),
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Apply `plan`: copy `to_transfer` from `truth` to `target`, remove `to_delete` from `target`.
    ///
    /// `truth_keys` supplies per-key metadata hints (content type) for transfers.
    pub async fn execute(
        &self,
        plan: &Plan,
        truth_keys: &KeySet,
        truth: &dyn ObjectStore,
        target: &dyn ObjectStore,
        cancel: &CancellationToken,
    ) -> ExecutionReport {
        info!(
            transfers = plan.to_transfer.len(),
            deletes = plan.to_delete.len(),
            concurrency = self.config.concurrency,
            "[SYNC][EXEC] Executing plan"
        );

        let operations = plan
            .to_transfer
            .iter()
            .map(|k| (k, OperationKind::Transfer))
            .chain(plan.to_delete.iter().map(|k| (k, OperationKind::Delete)));

        let results: Vec<ItemResult> = stream::iter(operations)
            .map(|(key, kind)| async move {
                if cancel.is_cancelled() {
                    return ItemResult::Skipped(key.clone());
                }
                let report = match kind {
                    OperationKind::Transfer => {
                        self.transfer(key, truth_keys, truth, target).await
                    }
                    OperationKind::Delete => self.delete(key, target).await,
                };
                ItemResult::Done(key.clone(), report)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = ExecutionReport::default();
        for result in results {
            match result {
                ItemResult::Done(key, item) => {
                    report.outcomes.insert(key, item);
                }
                ItemResult::Skipped(key) => report.not_attempted.push(key),
            }
        }
        report.not_attempted.sort();

        if !report.not_attempted.is_empty() {
            warn!(
                not_attempted = report.not_attempted.len(),
                "[SYNC][EXEC] Run cancelled before all items started"
            );
        }
        info!(
            transferred = report.transferred(),
            deleted = report.deleted(),
            failed = report.failures().len(),
            "[SYNC][EXEC] Plan execution finished"
        );
        report
    }

    async fn transfer(
        &self,
        key: &Key,
        truth_keys: &KeySet,
        truth: &dyn ObjectStore,
        target: &dyn ObjectStore,
    ) -> ItemReport {
        let hint = truth_keys.meta(key).and_then(|m| m.content_type.clone());
        let (result, attempts) = self
            .config
            .retry
            .run("transfer", || async {
                let bytes = truth.read(key).await?;
                let options = WriteOptions {
                    content_type: Some(
                        hint.clone()
                            .unwrap_or_else(|| content_type_for(key, &bytes).to_string()),
                    ),
                    cache_control: None,
                };
                target.write(key, bytes, &options).await
            })
            .await;
        item_report(key, OperationKind::Transfer, result, attempts)
    }

    async fn delete(&self, key: &Key, target: &dyn ObjectStore) -> ItemReport {
        let (result, attempts) = self
            .config
            .retry
            .run("delete", || target.delete(key))
            .await;
        item_report(key, OperationKind::Delete, result, attempts)
    }
}

fn item_report(
    key: &Key,
    kind: OperationKind,
    result: Result<(), StoreError>,
    attempts: usize,
) -> ItemReport {
    let outcome = match result {
        Ok(()) => {
            debug!(key = %key, ?kind, attempts, "[SYNC][EXEC] Item succeeded");
            ItemOutcome::Success
        }
        Err(e) => {
            error!(key = %key, ?kind, attempts, error = %e, "[SYNC][EXEC] Item failed");
            ItemOutcome::Failed(e.to_string())
        }
    };
    ItemReport {
        kind,
        outcome,
        attempts,
    }
}

/// Content-type hint: sniffed from the bytes, else guessed from the extension.
pub fn content_type_for(key: &Key, bytes: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type();
    }
    let extension = key
        .base_name()
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
