//! High-level pipeline: list → reconcile → execute → publish manifest.
//!
//! This module provides the top-level orchestration for one mirror run. It:
//!   - Lists the truth side and the target side concurrently
//!   - Refuses to run when the truth side is empty but the target is not
//!     (unless explicitly allowed)
//!   - Computes the [`Plan`] with [`reconcile`]
//!   - Applies it with the [`Executor`], isolating per-item failures
//!   - Re-lists the target and publishes the manifest of what is now there
//!
//! # Error Handling
//! A [`SyncError`] is only returned before any target state is mutated
//! (listing failures, the empty-truth guard). Once execution starts, every
//! problem is reported inside [`SynchroniseReport`] instead.
//!
//! # Navigation
//! - Main entrypoint: [`synchronise`]
//! - Supporting types: [`SynchroniseReport`], [`ManifestStatus`]

use std::fmt;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::MirrorConfig;
use crate::contract::ObjectStore;
use crate::error::SyncError;
use crate::executor::{ExecutionReport, Executor, ExecutorConfig, OperationKind};
use crate::manifest;
use crate::reconcile::{reconcile, Plan, SyncMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestStatus {
    Disabled,
    /// Dry runs never write anything.
    Skipped,
    Published { entries: usize },
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SynchroniseReport {
    pub run_id: Uuid,
    pub mode: SyncMode,
    pub dry_run: bool,
    pub plan: Plan,
    /// `None` for dry runs.
    pub execution: Option<ExecutionReport>,
    pub manifest: ManifestStatus,
}

impl SynchroniseReport {
    pub fn transferred(&self) -> usize {
        self.execution.as_ref().map_or(0, ExecutionReport::transferred)
    }

    pub fn deleted(&self) -> usize {
        self.execution.as_ref().map_or(0, ExecutionReport::deleted)
    }

    pub fn unchanged(&self) -> usize {
        self.plan.unchanged.len()
    }

    pub fn failed(&self) -> usize {
        self.execution.as_ref().map_or(0, |e| e.failures().len())
    }

    pub fn not_attempted(&self) -> usize {
        self.execution.as_ref().map_or(0, |e| e.not_attempted.len())
    }

    /// Zero failed items and nothing left unattempted.
    pub fn is_success(&self) -> bool {
        self.execution.as_ref().map_or(true, ExecutionReport::is_success)
    }
}

impl fmt::Display for SynchroniseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {} ({:?})", self.run_id, self.mode)?;
        if self.dry_run {
            writeln!(
                f,
                "dry run: {} to transfer, {} to delete, {} unchanged",
                self.plan.to_transfer.len(),
                self.plan.to_delete.len(),
                self.unchanged()
            )?;
            for key in &self.plan.to_transfer {
                writeln!(f, "  + {key}")?;
            }
            for key in &self.plan.to_delete {
                writeln!(f, "  - {key}")?;
            }
            return Ok(());
        }
        writeln!(
            f,
            "transferred: {}, deleted: {}, unchanged: {}, failed: {}, not attempted: {}",
            self.transferred(),
            self.deleted(),
            self.unchanged(),
            self.failed(),
            self.not_attempted()
        )?;
        if let Some(execution) = &self.execution {
            for (key, kind, reason) in execution.failures() {
                let verb = match kind {
                    OperationKind::Transfer => "transfer",
                    OperationKind::Delete => "delete",
                };
                writeln!(f, "  FAILED {verb} {key}: {reason}")?;
            }
        }
        match &self.manifest {
            ManifestStatus::Published { entries } => writeln!(f, "manifest: {entries} entries"),
            ManifestStatus::Failed(reason) => writeln!(f, "manifest: not published ({reason})"),
            ManifestStatus::Disabled | ManifestStatus::Skipped => Ok(()),
        }
    }
}

/// Run one mirror pass according to `config.mode`.
pub async fn synchronise(
    config: &MirrorConfig,
    local: &dyn ObjectStore,
    remote: &dyn ObjectStore,
    cancel: &CancellationToken,
) -> Result<SynchroniseReport, SyncError> {
    let run_id = Uuid::new_v4();
    let span = info_span!("synchronise", %run_id, mode = ?config.mode);
    run(run_id, config, local, remote, cancel)
        .instrument(span)
        .await
}

async fn run(
    run_id: Uuid,
    config: &MirrorConfig,
    local: &dyn ObjectStore,
    remote: &dyn ObjectStore,
    cancel: &CancellationToken,
) -> Result<SynchroniseReport, SyncError> {
    let (truth, target) = match config.mode {
        SyncMode::PushMirror => (local, remote),
        SyncMode::PullMirror => (remote, local),
    };
    info!(truth = %truth.side(), target = %target.side(), "[SYNC] Starting mirror run");

    let (truth_keys, target_keys) = match futures::try_join!(truth.list(), target.list()) {
        Ok(sets) => sets,
        Err(e) => {
            error!(error = %e, "[SYNC][ERROR] Listing failed, nothing was changed");
            return Err(e.into());
        }
    };
    info!(
        truth_keys = truth_keys.len(),
        target_keys = target_keys.len(),
        "[SYNC] Listed both sides"
    );

    if truth_keys.is_empty() && !target_keys.is_empty() && !config.allow_empty_truth {
        error!(
            truth = %truth.side(),
            target_keys = target_keys.len(),
            "[SYNC][ERROR] Truth side is empty; refusing to empty the target"
        );
        return Err(SyncError::EmptyTruth {
            side: truth.side(),
            target_count: target_keys.len(),
        });
    }

    let plan = reconcile(&truth_keys, &target_keys);
    info!(
        to_transfer = plan.to_transfer.len(),
        to_delete = plan.to_delete.len(),
        unchanged = plan.unchanged.len(),
        "[SYNC] Computed plan"
    );

    if config.dry_run {
        return Ok(SynchroniseReport {
            run_id,
            mode: config.mode,
            dry_run: true,
            plan,
            execution: None,
            manifest: ManifestStatus::Skipped,
        });
    }

    let executor = Executor::new(ExecutorConfig {
        concurrency: config.execution.concurrency,
        retry: config.execution.retry.clone(),
    });
    let execution = executor
        .execute(&plan, &truth_keys, truth, target, cancel)
        .await;

    let manifest = if config.manifest.enabled {
        match target.list().await {
            Ok(final_keys) => {
                if execution.is_success() && !reconcile(&truth_keys, &final_keys).is_empty() {
                    warn!("[SYNC] Target changed during the run; it has not fully converged");
                }
                match manifest::publish(
                    target,
                    &final_keys,
                    &config.manifest,
                    &config.execution.retry,
                )
                .await
                {
                    Ok(()) => ManifestStatus::Published {
                        entries: final_keys.len(),
                    },
                    Err(e) => ManifestStatus::Failed(e.to_string()),
                }
            }
            Err(e) => {
                error!(error = %e, "[SYNC][ERROR] Could not re-list target for the manifest");
                ManifestStatus::Failed(e.to_string())
            }
        }
    } else {
        ManifestStatus::Disabled
    };

    let report = SynchroniseReport {
        run_id,
        mode: config.mode,
        dry_run: false,
        plan,
        execution: Some(execution),
        manifest,
    };
    if report.is_success() {
        info!(
            transferred = report.transferred(),
            deleted = report.deleted(),
            unchanged = report.unchanged(),
            "[SYNC] Mirror run complete"
        );
    } else {
        error!(
            failed = report.failed(),
            not_attempted = report.not_attempted(),
            "[SYNC][ERROR] Mirror run finished with failures"
        );
    }
    Ok(report)
}
