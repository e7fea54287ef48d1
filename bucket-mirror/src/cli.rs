///
/// This module implements the full CLI interface for bucket-mirror: command parsing,
/// argument validation, and wiring the concrete stores into the core pipeline.
///
/// All core business logic (listing, reconciliation, execution, ledger) lives in the
/// [`bucket-mirror-core`] crate. This module is strictly CLI glue.
///
/// ## Commands
/// - `sync`: one mirror pass between the local root and the bucket.
/// - `ledger check|record|list`: inspect or extend an ingestion ledger by hand.
/// - `ingest`: run a fetch command for every id the ledger has not seen yet.
///
/// ## Exit status
/// [`run`] returns [`ExitCode::SUCCESS`] only when every planned item succeeded.
/// `ledger check` succeeds when the id is already recorded.
///
/// [`bucket-mirror-core`]: ../../bucket_mirror_core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use bucket_mirror_core::error::Side;
use bucket_mirror_core::ignore::IgnoreRules;
use bucket_mirror_core::ledger::{ingest_all, Ledger};
use bucket_mirror_core::reconcile::SyncMode;
use bucket_mirror_core::store::{FsStore, S3Store};
use bucket_mirror_core::synchronise::synchronise;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// CLI for bucket-mirror: keep a directory tree and an object bucket identical.
#[derive(Parser)]
#[clap(
    name = "bucket-mirror",
    version,
    about = "Mirror a local directory tree to an S3-compatible bucket, or the bucket back to the directory"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Make the target side identical to the truth side
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override the mode from the config file
        #[clap(long, value_enum)]
        mode: Option<ModeArg>,
        /// Print the plan without changing anything
        #[clap(long)]
        dry_run: bool,
        /// Allow an empty truth side to delete every target object
        #[clap(long)]
        allow_empty_truth: bool,
    },
    /// Inspect or extend an ingestion ledger
    Ledger {
        #[clap(subcommand)]
        action: LedgerCommand,
    },
    /// Fetch every unseen id with a command template and record the successes
    Ingest {
        /// Path to the ledger file
        #[clap(long)]
        ledger: PathBuf,
        /// Command to run per id; `{id}` is replaced with the id
        #[clap(long)]
        command: String,
        #[clap(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum LedgerCommand {
    /// Exit 0 if the id is recorded, 1 otherwise
    Check {
        #[clap(long)]
        ledger: PathBuf,
        id: String,
    },
    /// Record an id as ingested
    Record {
        #[clap(long)]
        ledger: PathBuf,
        id: String,
    },
    /// Print every recorded id
    List {
        #[clap(long)]
        ledger: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    PushMirror,
    PullMirror,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::PushMirror => SyncMode::PushMirror,
            ModeArg::PullMirror => SyncMode::PullMirror,
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<ExitCode> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            mode,
            dry_run,
            allow_empty_truth,
        } => {
            let mut config = load_config(config)?;
            if let Some(mode) = mode {
                config.mode = mode.into();
            }
            config.dry_run |= dry_run;
            config.allow_empty_truth |= allow_empty_truth;
            tracing::info!(command = "sync", mode = ?config.mode, "Starting synchronisation process");

            let ignore = IgnoreRules::from_config(&config.ignore, config.reserved_names())?;
            let local = FsStore::new(&config.local.root, ignore.clone())
                .missing_root_is_empty(config.mode.target_side() == Side::Local);
            let remote = S3Store::connect(&config.remote, ignore, config.execution.retry.clone());

            let cancel = CancellationToken::new();
            let interrupt = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupt received; finishing in-flight items");
                        cancel.cancel();
                    }
                })
            };
            let outcome = synchronise(&config, &local, &remote, &cancel).await;
            interrupt.abort();

            match outcome {
                Ok(report) => {
                    println!("{report}");
                    tracing::info!(
                        command = "sync",
                        run_id = %report.run_id,
                        success = report.is_success(),
                        "Synchronisation complete"
                    );
                    Ok(exit_code(report.is_success()))
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(anyhow::Error::new(e).context("Synchronisation aborted"))
                }
            }
        }
        Commands::Ledger { action } => match action {
            LedgerCommand::Check { ledger, id } => {
                let ledger = Ledger::open(&ledger)?;
                let seen = ledger.seen(&id);
                println!("{}", if seen { "seen" } else { "unseen" });
                Ok(exit_code(seen))
            }
            LedgerCommand::Record { ledger, id } => {
                let mut ledger = Ledger::open(&ledger)?;
                ledger.record(&id)?;
                tracing::info!(id = %id, path = %ledger.path().display(), "Recorded id");
                Ok(ExitCode::SUCCESS)
            }
            LedgerCommand::List { ledger } => {
                let ledger = Ledger::open(&ledger)?;
                for id in ledger.ids() {
                    println!("{id}");
                }
                Ok(ExitCode::SUCCESS)
            }
        },
        Commands::Ingest {
            ledger,
            command,
            ids,
        } => {
            let mut ledger = Ledger::open(&ledger)?;
            let report = ingest_all(&mut ledger, ids, |id| fetch(&command, id)).await;
            println!(
                "fetched: {}, skipped: {}, failed: {}",
                report.fetched.len(),
                report.skipped.len(),
                report.failed.len()
            );
            for (id, reason) in &report.failed {
                println!("  FAILED {id}: {reason}");
            }
            Ok(exit_code(report.is_success()))
        }
    }
}

/// Run `template` with `{id}` substituted in each argument. No shell is involved.
async fn fetch(template: &str, id: String) -> Result<()> {
    let mut argv = template
        .split_whitespace()
        .map(|arg| arg.replace("{id}", &id));
    let program = argv.next().context("ingest command template is empty")?;
    let status = tokio::process::Command::new(&program)
        .args(argv)
        .status()
        .await
        .with_context(|| format!("failed to start {program}"))?;
    if !status.success() {
        anyhow::bail!("{program} exited with {status}");
    }
    Ok(())
}
