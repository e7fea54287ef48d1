/// `load_config` module: Loads a static YAML config and injects secrets and overrides from the environment.
///
/// This module is the only place where untrusted YAML is parsed and mapped onto the core
/// [`MirrorConfig`].
///
/// # Responsibilities
/// - Parse the user-supplied YAML file (which never holds credentials)
/// - Inject credentials and deployment overrides from environment variables
/// - Validate the merged result before any storage is touched
///
/// # Environment
/// | Setting            | Variables (first non-empty wins)                                        |
/// |--------------------|-------------------------------------------------------------------------|
/// | access key         | `MIRROR_ACCESS_KEY_ID`, `R2_ACCESS_KEY_ID`, `AWS_ACCESS_KEY_ID`         |
/// | secret key         | `MIRROR_SECRET_ACCESS_KEY`, `R2_SECRET_ACCESS_KEY`, `AWS_SECRET_ACCESS_KEY` |
/// | account id         | `R2_ACCOUNT_ID`                                                         |
/// | bucket             | `R2_BUCKET_NAME`, `AWS_BUCKET_NAME`                                     |
/// | region             | `AWS_REGION`                                                            |
/// | local root         | `LOCAL_FOLDER`                                                          |
///
/// # Errors
/// All errors in this module use `anyhow::Error` for context-rich diagnostics, and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use bucket_mirror_core::config::{
    ExecutionConfig, IgnoreConfig, LedgerConfig, LocalConfig, ManifestConfig, MirrorConfig,
    RemoteConfig,
};
use bucket_mirror_core::error::ConfigError;
use bucket_mirror_core::reconcile::SyncMode;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const ACCESS_KEY_VARS: &[&str] = &["MIRROR_ACCESS_KEY_ID", "R2_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"];
const SECRET_KEY_VARS: &[&str] = &[
    "MIRROR_SECRET_ACCESS_KEY",
    "R2_SECRET_ACCESS_KEY",
    "AWS_SECRET_ACCESS_KEY",
];
const BUCKET_VARS: &[&str] = &["R2_BUCKET_NAME", "AWS_BUCKET_NAME"];

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    mode: Option<SyncMode>,
    #[serde(default)]
    local: RawLocal,
    #[serde(default)]
    remote: RawRemote,
    #[serde(default)]
    ignore: IgnoreConfig,
    #[serde(default)]
    execution: ExecutionConfig,
    #[serde(default)]
    manifest: ManifestConfig,
    #[serde(default)]
    ledger: Option<LedgerConfig>,
    #[serde(default)]
    allow_empty_truth: bool,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawLocal {
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRemote {
    endpoint: Option<String>,
    account_id: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

/// Loads a static YAML config file (no secrets), injects env vars and validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<MirrorConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let root = std::env::var_os("LOCAL_FOLDER")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or(raw.local.root)
        .ok_or(ConfigError::Missing("local.root"))?;

    let remote = RemoteConfig {
        endpoint: raw.remote.endpoint,
        account_id: first_env(&["R2_ACCOUNT_ID"]).or(raw.remote.account_id),
        bucket: first_env(BUCKET_VARS)
            .or(raw.remote.bucket)
            .unwrap_or_default(),
        access_key: first_env(ACCESS_KEY_VARS).unwrap_or_default(),
        secret_key: first_env(SECRET_KEY_VARS).unwrap_or_default(),
        region: first_env(&["AWS_REGION"]).or(raw.remote.region),
    };

    let config = MirrorConfig {
        mode: raw.mode.unwrap_or(SyncMode::PushMirror),
        local: LocalConfig { root },
        remote,
        ignore: raw.ignore,
        execution: raw.execution,
        manifest: raw.manifest,
        ledger: raw.ledger,
        allow_empty_truth: raw.allow_empty_truth,
        dry_run: raw.dry_run,
    };

    if let Err(e) = config.validate() {
        error!(error = %e, config_path = ?path_ref, "Config failed validation");
        return Err(e).with_context(|| format!("Invalid configuration in {path_ref:?}"));
    }
    config.trace_loaded();
    Ok(config)
}
