use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::reconcile::SyncMode;
use crate::retry::RetryPolicy;

pub const DEFAULT_MANIFEST_KEY: &str = "index.html";
pub const DEFAULT_MANIFEST_CACHE_CONTROL: &str = "max-age=0, no-cache";

/// Everything one mirror run needs. Built once by the caller and passed down.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub mode: SyncMode,
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub ignore: IgnoreConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub ledger: Option<LedgerConfig>,
    /// Let an empty truth side delete every target object.
    #[serde(default)]
    pub allow_empty_truth: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl MirrorConfig {
    pub fn trace_loaded(&self) {
        info!(
            mode = ?self.mode,
            root = %self.local.root.display(),
            bucket = %self.remote.bucket,
            concurrency = self.execution.concurrency,
            max_attempts = self.execution.retry.max_attempts,
            manifest = self.manifest.enabled,
            dry_run = self.dry_run,
            "Loaded MirrorConfig"
        );
        debug!(?self, "MirrorConfig loaded (full debug)");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("remote.bucket"));
        }
        if self.remote.access_key.is_empty() {
            return Err(ConfigError::Missing("remote.access_key"));
        }
        if self.remote.secret_key.is_empty() {
            return Err(ConfigError::Missing("remote.secret_key"));
        }
        if self.execution.concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "execution.concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.execution.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "execution.retry.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        if self.manifest.enabled && crate::key::Key::parse(&self.manifest.key).is_err() {
            return Err(ConfigError::Invalid {
                name: "manifest.key",
                reason: format!("{:?} is not a valid object key", self.manifest.key),
            });
        }
        Ok(())
    }

    /// Base names that must stay invisible to reconciliation on both sides.
    pub fn reserved_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(name) = self.manifest.key.rsplit('/').next() {
            names.push(name.to_string());
        }
        if let Some(name) = self
            .ledger
            .as_ref()
            .and_then(|l| l.path.file_name())
            .and_then(|n| n.to_str())
        {
            names.push(name.to_string());
        }
        names
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub root: PathBuf,
}

/// S3-compatible bucket coordinates. Secrets are redacted from `Debug`.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Cloudflare account id; derives the R2 endpoint when `endpoint` is unset.
    #[serde(default)]
    pub account_id: Option<String>,
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub region: Option<String>,
}

impl RemoteConfig {
    pub fn resolved_endpoint(&self) -> Option<String> {
        match (&self.endpoint, &self.account_id) {
            (Some(endpoint), _) => Some(endpoint.trim_end_matches('/').to_string()),
            (None, Some(account)) => Some(format!("https://{account}.r2.cloudflarestorage.com")),
            (None, None) => None,
        }
    }

    pub fn resolved_region(&self) -> String {
        match &self.region {
            Some(region) => region.clone(),
            None if self.resolved_endpoint().is_some() => "auto".to_string(),
            None => "us-east-1".to_string(),
        }
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("endpoint", &self.endpoint)
            .field("account_id", &self.account_id)
            .field("bucket", &self.bucket)
            .field("access_key", &redact(&self.access_key))
            .field("secret_key", &redact(&self.secret_key))
            .field("region", &self.region)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IgnoreConfig {
    #[serde(default = "default_ignore_names")]
    pub names: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub hidden: bool,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            names: default_ignore_names(),
            patterns: Vec::new(),
            hidden: true,
        }
    }
}

fn default_ignore_names() -> Vec<String> {
    vec!["desktop.ini".to_string(), DEFAULT_MANIFEST_KEY.to_string()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_manifest_key")]
    pub key: String,
    #[serde(default = "default_cache_control")]
    pub cache_control: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key: default_manifest_key(),
            cache_control: default_cache_control(),
        }
    }
}

fn default_manifest_key() -> String {
    DEFAULT_MANIFEST_KEY.to_string()
}

fn default_cache_control() -> String {
    DEFAULT_MANIFEST_CACHE_CONTROL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub path: PathBuf,
}
