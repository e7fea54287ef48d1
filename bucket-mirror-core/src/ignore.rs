use regex::Regex;
use tracing::debug;

use crate::config::IgnoreConfig;
use crate::error::ConfigError;

/// Base-name filter applied identically to both sides before reconciliation.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    names: Vec<String>,
    patterns: Vec<Regex>,
    hidden: bool,
}

impl IgnoreRules {
    /// Build the rules; `always` names (manifest, ledger) are added regardless of config.
    pub fn from_config<I, S>(config: &IgnoreConfig, always: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = config
            .names
            .iter()
            .map(|n| n.to_ascii_lowercase())
            .collect();
        for name in always {
            let name = name.into().to_ascii_lowercase();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        let patterns = config
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::Invalid {
                    name: "ignore.patterns",
                    reason: format!("{p:?}: {e}"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            names = ?names,
            patterns = patterns.len(),
            hidden = config.hidden,
            "Built ignore rules"
        );
        Ok(Self {
            names,
            patterns,
            hidden: config.hidden,
        })
    }

    pub fn is_ignored(&self, base_name: &str) -> bool {
        if self.hidden && base_name.starts_with('.') {
            return true;
        }
        let lower = base_name.to_ascii_lowercase();
        self.names.iter().any(|n| *n == lower) || self.patterns.iter().any(|p| p.is_match(base_name))
    }
}
