//! Core configuration types and loading.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::IdentifierKind;

/// Which LLM extraction path is active. `Disabled` means the cascade
/// never reaches the LLM stage and content-stage exhaustion goes
/// straight to `exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LlmProvider {
    Local,
    Remote,
    #[default]
    Disabled,
}

/// Top-level core configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub concurrency: u32,
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
    #[serde(rename = "max-retries")]
    pub max_retries: u32,
    #[serde(rename = "backoff-max-ms")]
    pub backoff_max_ms: u64,
    #[serde(rename = "llm-provider")]
    pub llm_provider: LlmProvider,
    #[serde(rename = "identifier-priority")]
    pub identifier_priority: Vec<IdentifierKind>,
    #[serde(rename = "session-retention-ms")]
    pub session_retention_ms: u64,
    #[serde(rename = "session-sweep-interval-ms")]
    pub session_sweep_interval_ms: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval_ms: 500,
            max_retries: 3,
            backoff_max_ms: 60_000,
            llm_provider: LlmProvider::Disabled,
            identifier_priority: vec![
                IdentifierKind::Doi,
                IdentifierKind::Pmid,
                IdentifierKind::Arxiv,
                IdentifierKind::Isbn,
            ],
            session_retention_ms: 600_000,
            session_sweep_interval_ms: 60_000,
        }
    }
}

impl CoreConfig {
    /// Load configuration with a fallback chain: explicit path, then
    /// project-local `.theodore.yml`, then user config, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".theodore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("failed to load config from {}: {}", local_config.display(), e),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("theodore").join("theodore.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("failed to load config from {}: {}", user_config.display(), e),
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("failed to parse config file")?;
        tracing::info!("loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = CoreConfig::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_max_ms, 60_000);
        assert_eq!(config.identifier_priority[0], IdentifierKind::Doi);
        assert_eq!(config.llm_provider, LlmProvider::Disabled);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "concurrency: 10\n";
        let config: CoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn deserializes_identifier_priority() {
        let yaml = "identifier-priority: [PMID, DOI]\n";
        let config: CoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.identifier_priority, vec![IdentifierKind::Pmid, IdentifierKind::Doi]);
    }

    #[test]
    fn load_reads_an_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theodore.yml");
        fs::write(&path, "concurrency: 7\nmax-retries: 1\n").unwrap();

        let config = CoreConfig::load(Some(&path)).unwrap();
        assert_eq!(config.concurrency, 7);
        assert_eq!(config.max_retries, 1);
        // Fields absent from the file still take their defaults.
        assert_eq!(config.backoff_max_ms, 60_000);
    }

    #[test]
    fn load_with_missing_explicit_path_errs() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yml");
        assert!(CoreConfig::load(Some(&missing)).is_err());
    }
}
