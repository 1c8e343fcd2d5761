use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Engine tunables. Every field has a default, so a missing or partial
/// config file is never fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Page size requested from the ancestor-history API.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,
    /// How many lost version races a single sync call tolerates.
    #[serde(default = "default_max_sync_attempts")]
    pub max_sync_attempts: u32,
    #[serde(default = "default_sync_backoff_ms")]
    pub sync_backoff_ms: u64,
    #[serde(default = "default_max_sync_backoff_ms")]
    pub max_sync_backoff_ms: u64,
    /// Optional shallow-fetch depth passed to the object transport.
    #[serde(default)]
    pub fetch_depth: Option<u32>,
    /// Ref namespaces mirrored from the remote.
    #[serde(default = "default_ref_prefixes")]
    pub ref_prefixes: Vec<String>,
}

fn default_history_page_size() -> u32 {
    100
}

fn default_max_sync_attempts() -> u32 {
    5
}

fn default_sync_backoff_ms() -> u64 {
    50
}

fn default_max_sync_backoff_ms() -> u64 {
    1_000
}

fn default_ref_prefixes() -> Vec<String> {
    vec![
        "refs/heads/".to_string(),
        "refs/tags/".to_string(),
        "refs/pull/".to_string(),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_page_size: default_history_page_size(),
            max_sync_attempts: default_max_sync_attempts(),
            sync_backoff_ms: default_sync_backoff_ms(),
            max_sync_backoff_ms: default_max_sync_backoff_ms(),
            fetch_depth: None,
            ref_prefixes: default_ref_prefixes(),
        }
    }
}

impl Config {
    pub fn from_raw(raw: &str) -> Config {
        match serde_json::from_str(raw) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Invalid config file, falling back to defaults: {}", err);
                Config::default()
            }
        }
    }
}

/// Will always return config, falling back to defaults on missing/invalid
/// files.
pub async fn load_config_from_file(config_path: &PathBuf) -> Config {
    match std::fs::read_to_string(config_path) {
        Ok(raw_config) => Config::from_raw(&raw_config),
        Err(err) => {
            if err.kind() == std::io::ErrorKind::NotFound {
                tracing::info!("No config file found, using defaults");
            } else {
                tracing::warn!("Failed to read config file: {}", err);
            }
            Config::default()
        }
    }
}

pub async fn save_config_to_file(config: &Config, config_path: &Path) -> Result<(), ConfigError> {
    let raw = serde_json::to_string_pretty(config)?;
    std::fs::write(config_path, raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_in_defaults() {
        let config = Config::from_raw(r#"{"history_page_size": 25}"#);
        assert_eq!(config.history_page_size, 25);
        assert_eq!(config.max_sync_attempts, default_max_sync_attempts());
        assert_eq!(config.ref_prefixes, default_ref_prefixes());
    }

    #[test]
    fn garbage_config_falls_back_to_defaults() {
        let config = Config::from_raw("not json at all");
        assert_eq!(config.history_page_size, default_history_page_size());
    }

    #[tokio::test]
    async fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.history_page_size = 10;
        save_config_to_file(&config, &path).await.expect("saved");

        let loaded = load_config_from_file(&path).await;
        assert_eq!(loaded.history_page_size, 10);
    }
}
