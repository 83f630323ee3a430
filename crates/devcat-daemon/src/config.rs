//! Configuration loading and validation

use anyhow::Result;
use devcat_store::CollectionNames;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub collections: CollectionNames,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot file; the store lives only in memory when unset
    #[serde(default)]
    pub snapshot_path: Option<String>,
    /// Deadline for every query and re-derivation, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_request_timeout() -> u64 {
    5000
}

/// Files derived once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedConfig {
    /// JSON array of device types
    #[serde(default)]
    pub device_types: Option<String>,
    /// JSON array of aspect trees
    #[serde(default)]
    pub aspects: Option<String>,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        store: StoreConfig {
            snapshot_path: Some("./data/devcat.json".to_string()),
            ..Default::default()
        },
        seed: SeedConfig {
            device_types: Some("./seed/device_types.json".to_string()),
            aspects: Some("./seed/aspects.json".to_string()),
        },
        ..Default::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config() {
        let config: Config = toml::from_str(
            r#"
[store]
snapshot_path = "/var/lib/devcat/store.json"

[collections]
criteria = "criteria_v2"
"#,
        )
        .unwrap();

        assert_eq!(config.daemon.bind, "0.0.0.0:8080");
        assert_eq!(config.store.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.collections.criteria, "criteria_v2");
        assert_eq!(config.collections.aspect_nodes, "aspect_nodes");
        assert!(config.seed.device_types.is_none());
    }

    #[test]
    fn test_default_config_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("devcat.toml");
        save_default_config(&path).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.store.snapshot_path.as_deref(), Some("./data/devcat.json"));
        assert_eq!(config.seed.aspects.as_deref(), Some("./seed/aspects.json"));

        let missing = load_config(&temp_dir.path().join("absent.toml")).unwrap();
        assert!(missing.store.snapshot_path.is_none());
    }
}
