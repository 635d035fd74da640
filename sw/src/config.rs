//! swarmd configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main swarmd configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shared document storage
    pub storage: StorageConfig,

    /// Bus/findings retention and poll cadence
    pub coordination: CoordinationConfig,

    /// Instance process management
    pub orchestrator: OrchestratorConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .swarmd.yml
        let local_config = PathBuf::from(".swarmd.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/swarmd/swarmd.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("swarmd").join("swarmd.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Shared document storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the shared documents and the stop marker
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("swarmd"),
        }
    }
}

/// Coordination tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Most recent messages kept on the bus
    #[serde(rename = "message-retention")]
    pub message_retention: usize,

    /// Most recent findings kept per shared-memory section
    #[serde(rename = "finding-retention")]
    pub finding_retention: usize,

    /// Ask/respond poll cadence in milliseconds
    #[serde(rename = "poll-interval-ms")]
    pub poll_interval_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            message_retention: 1000,
            finding_retention: 500,
            poll_interval_ms: 1000,
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Smallest swarm the orchestrator will spawn
    #[serde(rename = "min-instances")]
    pub min_instances: usize,

    /// Largest swarm the orchestrator will spawn
    #[serde(rename = "max-instances")]
    pub max_instances: usize,

    /// Roles cycled across spawned instances, in order
    pub roles: Vec<String>,

    /// Delay between consecutive spawns in milliseconds
    #[serde(rename = "spawn-stagger-ms")]
    pub spawn_stagger_ms: u64,

    /// Grace period after writing the stop marker in milliseconds
    #[serde(rename = "grace-period-ms")]
    pub grace_period_ms: u64,

    /// Command line used to launch one instance process
    #[serde(rename = "instance-command")]
    pub instance_command: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            min_instances: 2,
            max_instances: 4,
            roles: vec![
                "explorer".to_string(),
                "builder".to_string(),
                "reflector".to_string(),
                "coordinator".to_string(),
            ],
            spawn_stagger_ms: 1000,
            grace_period_ms: 2000,
            instance_command: vec!["swarm-instance".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.coordination.message_retention, 1000);
        assert_eq!(config.coordination.finding_retention, 500);
        assert_eq!(config.coordination.poll_interval_ms, 1000);
        assert_eq!(config.orchestrator.min_instances, 2);
        assert_eq!(config.orchestrator.max_instances, 4);
        assert_eq!(config.orchestrator.roles.len(), 4);
        assert_eq!(config.orchestrator.roles[0], "explorer");
    }

    #[test]
    fn test_parse_yaml_with_kebab_keys() {
        let yaml = r#"
storage:
  data-dir: /tmp/swarm-test
coordination:
  message-retention: 50
  poll-interval-ms: 250
orchestrator:
  max-instances: 3
  instance-command: ["sh", "-c", "exit 0"]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/swarm-test"));
        assert_eq!(config.coordination.message_retention, 50);
        assert_eq!(config.coordination.poll_interval_ms, 250);
        // Unset fields fall back to defaults
        assert_eq!(config.coordination.finding_retention, 500);
        assert_eq!(config.orchestrator.min_instances, 2);
        assert_eq!(config.orchestrator.max_instances, 3);
        assert_eq!(config.orchestrator.instance_command, vec!["sh", "-c", "exit 0"]);
    }

    #[test]
    fn test_load_explicit_missing_path_fails() {
        let path = PathBuf::from("/definitely/not/a/config.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
