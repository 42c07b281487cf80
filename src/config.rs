//! Configuration file loading and database path resolution.
//!
//! Config lives at `~/.config/punchlist/config.yaml` (per-platform via
//! `dirs`). A missing file is not an error; everything has a default.

use crate::sync::Integration;
use eyre::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database path; overridden by `--db` and `PUNCHLIST_DB`.
    pub db: Option<PathBuf>,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before each bulk create call, in milliseconds.
    pub pacing_ms: u64,
    /// Adapter commands keyed by integration name.
    pub adapters: HashMap<String, AdapterConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 500,
            adapters: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    /// Argv used to spawn the adapter process.
    pub command: Vec<String>,
}

/// Errors that can occur resolving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Adapter key in the config file is not a known integration.
    UnknownIntegration(String),
    /// A sync command needs an adapter the config does not define.
    MissingAdapter(Integration),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::UnknownIntegration(name) => {
                write!(f, "unknown integration in config: {}", name)
            }
            ConfigError::MissingAdapter(integration) => {
                write!(
                    f,
                    "no adapter command configured for {}; add sync.adapters.{} to the config file",
                    integration,
                    integration.key()
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load the config file, or defaults when it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.sync.adapters = config
            .sync
            .adapters
            .into_iter()
            .map(|(name, adapter)| (name.to_lowercase(), adapter))
            .collect();
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for name in self.sync.adapters.keys() {
            if Integration::parse(name).is_err() {
                return Err(eyre::eyre!(ConfigError::UnknownIntegration(name.clone())));
            }
        }
        Ok(())
    }

    /// Where the database lives. Precedence: `--db` flag, then the
    /// `PUNCHLIST_DB` environment variable, then the config file, then
    /// the platform data directory.
    pub fn resolve_db_path(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(path) = flag {
            return path.to_path_buf();
        }
        if let Ok(env_path) = std::env::var("PUNCHLIST_DB")
            && !env_path.is_empty()
        {
            return PathBuf::from(env_path);
        }
        if let Some(path) = &self.db {
            return path.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("punchlist")
            .join("punchlist.db")
    }

    /// Adapter command for one integration, or a pointed error naming the
    /// config key to add.
    pub fn adapter_command(&self, integration: Integration) -> Result<&AdapterConfig, ConfigError> {
        self.sync
            .adapters
            .get(integration.key())
            .ok_or(ConfigError::MissingAdapter(integration))
    }

    /// All configured adapter commands, for the transport.
    pub fn adapter_commands(&self) -> HashMap<String, Vec<String>> {
        self.sync
            .adapters
            .iter()
            .map(|(name, adapter)| (name.clone(), adapter.command.clone()))
            .collect()
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.sync.pacing_ms)
    }
}

fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("punchlist").join("config.yaml"))
}
