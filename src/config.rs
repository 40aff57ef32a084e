use std::{path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseConfig {
    #[default]
    Memory,
    File { path: PathBuf },
}

/// Settings for a session. Every field has a default, so `{}` is a valid
/// configuration document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub database: DatabaseConfig,
    /// How long a change-feed worker blocks before re-checking for tenant
    /// changes and stop requests.
    pub feed_poll_interval_ms: u64,
    /// Initial state of the realtime toggle for new collections.
    pub realtime_by_default: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::Memory,
            feed_poll_interval_ms: 50,
            realtime_by_default: true,
        }
    }
}

impl SyncConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SyncConfig = serde_json::from_str(json).context("invalid sync configuration")?;
        if config.feed_poll_interval_ms == 0 {
            anyhow::bail!("feed_poll_interval_ms must be greater than zero");
        }
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed_poll_interval_ms)
    }
}
