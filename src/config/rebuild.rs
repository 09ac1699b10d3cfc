use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Data activity workers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RebuildConfig {
    /// When disabled, activities are tracked but no batches run
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Background workers draining the rebuild queue
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Chunks handed to the rebuild collaborator per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause before a node re-enters the queue for its next batch
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Unavailable nodes wait this long before their data is rebuilt elsewhere
    #[serde(default = "default_offline_grace_ms")]
    pub offline_grace_ms: u64,

    /// Upper bound for one rebuild batch
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            offline_grace_ms: default_offline_grace_ms(),
            batch_timeout_ms: default_batch_timeout_ms(),
        }
    }
}

impl RebuildConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.concurrency == 0 || self.batch_size == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "rebuild.concurrency ({}) and rebuild.batch_size ({}) must be at least 1",
                self.concurrency, self.batch_size
            ))));
        }
        if self.batch_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "rebuild.batch_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }
}

fn default_enabled() -> bool {
    true
}
fn default_concurrency() -> usize {
    3
}
fn default_batch_size() -> usize {
    20
}
fn default_batch_delay_ms() -> u64 {
    50
}
fn default_offline_grace_ms() -> u64 {
    5 * 60_000
}
fn default_batch_timeout_ms() -> u64 {
    10 * 60_000
}
