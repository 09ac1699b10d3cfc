//! Configuration management for the nodes monitor.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation

mod agents;
mod health;
mod persistence;
mod pools;
mod rebuild;
mod retry;
mod scan;
pub use agents::*;
pub use health::*;
pub use persistence::*;
pub use pools::*;
pub use rebuild::*;
pub use retry::*;
pub use scan::*;

#[cfg(test)]
mod health_test;

use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Environment variable prefix for configuration overrides, e.g.
/// `MONITOR__SCAN__RUN_DELAY_MS=30000`.
pub const ENV_PREFIX: &str = "MONITOR";

/// Main configuration container for the monitor components
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct MonitorConfig {
    /// Agent protocol settings and RPC timeouts
    #[serde(default)]
    pub agents: AgentsConfig,
    /// Periodic scan pacing and concurrency
    #[serde(default)]
    pub scan: ScanConfig,
    /// Heartbeat liveness window
    #[serde(default)]
    pub liveness: LivenessConfig,
    /// Probe detention and trust thresholds
    #[serde(default)]
    pub detention: DetentionConfig,
    /// Free space reserve and capacity limits
    #[serde(default)]
    pub capacity: CapacityConfig,
    /// Issue log and latency sample bounds
    #[serde(default)]
    pub issues: IssuesConfig,
    /// Data activity workers
    #[serde(default)]
    pub rebuild: RebuildConfig,
    /// Write coalescing
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Pool naming and allocation
    #[serde(default)]
    pub pools: PoolsConfig,
    /// Retry policies for store access
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl MonitorConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `MONITOR__` prefix (highest priority)
    ///
    /// # Note
    /// Callers must call `validate()` once all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// let cfg = MonitorConfig::new()?
    ///     .with_override_config("monitor.toml")?
    ///     .validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }
        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every subsystem and returns the validated instance.
    pub fn validate(self) -> Result<Self> {
        self.agents.validate()?;
        self.scan.validate()?;
        self.liveness.validate()?;
        self.detention.validate()?;
        self.capacity.validate()?;
        self.issues.validate()?;
        self.rebuild.validate()?;
        self.persistence.validate()?;
        self.pools.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
