use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Periodic scan pacing
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ScanConfig {
    /// Period between two scan passes
    #[serde(default = "default_run_delay_ms")]
    pub run_delay_ms: u64,

    /// Delay of the first pass after the registry is loaded
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// The next pass is pulled in to this delay after a pool migration
    #[serde(default = "default_hurry_delay_ms")]
    pub hurry_delay_ms: u64,

    /// Delay of the single-node pass that follows a (re)connection, so the
    /// heartbeat reply lands before the server starts calling the agent
    #[serde(default = "default_node_recheck_delay_ms")]
    pub node_recheck_delay_ms: u64,

    /// Nodes processed concurrently within one pass
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Number of I/O rounds requested from the storage probe
    #[serde(default = "default_store_perf_count")]
    pub store_perf_count: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            run_delay_ms: default_run_delay_ms(),
            initial_delay_ms: default_initial_delay_ms(),
            hurry_delay_ms: default_hurry_delay_ms(),
            node_recheck_delay_ms: default_node_recheck_delay_ms(),
            concurrency: default_concurrency(),
            store_perf_count: default_store_perf_count(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run_delay_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "scan.run_delay_ms must be greater than 0".into(),
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::Config(ConfigError::Message(
                "scan.concurrency must be greater than 0".into(),
            )));
        }
        if self.initial_delay_ms > self.run_delay_ms || self.hurry_delay_ms > self.run_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "scan initial/hurry delays ({}ms/{}ms) must not exceed run_delay_ms {}ms",
                self.initial_delay_ms, self.hurry_delay_ms, self.run_delay_ms
            ))));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.run_delay_ms)
    }
}

/// Heartbeat liveness window
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LivenessConfig {
    /// A node is online only while `now < heartbeat + heartbeat_grace_ms`
    #[serde(default = "default_heartbeat_grace_ms")]
    pub heartbeat_grace_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            heartbeat_grace_ms: default_heartbeat_grace_ms(),
        }
    }
}

impl LivenessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_grace_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "liveness.heartbeat_grace_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_run_delay_ms() -> u64 {
    60_000
}
fn default_initial_delay_ms() -> u64 {
    3_000
}
fn default_hurry_delay_ms() -> u64 {
    3_000
}
fn default_node_recheck_delay_ms() -> u64 {
    100
}
fn default_concurrency() -> usize {
    5
}
fn default_store_perf_count() -> u32 {
    5
}
fn default_heartbeat_grace_ms() -> u64 {
    10 * 60_000
}
