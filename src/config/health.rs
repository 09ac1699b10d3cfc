//! Health thresholds consumed by the status engine and the probes.

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * MIB;

/// Probe detention and trust thresholds
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DetentionConfig {
    /// A detention timer clears once no failure renewed it for this long.
    /// Also the window in which issue reports count as recent.
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,

    /// Recent read/write/replicate issue reports that put a node in detention
    #[serde(default = "default_recent_issues")]
    pub recent_issues: usize,

    /// Healthy same-pool peers sampled by the peer network probe
    #[serde(default = "default_test_nodes")]
    pub test_nodes: usize,

    /// Recent tampering reports that mark a node untrusted
    #[serde(default = "default_tampering_strikes")]
    pub tampering_strikes: usize,
}

impl Default for DetentionConfig {
    fn default() -> Self {
        Self {
            threshold_ms: default_threshold_ms(),
            recent_issues: default_recent_issues(),
            test_nodes: default_test_nodes(),
            tampering_strikes: default_tampering_strikes(),
        }
    }
}

impl DetentionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threshold_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "detention.threshold_ms must be greater than 0".into(),
            )));
        }
        if self.recent_issues == 0 || self.tampering_strikes == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "detention.recent_issues ({}) and detention.tampering_strikes ({}) must be at least 1",
                self.recent_issues, self.tampering_strikes
            ))));
        }
        Ok(())
    }
}

/// Free space reserve and capacity limits
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CapacityConfig {
    /// Free bytes held back on every agent-hosted storage node
    #[serde(default = "default_free_space_reserve")]
    pub free_space_reserve: u64,

    /// Storage nodes smaller than this are not enabled on first contact
    #[serde(default = "default_minimum_agent_total_storage")]
    pub minimum_agent_total_storage: u64,

    /// At or below this many free bytes a node has no capacity
    #[serde(default = "default_no_capacity_free")]
    pub no_capacity_free: u64,

    /// At or below this free percentage a node has low capacity
    #[serde(default = "default_low_capacity_percent")]
    pub low_capacity_percent: u64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            free_space_reserve: default_free_space_reserve(),
            minimum_agent_total_storage: default_minimum_agent_total_storage(),
            no_capacity_free: default_no_capacity_free(),
            low_capacity_percent: default_low_capacity_percent(),
        }
    }
}

impl CapacityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.low_capacity_percent > 100 {
            return Err(Error::Config(ConfigError::Message(format!(
                "capacity.low_capacity_percent must be at most 100, got {}",
                self.low_capacity_percent
            ))));
        }
        Ok(())
    }
}

/// Bounds of the per-node logs
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IssuesConfig {
    /// Retained issue reports per node; older ones fold into counters
    #[serde(default = "default_max_issue_reports")]
    pub max_issue_reports: usize,

    /// Retained latency samples per series
    #[serde(default = "default_max_latencies")]
    pub max_latencies: usize,
}

impl Default for IssuesConfig {
    fn default() -> Self {
        Self {
            max_issue_reports: default_max_issue_reports(),
            max_latencies: default_max_latencies(),
        }
    }
}

impl IssuesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_issue_reports == 0 || self.max_latencies == 0 {
            return Err(Error::Config(ConfigError::Message(
                "issues.max_issue_reports and issues.max_latencies must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

fn default_threshold_ms() -> u64 {
    3 * 60_000
}
fn default_recent_issues() -> usize {
    5
}
fn default_test_nodes() -> usize {
    3
}
fn default_tampering_strikes() -> usize {
    1
}
fn default_free_space_reserve() -> u64 {
    100 * MIB
}
fn default_minimum_agent_total_storage() -> u64 {
    30 * GIB
}
fn default_no_capacity_free() -> u64 {
    MIB
}
fn default_low_capacity_percent() -> u64 {
    20
}
fn default_max_issue_reports() -> usize {
    20
}
fn default_max_latencies() -> usize {
    20
}
