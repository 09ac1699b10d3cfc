use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Agent protocol settings shared by heartbeat handling and RPC reconciliation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AgentsConfig {
    /// Agents reporting a different version are answered with this version
    /// and are not registered until they upgrade
    #[serde(default = "default_server_version")]
    pub server_version: String,

    /// Scheme of the addresses pushed to agents (`<scheme>://<peer_id>`)
    #[serde(default = "default_rpc_protocol")]
    pub rpc_protocol: String,

    /// Timeout for agent info fetch and configuration pushes
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Timeout for each health probe
    #[serde(default = "default_test_connection_timeout_ms")]
    pub test_connection_timeout_ms: u64,

    /// Passive n2n port pushed to cloud-resource nodes
    #[serde(default = "default_cloud_n2n_port")]
    pub cloud_n2n_port: u16,

    /// Passive n2n port pushed to pool-backed nodes
    #[serde(default = "default_pool_backed_n2n_port")]
    pub pool_backed_n2n_port: u16,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            server_version: default_server_version(),
            rpc_protocol: default_rpc_protocol(),
            response_timeout_ms: default_response_timeout_ms(),
            test_connection_timeout_ms: default_test_connection_timeout_ms(),
            cloud_n2n_port: default_cloud_n2n_port(),
            pool_backed_n2n_port: default_pool_backed_n2n_port(),
        }
    }
}

impl AgentsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_version.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "agents.server_version must not be empty".into(),
            )));
        }
        if self.rpc_protocol.is_empty() || self.rpc_protocol.contains("://") {
            return Err(Error::Config(ConfigError::Message(format!(
                "agents.rpc_protocol must be a bare scheme, got {:?}",
                self.rpc_protocol
            ))));
        }
        if self.response_timeout_ms == 0 || self.test_connection_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "agent rpc timeouts must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.test_connection_timeout_ms)
    }
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_rpc_protocol() -> String {
    "n2n".to_string()
}
fn default_response_timeout_ms() -> u64 {
    60_000
}
fn default_test_connection_timeout_ms() -> u64 {
    10_000
}
fn default_cloud_n2n_port() -> u16 {
    60100
}
fn default_pool_backed_n2n_port() -> u16 {
    60101
}
