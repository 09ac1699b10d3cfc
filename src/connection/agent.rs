use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::Drive;
use crate::NodeRole;
use crate::OsInfo;
use crate::Result;
use crate::StorageCounters;

/// What an agent reports about itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub host_id: String,
    pub version: String,
    pub ip: String,
    pub base_address: Option<String>,
    pub rpc_address: Option<String>,
    pub n2n_config: Option<Value>,
    pub geolocation: String,
    pub role: NodeRole,
    pub storage: StorageCounters,
    pub drives: Vec<Drive>,
    pub os_info: Option<OsInfo>,
    pub debug_level: u32,
    pub enabled: bool,
    pub permission_tampering: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SslCerts {
    pub cert: String,
    pub key: String,
}

/// Addressing fields pushed to an agent; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcConfigUpdate {
    pub rpc_address: Option<String>,
    pub base_address: Option<String>,
    pub n2n_config: Option<Value>,
}

impl RpcConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self.rpc_address.is_none() && self.base_address.is_none() && self.n2n_config.is_none()
    }
}

/// Latency samples in ms from a storage probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorePerf {
    pub read: Vec<f64>,
    pub write: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTestParams {
    pub source: String,
    pub target: String,
    pub request_length: u32,
    pub response_length: u32,
}

impl NetworkTestParams {
    /// Minimal round trip used by the health probes
    pub fn ping(
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            request_length: 1,
            response_length: 1,
        }
    }
}

/// Transport channel to one agent process, plus the RPC surface it serves.
///
/// A connection is owned by at most one node item at a time.
#[async_trait]
pub trait AgentConnection: Send + Sync + 'static {
    fn connection_id(&self) -> u64;

    /// Origin host of the transport; distinguishes cloned agents
    fn remote_host(&self) -> String;

    fn is_connected(&self) -> bool;

    fn close(&self);

    /// Resolves once the transport is closed
    async fn closed(&self);

    async fn get_agent_info(
        &self,
        server_addresses: Vec<String>,
    ) -> Result<AgentInfo>;

    async fn update_node_service(
        &self,
        enabled: bool,
        certs: Option<SslCerts>,
    ) -> Result<()>;

    async fn update_auth_token(
        &self,
        token: String,
    ) -> Result<()>;

    async fn update_create_node_token(
        &self,
        token: String,
    ) -> Result<()>;

    async fn update_rpc_config(
        &self,
        config: RpcConfigUpdate,
    ) -> Result<()>;

    async fn test_store_perf(
        &self,
        count: u32,
    ) -> Result<StorePerf>;

    /// Asks this agent to exchange traffic with `params.target`
    async fn test_network_perf_to_peer(
        &self,
        params: NetworkTestParams,
    ) -> Result<Value>;

    /// Server-originated round trip to the agent's advertised address
    async fn test_network_perf(
        &self,
        params: NetworkTestParams,
    ) -> Result<()>;

    async fn set_debug_level(
        &self,
        level: u32,
    ) -> Result<()>;

    /// Forwards an arbitrary agent call
    async fn proxy(
        &self,
        method: String,
        params: Value,
    ) -> Result<Value>;
}
