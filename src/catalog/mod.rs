//! System-level collaborators the monitor consults but does not own.
//!
//! The catalog is the system configuration cache (pools, agent configs,
//! tokens, leadership). It is injected into the monitor rather than read
//! from ambient global state.

mod events;
mod static_catalog;

pub use events::*;
pub use static_catalog::*;

#[cfg(test)]
mod static_catalog_test;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::NodeHosting;
use crate::NodeId;
use crate::Result;
use crate::SslCerts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub id: String,
    pub name: String,
    /// `Agent` for host pools; `Cloud`/`PoolBacked` for resource pools
    pub hosting: NodeHosting,
}

impl PoolInfo {
    /// Pools backed by a cloud or internal resource; agents cannot migrate into them
    pub fn is_resource_pool(&self) -> bool {
        matches!(self.hosting, NodeHosting::Cloud | NodeHosting::PoolBacked)
    }
}

/// Installation-time agent settings, looked up by the id an agent presents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfigInfo {
    pub id: String,
    pub pool: Option<String>,
    pub use_storage: bool,
    pub use_s3: bool,
    /// Mount points that must not be used for storage
    pub exclude_drives: Vec<String>,
}

pub trait SystemCatalog: Send + Sync + 'static {
    fn system_id(&self) -> String;

    fn pool(
        &self,
        pool_id: &str,
    ) -> Option<PoolInfo>;

    fn pool_by_name(
        &self,
        name: &str,
    ) -> Option<PoolInfo>;

    fn pools(&self) -> Vec<PoolInfo>;

    fn agent_config(
        &self,
        id: &str,
    ) -> Option<AgentConfigInfo>;

    /// Only the master process registers agents
    fn is_master(&self) -> bool;

    fn master_address(&self) -> Option<String>;

    /// Data movement is paused while the system is in maintenance
    fn in_maintenance(&self) -> bool;

    /// Addresses handed to agents when fetching their info
    fn server_addresses(&self) -> Vec<String>;

    fn base_address(&self) -> Option<String>;

    fn n2n_config(&self) -> Option<Value>;

    /// Certificates pushed to gateway agents
    fn ssl_certs(&self) -> Option<SslCerts>;

    fn issue_auth_token(
        &self,
        node_id: &NodeId,
    ) -> String;

    fn issue_create_node_token(
        &self,
        pool_id: &str,
    ) -> String;
}

/// Tears down platform-owned agent processes
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProcessLifecycle: Send + Sync + 'static {
    async fn remove_agent_process(
        &self,
        node_name: String,
    ) -> Result<()>;
}
