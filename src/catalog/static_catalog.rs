use std::collections::HashMap;

use nanoid::nanoid;
use parking_lot::RwLock;
use serde_json::Value;

use super::AgentConfigInfo;
use super::PoolInfo;
use super::SystemCatalog;
use crate::NodeId;
use crate::SslCerts;

struct CatalogState {
    pools: Vec<PoolInfo>,
    agent_configs: HashMap<String, AgentConfigInfo>,
    master: bool,
    master_address: Option<String>,
    maintenance: bool,
    server_addresses: Vec<String>,
    base_address: Option<String>,
    n2n_config: Option<Value>,
    ssl_certs: Option<SslCerts>,
}

/// In-memory catalog for embedding and tests
pub struct StaticSystemCatalog {
    system_id: String,
    state: RwLock<CatalogState>,
}

impl StaticSystemCatalog {
    pub fn new(system_id: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            state: RwLock::new(CatalogState {
                pools: Vec::new(),
                agent_configs: HashMap::new(),
                master: true,
                master_address: None,
                maintenance: false,
                server_addresses: Vec::new(),
                base_address: None,
                n2n_config: None,
                ssl_certs: None,
            }),
        }
    }

    pub fn with_pool(
        self,
        pool: PoolInfo,
    ) -> Self {
        self.add_pool(pool);
        self
    }

    pub fn with_agent_config(
        self,
        agent_config: AgentConfigInfo,
    ) -> Self {
        self.state
            .write()
            .agent_configs
            .insert(agent_config.id.clone(), agent_config);
        self
    }

    pub fn with_server_addresses(
        self,
        addresses: Vec<String>,
    ) -> Self {
        self.state.write().server_addresses = addresses;
        self
    }

    pub fn with_base_address(
        self,
        base_address: impl Into<String>,
    ) -> Self {
        self.state.write().base_address = Some(base_address.into());
        self
    }

    pub fn with_n2n_config(
        self,
        n2n_config: Value,
    ) -> Self {
        self.state.write().n2n_config = Some(n2n_config);
        self
    }

    pub fn with_ssl_certs(
        self,
        certs: SslCerts,
    ) -> Self {
        self.state.write().ssl_certs = Some(certs);
        self
    }

    /// Adds or replaces a pool by id
    pub fn add_pool(
        &self,
        pool: PoolInfo,
    ) {
        let mut state = self.state.write();
        state.pools.retain(|p| p.id != pool.id);
        state.pools.push(pool);
    }

    pub fn set_master(
        &self,
        master: bool,
        master_address: Option<String>,
    ) {
        let mut state = self.state.write();
        state.master = master;
        state.master_address = master_address;
    }

    pub fn set_maintenance(
        &self,
        maintenance: bool,
    ) {
        self.state.write().maintenance = maintenance;
    }
}

impl SystemCatalog for StaticSystemCatalog {
    fn system_id(&self) -> String {
        self.system_id.clone()
    }

    fn pool(
        &self,
        pool_id: &str,
    ) -> Option<PoolInfo> {
        self.state.read().pools.iter().find(|p| p.id == pool_id).cloned()
    }

    fn pool_by_name(
        &self,
        name: &str,
    ) -> Option<PoolInfo> {
        self.state.read().pools.iter().find(|p| p.name == name).cloned()
    }

    fn pools(&self) -> Vec<PoolInfo> {
        self.state.read().pools.clone()
    }

    fn agent_config(
        &self,
        id: &str,
    ) -> Option<AgentConfigInfo> {
        self.state.read().agent_configs.get(id).cloned()
    }

    fn is_master(&self) -> bool {
        self.state.read().master
    }

    fn master_address(&self) -> Option<String> {
        self.state.read().master_address.clone()
    }

    fn in_maintenance(&self) -> bool {
        self.state.read().maintenance
    }

    fn server_addresses(&self) -> Vec<String> {
        self.state.read().server_addresses.clone()
    }

    fn base_address(&self) -> Option<String> {
        self.state.read().base_address.clone()
    }

    fn n2n_config(&self) -> Option<Value> {
        self.state.read().n2n_config.clone()
    }

    fn ssl_certs(&self) -> Option<SslCerts> {
        self.state.read().ssl_certs.clone()
    }

    fn issue_auth_token(
        &self,
        node_id: &NodeId,
    ) -> String {
        format!("{}.{}.{}", self.system_id, node_id, nanoid!())
    }

    fn issue_create_node_token(
        &self,
        pool_id: &str,
    ) -> String {
        format!("{}.create.{}.{}", self.system_id, pool_id, nanoid!())
    }
}
