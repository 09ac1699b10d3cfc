use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Pool naming and allocation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolsConfig {
    /// Pool created together with a new system
    #[serde(default = "default_new_system_pool_name")]
    pub new_system_pool_name: String,

    /// Pool new nodes fall into when nothing else is requested
    #[serde(default = "default_default_pool_name")]
    pub default_pool_name: String,

    /// Upper bound of nodes returned by one allocation query
    #[serde(default = "default_allocate_max_nodes")]
    pub allocate_max_nodes: usize,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            new_system_pool_name: default_new_system_pool_name(),
            default_pool_name: default_default_pool_name(),
            allocate_max_nodes: default_allocate_max_nodes(),
        }
    }
}

impl PoolsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.allocate_max_nodes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "pools.allocate_max_nodes must be at least 1".into(),
            )));
        }
        Ok(())
    }

    /// Hosts in these pools receive pool suggestions and are excluded from training
    pub fn is_classified_pool(
        &self,
        pool_name: &str,
    ) -> bool {
        pool_name == self.default_pool_name || pool_name == self.new_system_pool_name
    }
}

fn default_new_system_pool_name() -> String {
    "first.pool".to_string()
}
fn default_default_pool_name() -> String {
    "default_pool".to_string()
}
fn default_allocate_max_nodes() -> usize {
    1000
}
