use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Write coalescing for the persistence batcher
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PersistenceConfig {
    /// A non-forced flush waits until this many items are dirty
    #[serde(default = "default_min_batch_items")]
    pub min_batch_items: usize,

    /// New nodes provisioned with auth tokens concurrently during a flush
    #[serde(default = "default_create_concurrency")]
    pub create_concurrency: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            min_batch_items: default_min_batch_items(),
            create_concurrency: default_create_concurrency(),
        }
    }
}

impl PersistenceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.create_concurrency == 0 {
            return Err(Error::Config(ConfigError::Message(
                "persistence.create_concurrency must be at least 1".into(),
            )));
        }
        Ok(())
    }
}

fn default_min_batch_items() -> usize {
    30
}
fn default_create_concurrency() -> usize {
    10
}
