//! Fluent assembly of a [`NodesMonitor`] from its configuration and
//! collaborators.
//!
//! The rebuild service and the process lifecycle have no in-process
//! default and must be supplied. Everything else falls back to:
//! - [`MemNodeStore`] for the durable store
//! - [`NaiveBayesAdvisor`] for pool suggestions
//! - [`TracingEventSink`] for activity events
//!
//! ## Example
//! ```ignore
//! let monitor = NodesMonitorBuilder::from_env(catalog)?
//!     .rebuild_service(rebuild)
//!     .lifecycle(lifecycle)
//!     .build()?;
//! monitor.start().await?;
//! ```

use std::sync::Arc;

use tracing::info;

use super::MonitorDeps;
use super::NodesMonitor;
use crate::Error;
use crate::EventSink;
use crate::MemNodeStore;
use crate::MonitorConfig;
use crate::NaiveBayesAdvisor;
use crate::NodeStore;
use crate::PoolAdvisor;
use crate::ProcessLifecycle;
use crate::RebuildService;
use crate::Result;
use crate::SystemCatalog;
use crate::TracingEventSink;

pub struct NodesMonitorBuilder {
    config: MonitorConfig,
    catalog: Arc<dyn SystemCatalog>,
    store: Option<Arc<dyn NodeStore>>,
    rebuild: Option<Arc<dyn RebuildService>>,
    lifecycle: Option<Arc<dyn ProcessLifecycle>>,
    advisor: Option<Arc<dyn PoolAdvisor>>,
    events: Option<Arc<dyn EventSink>>,
}

impl NodesMonitorBuilder {
    pub fn new(
        config: MonitorConfig,
        catalog: Arc<dyn SystemCatalog>,
    ) -> Self {
        Self {
            config,
            catalog,
            store: None,
            rebuild: None,
            lifecycle: None,
            advisor: None,
            events: None,
        }
    }

    /// Starts from the layered configuration: defaults, the `CONFIG_PATH`
    /// file and `MONITOR__` environment overrides
    pub fn from_env(catalog: Arc<dyn SystemCatalog>) -> Result<Self> {
        let config = MonitorConfig::new()?.validate()?;
        Ok(Self::new(config, catalog))
    }

    /// Layers an extra config file over the current configuration
    pub fn with_override_config(
        mut self,
        path: &str,
    ) -> Result<Self> {
        info!("with_override_config from: {}", path);
        self.config = self.config.with_override_config(path)?;
        Ok(self)
    }

    pub fn store(
        mut self,
        store: Arc<dyn NodeStore>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn rebuild_service(
        mut self,
        rebuild: Arc<dyn RebuildService>,
    ) -> Self {
        self.rebuild = Some(rebuild);
        self
    }

    pub fn lifecycle(
        mut self,
        lifecycle: Arc<dyn ProcessLifecycle>,
    ) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn advisor(
        mut self,
        advisor: Arc<dyn PoolAdvisor>,
    ) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn events(
        mut self,
        events: Arc<dyn EventSink>,
    ) -> Self {
        self.events = Some(events);
        self
    }

    /// Validates the configuration and wires the monitor. The monitor is
    /// returned stopped.
    ///
    /// # Errors
    /// `Error::Config` for an invalid configuration, `Error::Fatal` when a
    /// required collaborator is missing
    pub fn build(self) -> Result<Arc<NodesMonitor>> {
        let config = self.config.validate()?;
        let rebuild = self
            .rebuild
            .ok_or_else(|| Error::Fatal("rebuild service is required".to_string()))?;
        let lifecycle = self
            .lifecycle
            .ok_or_else(|| Error::Fatal("process lifecycle is required".to_string()))?;

        let deps = MonitorDeps {
            store: self.store.unwrap_or_else(|| Arc::new(MemNodeStore::new())),
            catalog: self.catalog,
            rebuild,
            lifecycle,
            advisor: self.advisor.unwrap_or_else(|| Arc::new(NaiveBayesAdvisor)),
            events: self.events.unwrap_or_else(|| Arc::new(TracingEventSink)),
        };
        Ok(NodesMonitor::new(config, deps))
    }
}
