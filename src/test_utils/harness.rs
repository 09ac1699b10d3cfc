use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::fast_config;
use super::next_connection_id;
use super::test_catalog;
use super::CollectingSink;
use super::FakeAgent;
use super::FakeRebuild;
use super::RecordingLifecycle;
use crate::AgentInfo;
use crate::HeartbeatReply;
use crate::HeartbeatRequest;
use crate::HeartbeatRole;
use crate::MemNodeStore;
use crate::MonitorConfig;
use crate::NodeId;
use crate::NodeIdentity;
use crate::NodeInfo;
use crate::NodeRecord;
use crate::NodesMonitor;
use crate::NodesMonitorBuilder;
use crate::StaticSystemCatalog;
use crate::GIB;

/// A monitor wired to in-memory collaborators
pub(crate) struct MonitorHarness {
    pub(crate) monitor: Arc<NodesMonitor>,
    pub(crate) store: Arc<MemNodeStore>,
    pub(crate) catalog: Arc<StaticSystemCatalog>,
    pub(crate) rebuild: Arc<FakeRebuild>,
    pub(crate) lifecycle: Arc<RecordingLifecycle>,
    pub(crate) events: Arc<CollectingSink>,
}

impl MonitorHarness {
    pub(crate) fn new(records: Vec<NodeRecord>) -> Self {
        Self::with_config(fast_config(), records)
    }

    pub(crate) fn with_config(
        config: MonitorConfig,
        records: Vec<NodeRecord>,
    ) -> Self {
        let store = Arc::new(MemNodeStore::with_records(records));
        let catalog = Arc::new(test_catalog());
        let rebuild = Arc::new(FakeRebuild::new(2, 15 * GIB));
        let lifecycle = Arc::new(RecordingLifecycle::default());
        let events = Arc::new(CollectingSink::default());
        let monitor = NodesMonitorBuilder::new(config, catalog.clone())
            .store(store.clone())
            .rebuild_service(rebuild.clone())
            .lifecycle(lifecycle.clone())
            .events(events.clone())
            .build()
            .expect("monitor should build");
        Self {
            monitor,
            store,
            catalog,
            rebuild,
            lifecycle,
            events,
        }
    }

    pub(crate) async fn started(records: Vec<NodeRecord>) -> Self {
        let harness = Self::new(records);
        harness.monitor.start().await.expect("monitor should start");
        harness
    }

    pub(crate) fn version(&self) -> String {
        self.monitor.config().agents.server_version.clone()
    }

    pub(crate) fn request(
        &self,
        node_id: Option<NodeId>,
        role: HeartbeatRole,
        agent: Arc<FakeAgent>,
    ) -> HeartbeatRequest {
        HeartbeatRequest {
            node_id,
            role,
            version: self.version(),
            pool_name: None,
            agent_config: None,
            connection: agent,
        }
    }

    /// Connects an agent reporting the same identity as `record`
    pub(crate) async fn connect(
        &self,
        record: &NodeRecord,
    ) -> (Arc<FakeAgent>, HeartbeatReply) {
        let agent = Arc::new(FakeAgent::new(next_connection_id(), &record.ip).with_info(agent_info_for(record)));
        let reply = self
            .monitor
            .heartbeat(self.request(Some(record.id.clone()), HeartbeatRole::Agent, agent.clone()))
            .await
            .expect("heartbeat should bind the agent");
        (agent, reply)
    }

    pub(crate) fn node(
        &self,
        id: &NodeId,
    ) -> NodeInfo {
        self.monitor
            .read_node(&NodeIdentity::Id(id.clone()))
            .expect("node should be readable")
    }
}

/// What an agent serving `record` reports about itself
pub(crate) fn agent_info_for(record: &NodeRecord) -> AgentInfo {
    AgentInfo {
        name: record.name.clone(),
        host_id: record.host_id.clone().unwrap_or_default(),
        version: record.version.clone(),
        ip: record.ip.clone(),
        rpc_address: record.rpc_address.clone(),
        role: record.role,
        storage: record.storage.clone(),
        enabled: record.enabled,
        ..Default::default()
    }
}

/// Polls `cond` until it holds; panics after a few seconds
pub(crate) async fn wait_until(
    what: &str,
    cond: impl Fn() -> bool,
) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
