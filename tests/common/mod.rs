use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodes_monitor::ActivityStage;
use nodes_monitor::AgentConnection;
use nodes_monitor::AgentInfo;
use nodes_monitor::EventSink;
use nodes_monitor::HeartbeatRequest;
use nodes_monitor::HeartbeatRole;
use nodes_monitor::MemNodeStore;
use nodes_monitor::MonitorConfig;
use nodes_monitor::NetworkTestParams;
use nodes_monitor::NodeEvent;
use nodes_monitor::NodeEventKind;
use nodes_monitor::NodeHosting;
use nodes_monitor::NodeId;
use nodes_monitor::NodeRecord;
use nodes_monitor::NodesMonitor;
use nodes_monitor::NodesMonitorBuilder;
use nodes_monitor::PeerId;
use nodes_monitor::PoolInfo;
use nodes_monitor::ProcessLifecycle;
use nodes_monitor::RebuildBatch;
use nodes_monitor::RebuildMarker;
use nodes_monitor::RebuildService;
use nodes_monitor::Result;
use nodes_monitor::RpcConfigUpdate;
use nodes_monitor::SslCerts;
use nodes_monitor::StaticSystemCatalog;
use nodes_monitor::StorageCounters;
use nodes_monitor::StorePerf;
use nodes_monitor::GIB;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::sleep;

pub const SYSTEM: &str = "sys";
pub const POOL_A: &str = "pool-a";
pub const POOL_B: &str = "pool-b";
pub const CLOUD_POOL: &str = "pool-cloud";

pub fn storage_record(
    id: &str,
    name: &str,
) -> NodeRecord {
    let mut record = NodeRecord::new(NodeId::new(id), PeerId::new(format!("peer-{id}")), name, SYSTEM, POOL_A);
    record.host_id = Some(format!("host-{id}"));
    record.rpc_address = Some(format!("n2n://peer-{id}"));
    record.ip = "10.1.0.1".into();
    record.enabled = true;
    record.storage = StorageCounters {
        total: 100 * GIB,
        free: 50 * GIB,
        used: 40 * GIB,
        ..Default::default()
    };
    record
}

pub fn cloud_record(id: &str) -> NodeRecord {
    let mut record = storage_record(id, &format!("cloud-{id}"));
    record.pool = CLOUD_POOL.into();
    record.hosting = NodeHosting::Cloud;
    record
}

/// Agent answering every call from a fixed self-description
pub struct TestAgent {
    id: u64,
    host: String,
    info: AgentInfo,
    connected: AtomicBool,
    closed_tx: watch::Sender<bool>,
    pub auth_tokens: Mutex<Vec<String>>,
}

impl TestAgent {
    pub fn new(
        host: &str,
        info: AgentInfo,
    ) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            id: NEXT.fetch_add(1, Ordering::SeqCst),
            host: host.to_string(),
            info,
            connected: AtomicBool::new(true),
            closed_tx,
            auth_tokens: Mutex::new(Vec::new()),
        })
    }

    /// An agent reporting the same identity as `record`
    pub fn serving(record: &NodeRecord) -> Arc<Self> {
        Self::new(
            &record.ip,
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
            },
        )
    }
}

#[async_trait]
impl AgentConnection for TestAgent {
    fn connection_id(&self) -> u64 {
        self.id
    }

    fn remote_host(&self) -> String {
        self.host.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.closed_tx.send_replace(true);
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn get_agent_info(
        &self,
        _server_addresses: Vec<String>,
    ) -> Result<AgentInfo> {
        Ok(self.info.clone())
    }

    async fn update_node_service(
        &self,
        _enabled: bool,
        _certs: Option<SslCerts>,
    ) -> Result<()> {
        Ok(())
    }

    async fn update_auth_token(
        &self,
        token: String,
    ) -> Result<()> {
        self.auth_tokens.lock().push(token);
        Ok(())
    }

    async fn update_create_node_token(
        &self,
        _token: String,
    ) -> Result<()> {
        Ok(())
    }

    async fn update_rpc_config(
        &self,
        _config: RpcConfigUpdate,
    ) -> Result<()> {
        Ok(())
    }

    async fn test_store_perf(
        &self,
        _count: u32,
    ) -> Result<StorePerf> {
        Ok(StorePerf {
            read: vec![1.0],
            write: vec![1.0],
        })
    }

    async fn test_network_perf_to_peer(
        &self,
        _params: NetworkTestParams,
    ) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn test_network_perf(
        &self,
        _params: NetworkTestParams,
    ) -> Result<()> {
        Ok(())
    }

    async fn set_debug_level(
        &self,
        _level: u32,
    ) -> Result<()> {
        Ok(())
    }

    async fn proxy(
        &self,
        _method: String,
        params: Value,
    ) -> Result<Value> {
        Ok(params)
    }
}

/// Rebuild collaborator finishing each stage in a single batch
#[derive(Default)]
pub struct OneShotRebuild {
    pub stages: Mutex<Vec<ActivityStage>>,
}

#[async_trait]
impl RebuildService for OneShotRebuild {
    async fn plan_and_rebuild(
        &self,
        _node_id: NodeId,
        stage: ActivityStage,
        _marker: Option<RebuildMarker>,
        _batch_size: usize,
    ) -> Result<RebuildBatch> {
        self.stages.lock().push(stage);
        Ok(RebuildBatch {
            next_marker: None,
            bytes_processed: GIB,
            failed_chunks: 0,
        })
    }
}

#[derive(Default)]
pub struct NoopLifecycle;

#[async_trait]
impl ProcessLifecycle for NoopLifecycle {
    async fn remove_agent_process(
        &self,
        _node_name: String,
    ) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<NodeEvent>>,
}

impl EventLog {
    pub fn count(
        &self,
        kind: NodeEventKind,
    ) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for EventLog {
    fn dispatch(
        &self,
        event: NodeEvent,
    ) {
        self.events.lock().push(event);
    }
}

pub struct TestContext {
    pub monitor: Arc<NodesMonitor>,
    pub store: Arc<MemNodeStore>,
    pub rebuild: Arc<OneShotRebuild>,
    pub events: Arc<EventLog>,
}

impl TestContext {
    pub async fn start(records: Vec<NodeRecord>) -> Self {
        let mut config = MonitorConfig::default();
        config.scan.initial_delay_ms = 60_000;
        config.scan.hurry_delay_ms = 60_000;
        config.rebuild.batch_delay_ms = 1;
        config.rebuild.offline_grace_ms = 1;

        let catalog = StaticSystemCatalog::new(SYSTEM)
            .with_pool(PoolInfo {
                id: POOL_A.into(),
                name: POOL_A.into(),
                hosting: NodeHosting::Agent,
            })
            .with_pool(PoolInfo {
                id: POOL_B.into(),
                name: POOL_B.into(),
                hosting: NodeHosting::Agent,
            })
            .with_pool(PoolInfo {
                id: CLOUD_POOL.into(),
                name: CLOUD_POOL.into(),
                hosting: NodeHosting::Cloud,
            });

        let store = Arc::new(MemNodeStore::with_records(records));
        let rebuild = Arc::new(OneShotRebuild::default());
        let events = Arc::new(EventLog::default());
        let monitor = NodesMonitorBuilder::new(config, Arc::new(catalog))
            .store(store.clone())
            .rebuild_service(rebuild.clone())
            .lifecycle(Arc::new(NoopLifecycle))
            .events(events.clone())
            .build()
            .expect("monitor should build");
        monitor.start().await.expect("monitor should start");

        Self {
            monitor,
            store,
            rebuild,
            events,
        }
    }

    pub fn request(
        &self,
        node_id: Option<NodeId>,
        role: HeartbeatRole,
        agent: Arc<TestAgent>,
    ) -> HeartbeatRequest {
        HeartbeatRequest {
            node_id,
            role,
            version: self.monitor.config().agents.server_version.clone(),
            pool_name: None,
            agent_config: None,
            connection: agent,
        }
    }

    pub async fn connect(
        &self,
        record: &NodeRecord,
    ) -> Arc<TestAgent> {
        let agent = TestAgent::serving(record);
        self.monitor
            .heartbeat(self.request(Some(record.id.clone()), HeartbeatRole::Agent, agent.clone()))
            .await
            .expect("heartbeat should bind the agent");
        agent
    }
}

pub async fn wait_until(
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
