use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::FakeAgent;
use crate::ActivityStage;
use crate::EventSink;
use crate::MonitorConfig;
use crate::NodeEvent;
use crate::NodeEventKind;
use crate::NodeHosting;
use crate::NodeId;
use crate::NodeItem;
use crate::NodeRecord;
use crate::PeerId;
use crate::PoolInfo;
use crate::ProcessLifecycle;
use crate::RebuildBatch;
use crate::RebuildMarker;
use crate::RebuildService;
use crate::RemoteError;
use crate::Result;
use crate::StaticSystemCatalog;
use crate::StorageCounters;
use crate::GIB;

pub(crate) const POOL_A: &str = "pool-a";
pub(crate) const POOL_B: &str = "pool-b";
pub(crate) const DEFAULT_POOL: &str = "pool-default";
pub(crate) const CLOUD_POOL: &str = "pool-cloud";

/// Persisted storage node with an address and healthy capacity
pub(crate) fn storage_record(
    id: &str,
    name: &str,
) -> NodeRecord {
    let mut record = NodeRecord::new(
        NodeId::new(id),
        PeerId::new(format!("peer-{id}")),
        name,
        "sys",
        POOL_A,
    );
    record.host_id = Some(format!("host-{id}"));
    record.rpc_address = Some(format!("n2n://peer-{id}"));
    record.ip = "10.0.0.1".into();
    record.enabled = true;
    record.storage = StorageCounters {
        total: 100 * GIB,
        free: 60 * GIB,
        used: 30 * GIB,
        ..Default::default()
    };
    record
}

/// Persisted, connected node item with a fresh heartbeat
pub(crate) fn online_item(
    id: &str,
    now: u64,
) -> (NodeItem, Arc<FakeAgent>) {
    let mut record = storage_record(id, &format!("node-{id}"));
    record.heartbeat = now;
    let agent = Arc::new(FakeAgent::new(next_connection_id(), "10.0.0.1"));
    let mut item = NodeItem::persisted(record);
    item.connection = Some(agent.clone());
    (item, agent)
}

pub(crate) fn next_connection_id() -> u64 {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    NEXT.fetch_add(1, Ordering::SeqCst) as u64
}

pub(crate) fn test_catalog() -> StaticSystemCatalog {
    StaticSystemCatalog::new("sys")
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
            id: DEFAULT_POOL.into(),
            name: "default_pool".into(),
            hosting: NodeHosting::Agent,
        })
        .with_pool(PoolInfo {
            id: CLOUD_POOL.into(),
            name: CLOUD_POOL.into(),
            hosting: NodeHosting::Cloud,
        })
        .with_server_addresses(vec!["wss://127.0.0.1:8443".into()])
}

/// Config with short timers for tests that let background work run
pub(crate) fn fast_config() -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.scan.initial_delay_ms = 60_000;
    config.scan.node_recheck_delay_ms = 10;
    config.scan.hurry_delay_ms = 60_000;
    config.rebuild.batch_delay_ms = 1;
    config.rebuild.offline_grace_ms = 1;
    config.retry.store_load.max_retries = 2;
    config.retry.store_load.base_delay_ms = 1;
    config.retry.store_load.max_delay_ms = 2;
    config
}

#[derive(Default)]
pub(crate) struct CollectingSink {
    pub(crate) events: Mutex<Vec<NodeEvent>>,
}

impl CollectingSink {
    pub(crate) fn count(
        &self,
        kind: NodeEventKind,
    ) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for CollectingSink {
    fn dispatch(
        &self,
        event: NodeEvent,
    ) {
        self.events.lock().push(event);
    }
}

/// Rebuild collaborator finishing every stage after `batches` calls of
/// `bytes` each
pub(crate) struct FakeRebuild {
    batches: u64,
    bytes: u64,
    pub(crate) calls: Mutex<Vec<(NodeId, ActivityStage, Option<RebuildMarker>)>>,
    pub(crate) fail_next: AtomicUsize,
}

impl FakeRebuild {
    pub(crate) fn new(
        batches: u64,
        bytes: u64,
    ) -> Self {
        Self {
            batches,
            bytes,
            calls: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
        }
    }

    pub(crate) fn stages_seen(
        &self,
        node_id: &NodeId,
    ) -> Vec<ActivityStage> {
        let mut stages: Vec<ActivityStage> = Vec::new();
        for (id, stage, _) in self.calls.lock().iter() {
            if id == node_id && stages.last() != Some(stage) {
                stages.push(*stage);
            }
        }
        stages
    }
}

#[async_trait]
impl RebuildService for FakeRebuild {
    async fn plan_and_rebuild(
        &self,
        node_id: NodeId,
        stage: ActivityStage,
        marker: Option<RebuildMarker>,
        _batch_size: usize,
    ) -> Result<RebuildBatch> {
        self.calls.lock().push((node_id, stage, marker.clone()));
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RemoteError::Rpc {
                code: "REBUILD".into(),
                message: "batch failed".into(),
            }
            .into());
        }
        let done: u64 = marker.map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0) + 1;
        let next_marker = (done < self.batches).then(|| RebuildMarker::new(done.to_string()));
        Ok(RebuildBatch {
            next_marker,
            bytes_processed: self.bytes,
            failed_chunks: 0,
        })
    }
}

/// Process lifecycle that records teardown requests
#[derive(Default)]
pub(crate) struct RecordingLifecycle {
    pub(crate) removed: Mutex<Vec<String>>,
    pub(crate) fail: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl ProcessLifecycle for RecordingLifecycle {
    async fn remove_agent_process(
        &self,
        node_name: String,
    ) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RemoteError::Rpc {
                code: "LIFECYCLE".into(),
                message: "teardown failed".into(),
            }
            .into());
        }
        self.removed.lock().push(node_name);
        Ok(())
    }
}
