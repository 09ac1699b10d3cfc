use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::Accessibility;
use crate::Aggregate;
use crate::AgentConnection;
use crate::DataActivity;
use crate::HostMode;
use crate::HostStatus;
use crate::IssueAction;
use crate::ModeCounts;
use crate::NodeHosting;
use crate::NodeId;
use crate::NodeItem;
use crate::NodeMode;
use crate::NodeRole;
use crate::OsInfo;
use crate::PeerId;
use crate::SortKey;
use crate::SortOrder;
use crate::StorageBreakdown;

/// What the heartbeating agent asks to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatRole {
    /// An installed agent reconnecting under its node id
    Agent,
    /// A fresh install asking for a node to be created
    CreateNode,
    Admin,
}

impl HeartbeatRole {
    fn can_create(&self) -> bool {
        matches!(self, HeartbeatRole::CreateNode | HeartbeatRole::Admin)
    }

    fn can_attach(&self) -> bool {
        matches!(self, HeartbeatRole::Agent | HeartbeatRole::Admin)
    }

    pub(crate) fn allows(
        &self,
        has_id: bool,
    ) -> bool {
        if has_id {
            self.can_attach()
        } else {
            self.can_create()
        }
    }
}

pub struct HeartbeatRequest {
    pub node_id: Option<NodeId>,
    pub role: HeartbeatRole,
    pub version: String,
    /// Pool requested by name when the agent has no install-time config
    pub pool_name: Option<String>,
    pub agent_config: Option<String>,
    pub connection: Arc<dyn AgentConnection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeartbeatReply {
    pub version: String,
    /// Set when this process is not the master
    pub redirect: Option<String>,
    pub node_id: Option<NodeId>,
    pub peer_id: Option<PeerId>,
}

/// One block I/O failure observed by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    pub node_id: NodeId,
    pub action: IssueAction,
    /// Rpc error code, empty when unknown
    pub reason: String,
}

/// Caller-facing view of one node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub peer_id: PeerId,
    pub name: String,
    pub pool: String,
    pub host_id: Option<String>,
    pub hosting: NodeHosting,
    pub role: NodeRole,
    pub ip: String,
    pub version: String,
    pub rpc_address: Option<String>,
    pub geolocation: String,
    pub heartbeat: u64,
    pub online: bool,
    pub trusted: bool,
    pub readable: bool,
    pub writable: bool,
    pub has_issues: bool,
    pub accessibility: Accessibility,
    pub mode: NodeMode,
    pub connectivity: Option<&'static str>,
    pub storage: StorageBreakdown,
    pub latency_to_server: Vec<f64>,
    pub latency_of_disk_read: Vec<f64>,
    pub latency_of_disk_write: Vec<f64>,
    pub decommissioning: Option<u64>,
    pub decommissioned: Option<u64>,
    pub migrating_to_pool: Option<u64>,
    pub deleting: Option<u64>,
    pub data_activity: Option<DataActivity>,
    pub suggested_pool: Option<String>,
    pub os_info: Option<OsInfo>,
    pub debug_level: u32,
    pub n2n_errors: bool,
    pub gateway_errors: bool,
    pub io_test_errors: bool,
    pub io_reported_errors: bool,
}

impl NodeInfo {
    pub(crate) fn from_item(
        item: &NodeItem,
        storage: StorageBreakdown,
    ) -> Self {
        let node = &item.node;
        let status = &item.status;
        Self {
            id: node.id.clone(),
            peer_id: node.peer_id.clone(),
            name: node.name.clone(),
            pool: node.pool.clone(),
            host_id: node.host_id.clone(),
            hosting: node.hosting,
            role: node.role,
            ip: node.ip.clone(),
            version: node.version.clone(),
            rpc_address: node.rpc_address.clone(),
            geolocation: node.geolocation.clone(),
            heartbeat: node.heartbeat,
            online: status.online,
            trusted: status.trusted,
            readable: status.readable,
            writable: status.writable,
            has_issues: status.has_issues,
            accessibility: status.accessibility,
            mode: status.mode,
            connectivity: status.connectivity,
            storage,
            latency_to_server: node.latency_to_server.clone(),
            latency_of_disk_read: node.latency_of_disk_read.clone(),
            latency_of_disk_write: node.latency_of_disk_write.clone(),
            decommissioning: node.decommissioning,
            decommissioned: node.decommissioned,
            migrating_to_pool: node.migrating_to_pool,
            deleting: node.deleting,
            data_activity: item.data_activity.clone(),
            suggested_pool: item.suggested_pool.clone(),
            os_info: node.os_info.clone(),
            debug_level: node.debug_level,
            n2n_errors: item.detention.n2n_errors.is_some(),
            gateway_errors: item.detention.gateway_errors.is_some(),
            io_test_errors: item.detention.io_test_errors.is_some(),
            io_reported_errors: item.detention.io_reported_errors.is_some(),
        }
    }
}

/// Caller-facing view of one consolidated host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostInfo {
    pub host_id: String,
    pub name: String,
    pub ip: String,
    pub pool: String,
    pub mode: HostMode,
    pub storage_mode: Option<HostMode>,
    pub gateway_mode: Option<HostMode>,
    pub online: bool,
    pub trusted: bool,
    pub decommissioned: bool,
    pub decommissioning: bool,
    pub migrating: bool,
    pub storage: StorageBreakdown,
    pub suggested_pool: Option<String>,
    pub storage_nodes: Vec<NodeInfo>,
    pub gateway_nodes: Vec<NodeInfo>,
}

impl HostInfo {
    pub(crate) fn new(
        status: &HostStatus,
        root: &NodeItem,
        storage_nodes: Vec<NodeInfo>,
        gateway_nodes: Vec<NodeInfo>,
    ) -> Self {
        Self {
            host_id: status.host_id.clone(),
            name: root.node.host_name().to_string(),
            ip: root.node.ip.clone(),
            pool: root.node.pool.clone(),
            mode: status.mode,
            storage_mode: status.storage_mode,
            gateway_mode: status.gateway_mode,
            online: status.online,
            trusted: status.trusted,
            decommissioned: status.decommissioned,
            decommissioning: status.decommissioning,
            migrating: status.migrating,
            storage: status.storage,
            suggested_pool: root.suggested_pool.clone(),
            storage_nodes,
            gateway_nodes,
        }
    }
}

/// Sort and pagination of a listing
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub sort: SortKey,
    pub order: SortOrder,
    pub skip: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListReply<T> {
    /// Totals before the online/mode/issue filters and pagination
    pub counts: ModeCounts,
    /// Matches after filtering, before pagination
    pub total: usize,
    pub items: Vec<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReply {
    pub total: Aggregate,
    /// Per pool id, when grouping was requested
    pub by_pool: Option<BTreeMap<String, Aggregate>>,
}
