use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Issue reason that marks a node untrusted
pub const TAMPERING_REASON: &str = "TAMPERING";

/// Primary node identity, generated by the store on creation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network-level node identity, used to build the node's rpc address
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who runs the agent process behind a node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHosting {
    /// A regular agent installed by the user
    #[default]
    Agent,
    /// Agent fronting a cloud resource, started by the platform
    Cloud,
    /// Agent fronting an internal pool-backed store, started by the platform
    PoolBacked,
    /// In-process agent
    Internal,
}

impl NodeHosting {
    /// Nodes whose agent process is owned by the platform
    pub fn is_ephemeral(&self) -> bool {
        !matches!(self, NodeHosting::Agent)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Block store agent holding chunk data
    #[default]
    Storage,
    /// S3 endpoint agent; holds no data
    Gateway,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageCounters {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub alloc: u64,
    /// Optional cap on the bytes this node may use
    pub limit: Option<u64>,
    pub used_other: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Drive {
    pub mount: String,
    pub drive_id: String,
    pub storage: StorageCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsInfo {
    pub hostname: String,
    pub platform: String,
    pub arch: String,
    pub total_mem: u64,
    pub cpus: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    Read,
    Write,
    Replicate,
    Other,
}

impl IssueAction {
    /// Actions that count toward I/O detention
    pub fn is_io(&self) -> bool {
        !matches!(self, IssueAction::Other)
    }
}

/// One entry of a node's bounded issue log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub time: u64,
    pub action: IssueAction,
    pub reason: String,
    /// Reports folded into this entry when older ones were evicted
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub count_since: Option<u64>,
}

impl IssueReport {
    pub fn is_tampering(&self) -> bool {
        self.reason == TAMPERING_REASON
    }
}

/// The durable part of a node item
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub peer_id: PeerId,
    pub name: String,
    pub system: String,
    pub pool: String,
    pub agent_config: Option<String>,
    pub host_id: Option<String>,
    /// Last heartbeat, ms since epoch
    pub heartbeat: u64,
    pub hosting: NodeHosting,
    pub role: NodeRole,
    pub storage: StorageCounters,
    pub drives: Vec<Drive>,
    pub latency_to_server: Vec<f64>,
    pub latency_of_disk_read: Vec<f64>,
    pub latency_of_disk_write: Vec<f64>,
    pub decommissioning: Option<u64>,
    pub decommissioned: Option<u64>,
    pub migrating_to_pool: Option<u64>,
    pub deleting: Option<u64>,
    pub deleted: Option<u64>,
    pub issues_report: Vec<IssueReport>,
    pub version: String,
    pub ip: String,
    pub rpc_address: Option<String>,
    pub base_address: Option<String>,
    pub n2n_config: Option<Value>,
    pub geolocation: String,
    pub os_info: Option<OsInfo>,
    pub debug_level: u32,
    pub enabled: bool,
    pub permission_tampering: bool,
}

impl NodeRecord {
    pub fn new(
        id: NodeId,
        peer_id: PeerId,
        name: impl Into<String>,
        system: impl Into<String>,
        pool: impl Into<String>,
    ) -> Self {
        Self {
            id,
            peer_id,
            name: name.into(),
            system: system.into(),
            pool: pool.into(),
            ..Default::default()
        }
    }

    pub fn is_gateway(&self) -> bool {
        self.role == NodeRole::Gateway
    }

    pub fn host_name(&self) -> &str {
        self.os_info
            .as_ref()
            .map(|os| os.hostname.as_str())
            .unwrap_or_default()
    }

    /// Appends an issue report, folding evicted reports into the oldest one kept
    pub fn push_issue(
        &mut self,
        report: IssueReport,
        max_reports: usize,
    ) {
        self.issues_report.push(report);
        while self.issues_report.len() > max_reports.max(1) {
            let evicted = self.issues_report.remove(0);
            if let Some(oldest) = self.issues_report.first_mut() {
                oldest.count += evicted.count + 1;
                oldest.count_since = Some(evicted.count_since.unwrap_or(evicted.time));
            }
        }
    }
}

/// Appends samples and keeps only the latest `max` values
pub fn push_latest<T>(
    samples: &mut Vec<T>,
    values: impl IntoIterator<Item = T>,
    max: usize,
) {
    samples.extend(values);
    if samples.len() > max {
        let excess = samples.len() - max;
        samples.drain(..excess);
    }
}

pub fn average(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}
