use std::fmt;
use std::sync::Arc;

use crate::Accessibility;
use crate::AgentConnection;
use crate::AgentInfo;
use crate::DataActivity;
use crate::NodeMode;
use crate::NodeRecord;

/// Whether the store already holds the node.
///
/// Store writes are matched over this: `Pending` items are inserted,
/// `Persisted` items are updated.
#[derive(Debug, Clone, PartialEq)]
pub enum Persistence {
    /// Created in memory by a heartbeat, not written yet
    Pending,
    /// Loaded from or written to the store; holds the last written record
    Persisted(Box<NodeRecord>),
}

/// A failure-driven detention timer.
///
/// Set by the first failure, renewed by every later one, and cleared once no
/// failure renewed it for the detention threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetentionTimer {
    pub since: u64,
    pub last_failure: u64,
}

impl DetentionTimer {
    pub fn record(
        slot: &mut Option<DetentionTimer>,
        now: u64,
    ) {
        match slot {
            Some(timer) => timer.last_failure = timer.last_failure.max(now),
            None => {
                *slot = Some(DetentionTimer {
                    since: now,
                    last_failure: now,
                })
            }
        }
    }

    fn expired(
        &self,
        now: u64,
        threshold_ms: u64,
    ) -> bool {
        now.saturating_sub(self.last_failure) >= threshold_ms
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetentionTimers {
    /// Peer network probe failures
    pub n2n_errors: Option<DetentionTimer>,
    /// Node-to-server network probe failures
    pub gateway_errors: Option<DetentionTimer>,
    /// Storage I/O probe failures
    pub io_test_errors: Option<DetentionTimer>,
    /// I/O failures reported by clients
    pub io_reported_errors: Option<DetentionTimer>,
}

impl DetentionTimers {
    fn slots(&self) -> [&Option<DetentionTimer>; 4] {
        [
            &self.n2n_errors,
            &self.gateway_errors,
            &self.io_test_errors,
            &self.io_reported_errors,
        ]
    }

    /// Start of the earliest active detention
    pub fn earliest(&self) -> Option<u64> {
        self.slots()
            .into_iter()
            .filter_map(|slot| slot.map(|timer| timer.since))
            .min()
    }

    pub fn has_io_errors(&self) -> bool {
        self.io_test_errors.is_some() || self.io_reported_errors.is_some()
    }

    pub fn clear_expired(
        &mut self,
        now: u64,
        threshold_ms: u64,
    ) {
        for slot in [
            &mut self.n2n_errors,
            &mut self.gateway_errors,
            &mut self.io_test_errors,
            &mut self.io_reported_errors,
        ] {
            if slot.is_some_and(|timer| timer.expired(now, threshold_ms)) {
                *slot = None;
            }
        }
    }
}

/// Derived fields, rewritten by every status recompute
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStatus {
    /// False until the first recompute; transition events start after it
    pub evaluated: bool,
    pub online: bool,
    pub trusted: bool,
    pub readable: bool,
    pub writable: bool,
    pub has_issues: bool,
    pub storage_full: bool,
    pub accessibility: Accessibility,
    pub mode: NodeMode,
    pub connectivity: Option<&'static str>,
    pub io_detention: Option<u64>,
    pub avg_ping: Option<f64>,
    pub avg_disk_read: Option<f64>,
    pub avg_disk_write: Option<f64>,
}

/// Runtime aggregate of one node
#[derive(Clone)]
pub struct NodeItem {
    pub node: NodeRecord,
    pub persistence: Persistence,
    pub connection: Option<Arc<dyn AgentConnection>>,
    pub agent_info: Option<AgentInfo>,
    /// Create-node token pushed over the current connection
    pub create_node_token: Option<String>,
    pub status: NodeStatus,
    pub detention: DetentionTimers,
    pub storage_not_exist: Option<u64>,
    pub auth_failed: Option<u64>,
    pub data_activity: Option<DataActivity>,
    /// Wiping finished for a deleting node; the next flush marks it deleted
    pub ready_to_be_deleted: bool,
    pub suggested_pool: Option<String>,
}

impl NodeItem {
    pub fn pending(node: NodeRecord) -> Self {
        Self::with_persistence(node, Persistence::Pending)
    }

    pub fn persisted(node: NodeRecord) -> Self {
        let stored = Box::new(node.clone());
        Self::with_persistence(node, Persistence::Persisted(stored))
    }

    fn with_persistence(
        node: NodeRecord,
        persistence: Persistence,
    ) -> Self {
        Self {
            node,
            persistence,
            connection: None,
            agent_info: None,
            create_node_token: None,
            status: NodeStatus::default(),
            detention: DetentionTimers::default(),
            storage_not_exist: None,
            auth_failed: None,
            data_activity: None,
            ready_to_be_deleted: false,
            suggested_pool: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.persistence, Persistence::Persisted(_))
    }

    /// The last record written to the store
    pub fn stored(&self) -> Option<&NodeRecord> {
        match &self.persistence {
            Persistence::Persisted(record) => Some(record),
            Persistence::Pending => None,
        }
    }

    pub fn mark_persisted(
        &mut self,
        written: NodeRecord,
    ) {
        self.persistence = Persistence::Persisted(Box::new(written));
    }

    pub fn has_address(&self) -> bool {
        self.node.rpc_address.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection_id(&self) -> Option<u64> {
        self.connection.as_ref().map(|conn| conn.connection_id())
    }

    pub fn activity_in_flight(&self) -> bool {
        self.node.migrating_to_pool.is_some()
            || self.node.decommissioning.is_some()
            || self.node.decommissioned.is_some()
            || self.node.deleting.is_some()
            || self.node.deleted.is_some()
    }
}

impl fmt::Debug for NodeItem {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("NodeItem")
            .field("id", &self.node.id)
            .field("name", &self.node.name)
            .field("persisted", &self.is_persisted())
            .field("connection", &self.connection_id())
            .field("mode", &self.status.mode)
            .field("data_activity", &self.data_activity)
            .finish()
    }
}
