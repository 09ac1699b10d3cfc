use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;
use tracing::warn;

use crate::AgentConnection;
use crate::MonitorError;
use crate::NodeId;
use crate::NodeItem;
use crate::RemoteError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The connection was already the item's current one
    Unchanged,
    /// Installed; `replaced` holds the id of the closed predecessor
    Attached { replaced: Option<u64> },
}

/// Owns the binding between transport connections and node items.
///
/// Item fields are mutated under the caller's item lock; the manager only
/// tracks which connection is bound to which node.
pub struct ConnectionManager {
    bound: DashMap<u64, NodeId>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            bound: DashMap::new(),
        }
    }

    /// Rejects connections already serving another node
    pub fn ensure_unbound(
        &self,
        conn: &dyn AgentConnection,
    ) -> Result<()> {
        match self.bound.get(&conn.connection_id()) {
            Some(node_id) => Err(MonitorError::ConnectionInUse {
                connection_id: conn.connection_id(),
                node_id: node_id.clone(),
            }
            .into()),
            None => Ok(()),
        }
    }

    pub fn bound_node(
        &self,
        connection_id: u64,
    ) -> Option<NodeId> {
        self.bound.get(&connection_id).map(|id| id.clone())
    }

    /// Installs `conn` as the item's connection and stamps the heartbeat.
    ///
    /// A live connection from a different host is never replaced: the new
    /// one is rejected as a duplicate agent.
    pub fn attach(
        &self,
        item: &mut NodeItem,
        conn: Arc<dyn AgentConnection>,
        now: u64,
    ) -> Result<AttachOutcome> {
        if item.connection_id() == Some(conn.connection_id()) {
            return Ok(AttachOutcome::Unchanged);
        }

        if let Some(current) = &item.connection {
            if current.is_connected() && current.remote_host() != conn.remote_host() {
                warn!(
                    node_id = %item.node.id,
                    existing = %current.remote_host(),
                    incoming = %conn.remote_host(),
                    "rejecting duplicate agent connection"
                );
                return Err(RemoteError::Duplicate {
                    node_id: item.node.id.clone(),
                    existing: current.remote_host(),
                    incoming: conn.remote_host(),
                }
                .into());
            }
        }

        let replaced = item.connection_id();
        self.detach(item);

        debug!(node_id = %item.node.id, connection_id = conn.connection_id(), "connection attached");
        self.bound.insert(conn.connection_id(), item.node.id.clone());
        item.connection = Some(conn);
        item.node.heartbeat = now;
        Ok(AttachOutcome::Attached { replaced })
    }

    /// Closes and clears the item's connection along with the fields the
    /// agent reported over it. Returns false when there was none.
    pub fn detach(
        &self,
        item: &mut NodeItem,
    ) -> bool {
        let Some(conn) = item.connection.take() else {
            return false;
        };
        self.bound.remove(&conn.connection_id());
        conn.close();
        item.agent_info = None;
        item.create_node_token = None;
        item.node.rpc_address = None;
        debug!(node_id = %item.node.id, connection_id = conn.connection_id(), "connection detached");
        true
    }

    /// Transport close notification. Ignored unless `connection_id` is still
    /// the item's current connection.
    pub fn handle_close(
        &self,
        item: &mut NodeItem,
        connection_id: u64,
    ) -> bool {
        if item.connection_id() != Some(connection_id) {
            return false;
        }
        self.detach(item)
    }

    pub fn clear(&self) {
        self.bound.clear();
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }
}
