use std::sync::Arc;

use autometrics::autometrics;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::HeartbeatReply;
use super::HeartbeatRequest;
use super::NodesMonitor;
use crate::utils::time::now_ms;
use crate::utils::time::to_base36;
use crate::AgentConnection;
use crate::AttachOutcome;
use crate::MonitorError;
use crate::NodeEntry;
use crate::NodeHosting;
use crate::NodeId;
use crate::NodeItem;
use crate::NodeRecord;
use crate::PeerId;
use crate::PoolInfo;
use crate::Result;
use crate::PLACEHOLDER_NAME_PREFIX;
use crate::API_SLO;

impl NodesMonitor {
    /// Agent heartbeat: binds the connection to its node, creating the node
    /// when the agent has none yet.
    ///
    /// An agent on another version only gets the server version back so it
    /// upgrades first. A non-master process redirects the agent.
    #[autometrics(objective = API_SLO)]
    pub async fn heartbeat(
        &self,
        req: HeartbeatRequest,
    ) -> Result<HeartbeatReply> {
        let server_version = &self.config.agents.server_version;
        let mut reply = HeartbeatReply {
            version: server_version.clone(),
            ..Default::default()
        };

        if req.version != *server_version {
            info!(
                node_id = ?req.node_id,
                agent_version = %req.version,
                %server_version,
                "agent on another version, replying with server version"
            );
            return Ok(reply);
        }

        if !self.catalog.is_master() {
            reply.redirect = self.catalog.master_address();
            debug!(redirect = ?reply.redirect, "not master, redirecting agent");
            return Ok(reply);
        }

        self.connections.ensure_unbound(req.connection.as_ref())?;
        self.ensure_ready()?;

        if !req.role.allows(req.node_id.is_some()) {
            warn!(role = ?req.role, node_id = ?req.node_id, "bad heartbeat request");
            return Err(MonitorError::Forbidden("bad heartbeat request".into()).into());
        }

        let entry = match &req.node_id {
            Some(node_id) => self
                .registry
                .get(node_id)
                .ok_or_else(|| MonitorError::NoSuchNode(node_id.to_string()))?,
            None => self.add_new_node(&req)?,
        };
        self.set_connection(&entry, req.connection.clone())?;

        let item = entry.item.lock();
        reply.node_id = Some(item.node.id.clone());
        reply.peer_id = Some(item.node.peer_id.clone());
        Ok(reply)
    }

    fn resolve_pool(
        &self,
        req: &HeartbeatRequest,
    ) -> Result<PoolInfo> {
        let configured = req
            .agent_config
            .as_deref()
            .and_then(|id| self.catalog.agent_config(id))
            .and_then(|config| config.pool)
            .and_then(|pool_id| self.catalog.pool(&pool_id));
        configured
            .or_else(|| {
                req.pool_name
                    .as_deref()
                    .and_then(|name| self.catalog.pool_by_name(name))
            })
            .or_else(|| self.catalog.pool_by_name(&self.config.pools.default_pool_name))
            .ok_or_else(|| MonitorError::BadRequest("no pool for new node".into()).into())
    }

    fn add_new_node(
        &self,
        req: &HeartbeatRequest,
    ) -> Result<Arc<NodeEntry>> {
        let pool = self.resolve_pool(req)?;
        let now = now_ms();

        let mut node = NodeRecord::new(
            NodeId::new(self.store.make_id()),
            PeerId::new(self.store.make_id()),
            format!("{PLACEHOLDER_NAME_PREFIX}{}", to_base36(now)),
            self.catalog.system_id(),
            pool.id.clone(),
        );
        node.heartbeat = now;
        node.agent_config = req.agent_config.clone();
        node.hosting = match pool.hosting {
            NodeHosting::Cloud | NodeHosting::PoolBacked => pool.hosting,
            NodeHosting::Agent | NodeHosting::Internal => NodeHosting::Agent,
        };

        info!(node_id = %node.id, name = %node.name, pool = %pool.name, "adding new node");
        let entry = self.registry.add_new(NodeItem::pending(node))?;
        self.registry.mark_dirty(&entry.id);
        Ok(entry)
    }

    /// Binds `conn` to the entry. A newly attached connection gets a close
    /// watcher and a prompt re-check of the node.
    fn set_connection(
        &self,
        entry: &Arc<NodeEntry>,
        conn: Arc<dyn AgentConnection>,
    ) -> Result<()> {
        let connection_id = conn.connection_id();
        let (outcome, event) = {
            let mut item = entry.item.lock();
            let outcome = self.connections.attach(&mut item, conn.clone(), now_ms())?;
            self.registry.mark_dirty(&entry.id);
            (outcome, self.refresh_item(&mut item, now_ms()))
        };
        self.dispatch(event);

        if let AttachOutcome::Attached { replaced } = outcome {
            debug!(node_id = %entry.id, connection_id, ?replaced, "agent connected");
            self.watch_close(entry.id.clone(), conn);
            let tasks = self.tasks();
            self.scan.schedule_node(&tasks, self.handle()?, entry.id.clone());
        }
        Ok(())
    }

    fn watch_close(
        &self,
        node_id: NodeId,
        conn: Arc<dyn AgentConnection>,
    ) {
        let me = self.me.clone();
        let tasks = self.tasks();
        let token = tasks.token();
        tasks.spawn("connection_close_watch", async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = conn.closed() => {
                    if let Some(monitor) = me.upgrade() {
                        monitor.on_connection_close(&node_id, conn.connection_id());
                    }
                }
            }
        });
    }

    fn on_connection_close(
        &self,
        node_id: &NodeId,
        connection_id: u64,
    ) {
        let Some(entry) = self.registry.get(node_id) else {
            return;
        };
        let event = {
            let mut item = entry.item.lock();
            if !self.connections.handle_close(&mut item, connection_id) {
                return;
            }
            self.registry.mark_dirty(node_id);
            self.refresh_item(&mut item, now_ms())
        };
        info!(%node_id, connection_id, "agent connection closed");
        self.dispatch(event);
    }
}
