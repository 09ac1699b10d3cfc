use std::sync::Arc;
use std::time::Duration;

use autometrics::autometrics;
use futures::future::join_all;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::BlockReport;
use super::NodesMonitor;
use crate::utils::async_task::with_timeout;
use crate::utils::time::now_ms;
use crate::AgentConnection;
use crate::IssueReport;
use crate::LookupOptions;
use crate::MonitorError;
use crate::NetworkTestParams;
use crate::NodeEntry;
use crate::NodeEventKind;
use crate::NodeHosting;
use crate::NodeIdentity;
use crate::NodeItem;
use crate::NodeRole;
use crate::PoolInfo;
use crate::Result;
use crate::API_SLO;

fn start_decommission(
    item: &mut NodeItem,
    now: u64,
) {
    item.node.decommissioning = Some(now);
    // Gateways hold no data to move off
    if item.node.is_gateway() {
        item.node.decommissioned = Some(now);
    }
}

fn clear_decommission(item: &mut NodeItem) {
    item.node.decommissioning = None;
    item.node.decommissioned = None;
}

fn in_decommission(item: &NodeItem) -> bool {
    item.node.decommissioning.is_some() || item.node.decommissioned.is_some()
}

impl NodesMonitor {
    fn target_pool(
        &self,
        pool_id: &str,
    ) -> Result<PoolInfo> {
        let pool = self
            .catalog
            .pool(pool_id)
            .ok_or_else(|| MonitorError::BadRequest(format!("no such pool {pool_id}")))?;
        if pool.is_resource_pool() {
            return Err(MonitorError::BadRequest(format!("migrating to resource pool {} is not allowed", pool.name)).into());
        }
        Ok(pool)
    }

    fn ensure_migratable(
        &self,
        entry: &NodeEntry,
    ) -> Result<()> {
        let item = entry.item.lock();
        if matches!(item.node.hosting, NodeHosting::Cloud | NodeHosting::PoolBacked) {
            return Err(MonitorError::BadRequest(format!("migrating node {} is not allowed", item.node.name)).into());
        }
        Ok(())
    }

    /// Moves the nodes to `pool_id`. Every node is validated before any of
    /// them changes.
    #[autometrics(objective = API_SLO)]
    pub async fn migrate_nodes_to_pool(
        &self,
        nodes: &[NodeIdentity],
        pool_id: &str,
        actor: Option<&str>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let pool = self.target_pool(pool_id)?;
        let mut entries = Vec::with_capacity(nodes.len());
        for identity in nodes {
            let entry = self.find_entry(identity, LookupOptions::allow_offline())?;
            self.ensure_migratable(&entry)?;
            entries.push(entry);
        }
        self.migrate_entries(entries, &pool, actor).await;
        Ok(())
    }

    /// Moves every node of the hosts to `pool_id`
    #[autometrics(objective = API_SLO)]
    pub async fn migrate_hosts_to_pool(
        &self,
        hosts: &[String],
        pool_id: &str,
        actor: Option<&str>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let pool = self.target_pool(pool_id)?;
        let mut entries = Vec::new();
        for host_id in hosts {
            for entry in self.registry.lookup_by_host(host_id)? {
                self.ensure_migratable(&entry)?;
                entries.push(entry);
            }
        }
        self.migrate_entries(entries, &pool, actor).await;
        Ok(())
    }

    async fn migrate_entries(
        &self,
        entries: Vec<Arc<NodeEntry>>,
        pool: &PoolInfo,
        actor: Option<&str>,
    ) {
        let now = now_ms();
        let mut events = Vec::new();
        for entry in &entries {
            let mut item = entry.item.lock();
            if item.node.pool != pool.id {
                let from = self
                    .catalog
                    .pool(&item.node.pool)
                    .map(|p| p.name)
                    .unwrap_or_else(|| item.node.pool.clone());
                info!(node_id = %entry.id, %from, to = %pool.name, "node assigned to pool");
                item.node.migrating_to_pool = Some(now);
                item.node.pool = pool.id.clone();
                item.suggested_pool = None;
                events.push(
                    self.event(NodeEventKind::AssignedToPool, &item)
                        .actor(actor)
                        .description(format!("{} was assigned from {from} to {}", item.node.name, pool.name)),
                );
            }
            self.registry.mark_dirty(&entry.id);
            events.extend(self.refresh_item(&mut item, now));
        }

        self.flush(true).await;
        for event in events {
            self.events.dispatch(event);
        }
        if let Ok(this) = self.handle() {
            self.scan.schedule(
                &self.tasks(),
                this,
                Duration::from_millis(self.config.scan.hurry_delay_ms),
            );
        }
    }

    /// Starts moving the node's data off. Already decommissioning or
    /// decommissioned nodes are left alone.
    #[autometrics(objective = API_SLO)]
    pub async fn decommission_node(
        &self,
        identity: &NodeIdentity,
        actor: Option<&str>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let entry = self.find_entry(identity, LookupOptions::allow_offline())?;
        let events = {
            let mut item = entry.item.lock();
            if in_decommission(&item) {
                return Ok(());
            }
            let now = now_ms();
            start_decommission(&mut item, now);
            self.registry.mark_dirty(&entry.id);
            let started = self
                .event(NodeEventKind::DecommissionStarted, &item)
                .actor(actor)
                .description(format!("{} was deactivated", item.node.name));
            [self.refresh_item(&mut item, now), Some(started)]
        };
        self.flush(true).await;
        events.into_iter().for_each(|event| self.dispatch(event));
        Ok(())
    }

    #[autometrics(objective = API_SLO)]
    pub async fn recommission_node(
        &self,
        identity: &NodeIdentity,
        actor: Option<&str>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let entry = self.find_entry(identity, LookupOptions::allow_offline())?;
        let events = {
            let mut item = entry.item.lock();
            if !in_decommission(&item) {
                return Ok(());
            }
            clear_decommission(&mut item);
            self.registry.mark_dirty(&entry.id);
            let recommissioned = self
                .event(NodeEventKind::Recommissioned, &item)
                .actor(actor)
                .description(format!("{} was reactivated", item.node.name));
            [self.refresh_item(&mut item, now_ms()), Some(recommissioned)]
        };
        self.flush(true).await;
        events.into_iter().for_each(|event| self.dispatch(event));
        Ok(())
    }

    /// Enables or disables the storage and gateway services of a host.
    /// `None` leaves that role untouched.
    #[autometrics(objective = API_SLO)]
    pub async fn update_nodes_services(
        &self,
        host_id: &str,
        storage_enabled: Option<bool>,
        gateway_enabled: Option<bool>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let now = now_ms();
        for entry in self.registry.lookup_by_host(host_id)? {
            let event = {
                let mut item = entry.item.lock();
                let wanted = match item.node.role {
                    NodeRole::Storage => storage_enabled,
                    NodeRole::Gateway => gateway_enabled,
                };
                match wanted {
                    Some(true) if in_decommission(&item) => clear_decommission(&mut item),
                    Some(false) if !in_decommission(&item) => start_decommission(&mut item, now),
                    _ => continue,
                }
                debug!(node_id = %entry.id, enabled = ?wanted, "node service updated");
                self.registry.mark_dirty(&entry.id);
                self.refresh_item(&mut item, now)
            };
            self.dispatch(event);
        }
        self.flush(true).await;
        Ok(())
    }

    /// Marks the node for deletion; its data is wiped before it is removed
    #[autometrics(objective = API_SLO)]
    pub async fn delete_node(
        &self,
        identity: &NodeIdentity,
    ) -> Result<()> {
        self.ensure_ready()?;
        let entry = self.find_entry(identity, LookupOptions::allow_offline())?;
        let event = {
            let mut item = entry.item.lock();
            let now = now_ms();
            if item.node.deleting.is_none() {
                info!(node_id = %entry.id, name = %item.node.name, "node deletion requested");
                item.node.deleting = Some(now);
            }
            self.registry.mark_dirty(&entry.id);
            self.refresh_item(&mut item, now)
        };
        self.dispatch(event);
        self.flush(true).await;
        Ok(())
    }

    fn connection_of(
        &self,
        entry: &NodeEntry,
    ) -> Result<Arc<dyn AgentConnection>> {
        entry
            .item
            .lock()
            .connection
            .clone()
            .ok_or_else(|| MonitorError::NodeOffline(entry.id.to_string()).into())
    }

    async fn push_debug_level(
        &self,
        entry: &NodeEntry,
        conn: Arc<dyn AgentConnection>,
        level: u32,
    ) -> Result<()> {
        with_timeout(
            "set_debug_level",
            self.config.agents.response_timeout(),
            conn.set_debug_level(level),
        )
        .await?;
        entry.item.lock().node.debug_level = level;
        self.registry.mark_dirty(&entry.id);
        Ok(())
    }

    #[autometrics(objective = API_SLO)]
    pub async fn set_debug_node(
        &self,
        identity: &NodeIdentity,
        level: u32,
        actor: Option<&str>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let entry = self.find_entry(identity, LookupOptions::online())?;
        let conn = self.connection_of(&entry)?;
        self.push_debug_level(&entry, conn, level).await?;

        let event = {
            let item = entry.item.lock();
            self.event(NodeEventKind::DebugLevelChanged, &item)
                .actor(actor)
                .description(format!("{} debug level was set to {level}", item.node.name))
        };
        self.events.dispatch(event);
        Ok(())
    }

    /// Sets the debug level on every connected node of the host. Offline
    /// nodes are skipped; the first failure is returned once all calls
    /// finished.
    #[autometrics(objective = API_SLO)]
    pub async fn set_debug_host(
        &self,
        host_id: &str,
        level: u32,
    ) -> Result<()> {
        self.ensure_ready()?;
        let targets: Vec<(Arc<NodeEntry>, Arc<dyn AgentConnection>)> = self
            .registry
            .lookup_by_host(host_id)?
            .into_iter()
            .filter_map(|entry| {
                let conn = entry.item.lock().connection.clone()?;
                Some((entry, conn))
            })
            .collect();

        let results = join_all(
            targets
                .iter()
                .map(|(entry, conn)| self.push_debug_level(entry, conn.clone(), level)),
        )
        .await;
        debug!(host_id, level, nodes = results.len(), "host debug level set");
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    /// Forwards an arbitrary call to an online node
    #[autometrics(objective = API_SLO)]
    pub async fn proxy(
        &self,
        identity: &NodeIdentity,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.ensure_ready()?;
        let entry = self.find_entry(identity, LookupOptions::online())?;
        let conn = self.connection_of(&entry)?;
        with_timeout(
            "proxy",
            self.config.agents.response_timeout(),
            conn.proxy(method.to_string(), params),
        )
        .await
    }

    /// Runs a network test from the node serving `params.source`
    #[autometrics(objective = API_SLO)]
    pub async fn test_node_network(
        &self,
        params: NetworkTestParams,
    ) -> Result<Value> {
        self.ensure_ready()?;
        let source = NodeIdentity::RpcAddress(params.source.clone());
        let entry = self.find_entry(&source, LookupOptions::online())?;
        let conn = self.connection_of(&entry)?;
        with_timeout(
            "test_network_perf_to_peer",
            self.config.agents.response_timeout(),
            conn.test_network_perf_to_peer(params),
        )
        .await
    }

    /// Records client-observed block failures in the nodes' issue logs.
    /// Reports for unknown nodes are skipped.
    #[autometrics(objective = API_SLO)]
    pub fn report_error_on_node_blocks(
        &self,
        reports: Vec<BlockReport>,
    ) -> Result<()> {
        self.ensure_ready()?;
        let max_reports = self.config.issues.max_issue_reports;
        for report in reports {
            let Some(entry) = self.registry.get(&report.node_id) else {
                warn!(node_id = %report.node_id, "block error reported for unknown node");
                continue;
            };
            let event = {
                let mut item = entry.item.lock();
                let now = now_ms();
                item.node.push_issue(
                    IssueReport {
                        time: now,
                        action: report.action,
                        reason: report.reason,
                        count: 0,
                        count_since: None,
                    },
                    max_reports,
                );
                debug!(node_id = %entry.id, issues = item.node.issues_report.len(), "block error recorded");
                self.registry.mark_dirty(&entry.id);
                self.refresh_item(&mut item, now)
            };
            self.dispatch(event);
        }
        Ok(())
    }

    /// Runs a full scan pass now, after any pass in flight
    #[autometrics(objective = API_SLO)]
    pub async fn sync_to_store(&self) -> Result<()> {
        self.ensure_ready()?;
        self.scan.run_now(self).await;
        Ok(())
    }
}
