use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::NodesMonitor;
use crate::apply_probe_results;
use crate::apply_rpc_config;
use crate::filter_nodes;
use crate::host_tokens;
use crate::merge_agent_info;
use crate::metrics::REBUILD_BATCHES;
use crate::rpc_config_update;
use crate::run_probes;
use crate::service_update;
use crate::should_enable_agent;
use crate::sort_list;
use crate::suggest_pools;
use crate::utils::async_task::with_timeout;
use crate::utils::time::now_ms;
use crate::ActivityStage;
use crate::AgentConnection;
use crate::AgentInfo;
use crate::HostSample;
use crate::NodeEntry;
use crate::NodeHosting;
use crate::NodeId;
use crate::NodeQuery;
use crate::NodeRole;
use crate::PeerProbe;
use crate::ProbePlan;
use crate::RebuildWorker;
use crate::Result;
use crate::ScanRunner;
use crate::SortKey;
use crate::SortOrder;

impl NodesMonitor {
    /// One node's scan work: reconcile the agent when connected, then
    /// recompute status and let the batcher pick up the changes.
    ///
    /// Runs for the same node never overlap.
    pub(super) async fn run_node_entry(
        &self,
        entry: Arc<NodeEntry>,
    ) {
        let _serial = entry.run_lock.lock().await;
        if !self.is_started() || self.registry.get(&entry.id).is_none() {
            return;
        }
        let connection = {
            let item = entry.item.lock();
            if item.node.deleted.is_some() {
                trace!(node_id = %entry.id, "node deleted, skipping run");
                return;
            }
            item.connection.clone()
        };

        if let Some(conn) = connection {
            if let Err(e) = self.reconcile_agent(&entry, &conn).await {
                warn!(node_id = %entry.id, ?e, "agent reconcile failed");
            }
        }
        self.refresh_entry(&entry);
        self.flush(false).await;
    }

    async fn reconcile_agent(
        &self,
        entry: &Arc<NodeEntry>,
        conn: &Arc<dyn AgentConnection>,
    ) -> Result<()> {
        self.sync_agent_info(entry, conn).await?;
        self.sync_node_service(entry, conn).await?;
        self.sync_create_node_token(entry, conn).await?;
        self.sync_rpc_config(entry, conn).await?;
        self.test_node_validity(entry, conn).await
    }

    async fn sync_agent_info(
        &self,
        entry: &Arc<NodeEntry>,
        conn: &Arc<dyn AgentConnection>,
    ) -> Result<()> {
        let fetched = with_timeout(
            "get_agent_info",
            self.config.agents.response_timeout(),
            conn.get_agent_info(self.catalog.server_addresses()),
        )
        .await;
        let info = match fetched {
            Ok(info) => info,
            Err(e) => {
                let mut item = entry.item.lock();
                if e.is_storage_not_exist() && item.storage_not_exist.is_none() {
                    warn!(node_id = %entry.id, ?e, "agent storage does not exist");
                    item.storage_not_exist = Some(now_ms());
                }
                if item.node.deleting.is_some() {
                    debug!(node_id = %entry.id, ?e, "ignoring agent info failure on deleting node");
                    return Ok(());
                }
                return Err(e);
            }
        };

        let (persisted, current_host) = {
            let item = entry.item.lock();
            (item.is_persisted(), item.node.host_id.clone())
        };
        if persisted {
            if current_host.as_deref() != Some(info.host_id.as_str()) {
                self.move_host(entry, current_host, &info.host_id);
            }
        } else {
            self.adopt_agent_identity(entry, &info);
        }

        let mut item = entry.item.lock();
        merge_agent_info(&mut item.node, &info, now_ms());
        item.agent_info = Some(info);
        self.registry.mark_dirty(&entry.id);
        Ok(())
    }

    /// The agent now reports another host id. Every node grouped under the
    /// old host follows it so the host stays consistent.
    fn move_host(
        &self,
        entry: &Arc<NodeEntry>,
        from: Option<String>,
        to: &str,
    ) {
        warn!(node_id = %entry.id, ?from, %to, "agent reported a different host id");
        let moved = match from.as_deref() {
            Some(from) => self.registry.rehost(from, to),
            None => Vec::new(),
        };
        let moved = if moved.is_empty() {
            self.registry.set_host(entry, to);
            vec![entry.clone()]
        } else {
            moved
        };
        for member in moved {
            member.item.lock().node.host_id = Some(to.to_string());
            self.registry.mark_dirty(&member.id);
        }
    }

    /// First info from a pending node: it takes the agent's name and host
    /// and is enabled or decommissioned per its install-time config.
    fn adopt_agent_identity(
        &self,
        entry: &Arc<NodeEntry>,
        info: &AgentInfo,
    ) {
        let desired = if info.name.is_empty() { "node" } else { info.name.as_str() };
        let name = self.registry.rename(entry, desired);
        self.registry.set_host(entry, &info.host_id);

        let agent_config_id = entry.item.lock().node.agent_config.clone();
        let agent_config = agent_config_id.and_then(|id| self.catalog.agent_config(&id));
        let enable = should_enable_agent(info, agent_config.as_ref(), self.status.capacity());

        let mut item = entry.item.lock();
        info!(node_id = %entry.id, from = %item.node.name, to = %name, enable, "node named by its agent");
        item.node.name = name;
        item.node.host_id = Some(info.host_id.clone());
        if !enable {
            let now = now_ms();
            item.node.decommissioned.get_or_insert(now);
            item.node.decommissioning.get_or_insert(now);
        }
    }

    async fn sync_node_service(
        &self,
        entry: &Arc<NodeEntry>,
        conn: &Arc<dyn AgentConnection>,
    ) -> Result<()> {
        let (desired, gateway) = {
            let item = entry.item.lock();
            (service_update(&item), item.node.is_gateway())
        };
        let Some(enabled) = desired else {
            return Ok(());
        };
        info!(node_id = %entry.id, enabled, "node service not as expected, updating");
        let certs = if gateway { self.catalog.ssl_certs() } else { None };
        with_timeout(
            "update_node_service",
            self.config.agents.response_timeout(),
            conn.update_node_service(enabled, certs),
        )
        .await?;

        entry.item.lock().node.enabled = enabled;
        self.registry.mark_dirty(&entry.id);
        Ok(())
    }

    async fn sync_create_node_token(
        &self,
        entry: &Arc<NodeEntry>,
        conn: &Arc<dyn AgentConnection>,
    ) -> Result<()> {
        let pool = {
            let item = entry.item.lock();
            if !item.is_persisted() || item.create_node_token.is_some() {
                return Ok(());
            }
            item.node.pool.clone()
        };
        debug!(node_id = %entry.id, "sending create node token");
        let token = self.catalog.issue_create_node_token(&pool);
        with_timeout(
            "update_create_node_token",
            self.config.agents.response_timeout(),
            conn.update_create_node_token(token.clone()),
        )
        .await?;

        let mut item = entry.item.lock();
        if item.connection_id() == Some(conn.connection_id()) {
            item.create_node_token = Some(token);
        }
        Ok(())
    }

    async fn sync_rpc_config(
        &self,
        entry: &Arc<NodeEntry>,
        conn: &Arc<dyn AgentConnection>,
    ) -> Result<()> {
        let update = {
            let item = entry.item.lock();
            rpc_config_update(&item, self.catalog.as_ref(), &self.config.agents)
        };
        if update.is_empty() {
            return Ok(());
        }
        info!(node_id = %entry.id, ?update, "pushing rpc config");
        with_timeout(
            "update_rpc_config",
            self.config.agents.response_timeout(),
            conn.update_rpc_config(update.clone()),
        )
        .await?;

        apply_rpc_config(&mut entry.item.lock().node, &update);
        self.registry.mark_dirty(&entry.id);
        Ok(())
    }

    async fn test_node_validity(
        &self,
        entry: &Arc<NodeEntry>,
        conn: &Arc<dyn AgentConnection>,
    ) -> Result<()> {
        let (pool, rpc_address) = {
            let item = entry.item.lock();
            if !item.is_persisted() {
                return Ok(());
            }
            (item.node.pool.clone(), item.node.rpc_address.clone())
        };
        let peers = match rpc_address.as_deref() {
            Some(address) => self.select_test_peers(&pool, address)?,
            None => Vec::new(),
        };
        let plan = ProbePlan {
            connection: conn.clone(),
            rpc_address,
            peers,
            store_perf_count: self.config.scan.store_perf_count,
            timeout: self.config.agents.probe_timeout(),
        };
        let results = run_probes(plan).await;

        let changed = {
            let mut item = entry.item.lock();
            apply_probe_results(&mut item, &results, now_ms(), self.config.issues.max_latencies)
        };
        if changed {
            self.registry.mark_dirty(&entry.id);
        }
        Ok(())
    }

    /// A random sample of connected, issue-free peers of the same pool
    pub(super) fn select_test_peers(
        &self,
        pool: &str,
        skip_address: &str,
    ) -> Result<Vec<PeerProbe>> {
        let query = NodeQuery {
            pools: Some(HashSet::from([pool.to_string()])),
            skip_address: Some(skip_address.to_string()),
            skip_no_address: true,
            has_issues: Some(false),
            ..Default::default()
        }
        .compile()?;
        let mut candidates = filter_nodes(self.refreshed_items(), &query).items;
        sort_list(&mut candidates, SortKey::Shuffle, SortOrder::Asc);
        Ok(candidates
            .into_iter()
            .filter_map(|item| {
                Some(PeerProbe {
                    connection: item.connection?,
                    rpc_address: item.node.rpc_address?,
                })
            })
            .take(self.config.detention.test_nodes)
            .collect())
    }

    /// Best effort: failures only leave the previous suggestions in place
    fn assign_suggested_pools(&self) {
        let now = now_ms();
        let mut samples = Vec::new();
        let mut members: Vec<(String, Vec<Arc<NodeEntry>>)> = Vec::new();
        for (host_id, entries) in self.registry.hosts() {
            let Some(host) = self.host_entry(&host_id, &entries, now) else {
                continue;
            };
            let root = &host.root.node;
            if !host.root.is_persisted() || root.role != NodeRole::Storage || root.hosting != NodeHosting::Agent {
                continue;
            }
            let Some(pool) = self.catalog.pool(&root.pool) else {
                continue;
            };
            samples.push(HostSample {
                host_id: host_id.clone(),
                pool_name: pool.name,
                tokens: host_tokens(root, &host.status),
            });
            members.push((host_id, entries));
        }

        let suggestions = suggest_pools(&samples, &self.config.pools, self.advisor.as_ref());
        for (host_id, entries) in members {
            let suggested = suggestions.get(&host_id).cloned();
            for entry in entries {
                entry.item.lock().suggested_pool = suggested.clone();
            }
        }
        debug!(hosts = samples.len(), suggested = suggestions.len(), "pool suggestions updated");
    }
}

#[async_trait]
impl ScanRunner for NodesMonitor {
    async fn run_pass(&self) {
        if !self.is_started() {
            return;
        }
        let entries = self.registry.snapshot();
        debug!(nodes = entries.len(), "scan pass started");
        stream::iter(entries)
            .for_each_concurrent(self.config.scan.concurrency.max(1), |entry| self.run_node_entry(entry))
            .await;
        self.assign_suggested_pools();
        self.flush(true).await;
    }

    async fn run_node(
        &self,
        node_id: NodeId,
    ) {
        match self.registry.get(&node_id) {
            Some(entry) => self.run_node_entry(entry).await,
            None => trace!(%node_id, "node gone before its run"),
        }
    }
}

#[async_trait]
impl RebuildWorker for NodesMonitor {
    /// Runs one batch of the node's current stage. The outcome is dropped
    /// when the stage moved on while the batch was in flight.
    async fn rebuild_node(
        &self,
        node_id: NodeId,
    ) {
        let Some(entry) = self.registry.get(&node_id) else {
            return;
        };
        let claimed = {
            let mut item = entry.item.lock();
            match item.data_activity.as_mut() {
                Some(act)
                    if !act.done
                        && !act.running
                        && !act.stage.done
                        && act.stage.stage != ActivityStage::OfflineGrace =>
                {
                    act.running = true;
                    Some((act.stage.stage, act.stage.marker.clone()))
                }
                _ => None,
            }
        };
        let Some((stage, marker)) = claimed else {
            trace!(%node_id, "no rebuild work to run");
            return;
        };

        let outcome = with_timeout(
            "plan_and_rebuild",
            self.config.rebuild.batch_timeout(),
            self.rebuild_service.plan_and_rebuild(
                node_id.clone(),
                stage,
                marker.clone(),
                self.config.rebuild.batch_size,
            ),
        )
        .await;
        let label = if outcome.is_ok() { "ok" } else { "error" };
        REBUILD_BATCHES.with_label_values(&[stage.as_str(), label]).inc();

        let event = {
            let mut item = entry.item.lock();
            let now = now_ms();
            if let Some(act) = item.data_activity.as_mut() {
                act.running = false;
                if act.stage.stage == stage {
                    act.apply_batch(marker, outcome.map_err(|e| e.to_string()), now);
                } else {
                    debug!(%node_id, stage = stage.as_str(), "stage changed during batch, outcome dropped");
                }
            }
            self.refresh_item(&mut item, now)
        };
        self.dispatch(event);
    }
}
