use autometrics::autometrics;
use tracing::debug;

use super::AggregateReply;
use super::HostInfo;
use super::ListOptions;
use super::ListReply;
use super::NodeInfo;
use super::NodesMonitor;
use crate::filter_hosts;
use crate::filter_nodes;
use crate::paginate;
use crate::sort_list;
use crate::utils::time::now_ms;
use crate::HostEntry;
use crate::HostQuery;
use crate::LookupOptions;
use crate::MonitorError;
use crate::NodeId;
use crate::NodeIdentity;
use crate::NodeItem;
use crate::NodeQuery;
use crate::NodeRole;
use crate::Result;
use crate::API_SLO;

impl NodesMonitor {
    #[autometrics(objective = API_SLO)]
    pub fn read_node(
        &self,
        identity: &NodeIdentity,
    ) -> Result<NodeInfo> {
        self.ensure_ready()?;
        let entry = self.find_entry(identity, LookupOptions::allow_offline())?;
        let item = self.refreshed_item(&entry, now_ms());
        Ok(self.node_info(&item))
    }

    #[autometrics(objective = API_SLO)]
    pub fn read_host(
        &self,
        host_id: &str,
    ) -> Result<HostInfo> {
        self.ensure_ready()?;
        let entries = self.registry.lookup_by_host(host_id)?;
        let host = self
            .host_entry(host_id, &entries, now_ms())
            .ok_or_else(|| MonitorError::NoSuchHost(host_id.to_string()))?;
        Ok(self.host_info(&host))
    }

    pub(super) fn host_info(
        &self,
        host: &HostEntry,
    ) -> HostInfo {
        let infos = |role: NodeRole| -> Vec<NodeInfo> {
            host.nodes
                .iter()
                .filter(|item| item.node.role == role)
                .map(|item| self.node_info(item))
                .collect()
        };
        HostInfo::new(&host.status, &host.root, infos(NodeRole::Storage), infos(NodeRole::Gateway))
    }

    /// Filters, sorts and pages the nodes. Counts are taken before the
    /// online, mode and issue filters.
    #[autometrics(objective = API_SLO)]
    pub fn list_nodes(
        &self,
        query: &NodeQuery,
        options: ListOptions,
    ) -> Result<ListReply<NodeInfo>> {
        self.ensure_ready()?;
        let compiled = query.compile()?;
        let mut filtered = filter_nodes(self.refreshed_stored_items(), &compiled);
        sort_list(&mut filtered.items, options.sort, options.order);
        let total = filtered.items.len();
        let items = paginate(filtered.items, options.skip, options.limit)
            .iter()
            .map(|item| self.node_info(item))
            .collect();
        Ok(ListReply {
            counts: filtered.counts,
            total,
            items,
        })
    }

    #[autometrics(objective = API_SLO)]
    pub fn list_hosts(
        &self,
        query: &HostQuery,
        options: ListOptions,
    ) -> Result<ListReply<HostInfo>> {
        self.ensure_ready()?;
        let compiled = query.compile()?;
        let mut filtered = filter_hosts(self.host_entries(), &compiled);
        sort_list(&mut filtered.items, options.sort, options.order);
        let total = filtered.items.len();
        let items = paginate(filtered.items, options.skip, options.limit)
            .iter()
            .map(|host| self.host_info(host))
            .collect();
        Ok(ListReply {
            counts: filtered.counts,
            total,
            items,
        })
    }

    #[autometrics(objective = API_SLO)]
    pub fn aggregate_nodes(
        &self,
        query: &NodeQuery,
        group_by_pool: bool,
    ) -> Result<AggregateReply> {
        self.ensure_ready()?;
        let compiled = query.compile()?;
        let items = filter_nodes(self.refreshed_stored_items(), &compiled).items;
        let capacity = self.status.capacity();
        let now = now_ms();
        Ok(AggregateReply {
            total: crate::aggregate_nodes(&items, capacity, now),
            by_pool: group_by_pool.then(|| crate::aggregate_nodes_by_pool(&items, capacity, now)),
        })
    }

    #[autometrics(objective = API_SLO)]
    pub fn aggregate_hosts(
        &self,
        query: &HostQuery,
        group_by_pool: bool,
    ) -> Result<AggregateReply> {
        self.ensure_ready()?;
        let compiled = query.compile()?;
        let hosts = filter_hosts(self.host_entries(), &compiled).items;
        let now = now_ms();
        Ok(AggregateReply {
            total: crate::aggregate_hosts(&hosts, now),
            by_pool: group_by_pool.then(|| crate::aggregate_hosts_by_pool(&hosts, now)),
        })
    }

    /// Writable stored nodes of the pool, least used first
    #[autometrics(objective = API_SLO)]
    pub fn allocate_nodes(
        &self,
        pool_id: &str,
    ) -> Result<Vec<NodeInfo>> {
        self.ensure_ready()?;
        let mut candidates: Vec<NodeItem> = self
            .refreshed_stored_items()
            .into_iter()
            .filter(|item| item.status.writable && item.node.pool == pool_id)
            .collect();
        candidates.sort_by_key(|item| item.node.storage.used);
        candidates.truncate(self.config.pools.allocate_max_nodes);
        debug!(pool_id, nodes = candidates.len(), "nodes allocated");
        Ok(candidates.iter().map(|item| self.node_info(item)).collect())
    }

    /// Ids of the node named `identity`, or of every node on host `identity`
    #[autometrics(objective = API_SLO)]
    pub fn get_node_ids(
        &self,
        identity: &str,
        by_host: bool,
    ) -> Result<Vec<NodeId>> {
        if by_host {
            let entries = self.registry.lookup_by_host(identity)?;
            return Ok(entries.iter().map(|entry| entry.id.clone()).collect());
        }
        let entry = self.find_entry(&NodeIdentity::Name(identity.to_string()), LookupOptions::allow_offline())?;
        Ok(vec![entry.id.clone()])
    }
}
