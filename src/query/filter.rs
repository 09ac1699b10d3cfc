use std::collections::BTreeMap;
use std::collections::HashSet;

use regex::Regex;
use regex::RegexBuilder;
use serde::Serialize;

use crate::Accessibility;
use crate::HostMode;
use crate::HostStatus;
use crate::MonitorError;
use crate::NodeHosting;
use crate::NodeId;
use crate::NodeItem;
use crate::NodeMode;
use crate::Result;

/// Node listing criteria. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct NodeQuery {
    pub system: Option<String>,
    pub node_ids: Option<HashSet<NodeId>>,
    /// Pool ids
    pub pools: Option<HashSet<String>>,
    /// Case-insensitive regex over name and ip
    pub filter: Option<String>,
    /// Case-insensitive regex over geolocation
    pub geolocation: Option<String>,
    /// Excludes the node serving this rpc address
    pub skip_address: Option<String>,
    pub skip_no_address: bool,
    pub strictly_cloud: bool,
    pub skip_cloud: bool,
    pub strictly_pool_backed: bool,
    pub skip_pool_backed: bool,
    pub strictly_internal: bool,
    pub skip_internal: bool,
    pub readable: Option<bool>,
    pub writable: Option<bool>,
    pub trusted: Option<bool>,
    pub migrating: Option<bool>,
    pub decommissioning: Option<bool>,
    pub decommissioned: Option<bool>,
    pub accessibility: Option<Accessibility>,
    // Applied after counting
    pub has_issues: Option<bool>,
    pub online: Option<bool>,
    pub modes: Option<Vec<NodeMode>>,
}

/// Host listing criteria, matched against the host's root node
#[derive(Debug, Clone, Default)]
pub struct HostQuery {
    pub pools: Option<HashSet<String>>,
    /// Case-insensitive regex over host name and ip
    pub filter: Option<String>,
    pub skip_cloud: bool,
    // Applied after counting
    pub modes: Option<Vec<HostMode>>,
}

/// A consolidated host with the already-recomputed items it was built from
#[derive(Debug, Clone)]
pub struct HostEntry {
    pub status: HostStatus,
    pub root: NodeItem,
    pub nodes: Vec<NodeItem>,
}

/// Totals taken before the online/mode/issue filters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModeCounts {
    pub count: usize,
    pub online: usize,
    pub by_mode: BTreeMap<String, usize>,
}

impl ModeCounts {
    pub fn add(
        &mut self,
        online: bool,
        mode: &str,
    ) {
        self.count += 1;
        if online {
            self.online += 1;
        }
        *self.by_mode.entry(mode.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Clone)]
pub struct Filtered<T> {
    pub items: Vec<T>,
    pub counts: ModeCounts,
}

impl<T> Default for Filtered<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            counts: ModeCounts::default(),
        }
    }
}

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// A query turned into predicate closures, chosen per set field
pub struct CompiledQuery<T> {
    pre: Vec<Predicate<T>>,
    post: Vec<Predicate<T>>,
}

impl<T> CompiledQuery<T> {
    fn new() -> Self {
        Self {
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    fn pre(
        &mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) {
        self.pre.push(Box::new(predicate));
    }

    fn post(
        &mut self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) {
        self.post.push(Box::new(predicate));
    }

    pub fn matches_pre(
        &self,
        item: &T,
    ) -> bool {
        self.pre.iter().all(|p| p(item))
    }

    pub fn matches_post(
        &self,
        item: &T,
    ) -> bool {
        self.post.iter().all(|p| p(item))
    }
}

fn compile_regex(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| MonitorError::BadRequest(format!("invalid filter {pattern:?}: {e}")).into())
}

/// `strictly` keeps only nodes of the kind, `skip` drops them
fn hosting_rule(
    compiled: &mut CompiledQuery<NodeItem>,
    hosting: NodeHosting,
    strictly: bool,
    skip: bool,
) {
    if strictly {
        compiled.pre(move |item| item.node.hosting == hosting);
    }
    if skip {
        compiled.pre(move |item| item.node.hosting != hosting);
    }
}

fn flag_rule(
    compiled: &mut CompiledQuery<NodeItem>,
    wanted: Option<bool>,
    read: fn(&NodeItem) -> bool,
) {
    if let Some(wanted) = wanted {
        compiled.pre(move |item| read(item) == wanted);
    }
}

impl NodeQuery {
    pub fn compile(&self) -> Result<CompiledQuery<NodeItem>> {
        let mut compiled: CompiledQuery<NodeItem> = CompiledQuery::new();

        if let Some(system) = self.system.clone() {
            compiled.pre(move |item| item.node.system == system);
        }
        if let Some(ids) = self.node_ids.clone() {
            compiled.pre(move |item| ids.contains(&item.node.id));
        }
        if let Some(pools) = self.pools.clone() {
            compiled.pre(move |item| pools.contains(&item.node.pool));
        }
        if let Some(pattern) = &self.filter {
            let regex = compile_regex(pattern)?;
            compiled.pre(move |item| regex.is_match(&item.node.name) || regex.is_match(&item.node.ip));
        }
        if let Some(pattern) = &self.geolocation {
            let regex = compile_regex(pattern)?;
            compiled.pre(move |item| regex.is_match(&item.node.geolocation));
        }
        if let Some(address) = self.skip_address.clone() {
            compiled.pre(move |item| item.node.rpc_address.as_deref() != Some(address.as_str()));
        }
        if self.skip_no_address {
            compiled.pre(NodeItem::has_address);
        }

        hosting_rule(&mut compiled, NodeHosting::Cloud, self.strictly_cloud, self.skip_cloud);
        hosting_rule(
            &mut compiled,
            NodeHosting::PoolBacked,
            self.strictly_pool_backed,
            self.skip_pool_backed,
        );
        hosting_rule(&mut compiled, NodeHosting::Internal, self.strictly_internal, self.skip_internal);

        flag_rule(&mut compiled, self.readable, |item| item.status.readable);
        flag_rule(&mut compiled, self.writable, |item| item.status.writable);
        flag_rule(&mut compiled, self.trusted, |item| item.status.trusted);
        flag_rule(&mut compiled, self.migrating, |item| item.node.migrating_to_pool.is_some());
        flag_rule(&mut compiled, self.decommissioning, |item| item.node.decommissioning.is_some());
        flag_rule(&mut compiled, self.decommissioned, |item| item.node.decommissioned.is_some());
        if let Some(accessibility) = self.accessibility {
            compiled.pre(move |item| item.status.accessibility == accessibility);
        }

        if let Some(has_issues) = self.has_issues {
            compiled.post(move |item| item.status.has_issues == has_issues);
        }
        if let Some(online) = self.online {
            compiled.post(move |item| item.status.online == online);
        }
        if let Some(modes) = self.modes.clone() {
            compiled.post(move |item| modes.contains(&item.status.mode));
        }
        Ok(compiled)
    }
}

impl HostQuery {
    pub fn compile(&self) -> Result<CompiledQuery<HostEntry>> {
        let mut compiled: CompiledQuery<HostEntry> = CompiledQuery::new();

        if let Some(pools) = self.pools.clone() {
            compiled.pre(move |host: &HostEntry| pools.contains(&host.root.node.pool));
        }
        if let Some(pattern) = &self.filter {
            let regex = compile_regex(pattern)?;
            compiled.pre(move |host: &HostEntry| {
                regex.is_match(host.root.node.host_name()) || regex.is_match(&host.root.node.ip)
            });
        }
        if self.skip_cloud {
            compiled.pre(|host: &HostEntry| host.root.node.hosting != NodeHosting::Cloud);
        }
        if let Some(modes) = self.modes.clone() {
            compiled.post(move |host: &HostEntry| modes.contains(&host.status.mode));
        }
        Ok(compiled)
    }
}

/// Evaluates each item once: pre-filters, then counting, then post-filters.
/// Items must already carry a fresh status.
pub fn filter_nodes(
    items: impl IntoIterator<Item = NodeItem>,
    query: &CompiledQuery<NodeItem>,
) -> Filtered<NodeItem> {
    let mut filtered = Filtered::default();
    for item in items {
        if !query.matches_pre(&item) {
            continue;
        }
        filtered.counts.add(item.status.online, item.status.mode.as_str());
        if query.matches_post(&item) {
            filtered.items.push(item);
        }
    }
    filtered
}

pub fn filter_hosts(
    hosts: impl IntoIterator<Item = HostEntry>,
    query: &CompiledQuery<HostEntry>,
) -> Filtered<HostEntry> {
    let mut filtered = Filtered::default();
    for host in hosts {
        if !query.matches_pre(&host) {
            continue;
        }
        filtered.counts.add(host.status.online, host.status.mode.as_str());
        if query.matches_post(&host) {
            filtered.items.push(host);
        }
    }
    filtered
}
