use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::error;

use crate::IntegrityError;
use crate::MonitorError;
use crate::NodeId;
use crate::NodeIdentity;
use crate::NodeItem;
use crate::PeerId;
use crate::Result;

/// A registry slot. Identity is immutable; everything else lives behind the
/// item lock.
pub struct NodeEntry {
    pub id: NodeId,
    pub peer_id: PeerId,
    pub item: Mutex<NodeItem>,
    /// Serializes scan work on this node
    pub(crate) run_lock: tokio::sync::Mutex<()>,
}

impl NodeEntry {
    fn new(item: NodeItem) -> Self {
        Self {
            id: item.node.id.clone(),
            peer_id: item.node.peer_id.clone(),
            item: Mutex::new(item),
            run_lock: tokio::sync::Mutex::new(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LookupOptions {
    pub allow_missing: bool,
    pub allow_offline: bool,
}

impl LookupOptions {
    pub fn online() -> Self {
        Self::default()
    }

    pub fn allow_offline() -> Self {
        Self {
            allow_missing: false,
            allow_offline: true,
        }
    }
}

#[derive(Default)]
struct Indexes {
    by_id: HashMap<NodeId, Arc<NodeEntry>>,
    by_peer: HashMap<PeerId, Arc<NodeEntry>>,
    by_name: HashMap<String, Arc<NodeEntry>>,
    by_host: HashMap<String, Vec<Arc<NodeEntry>>>,
    name_of: HashMap<NodeId, String>,
    host_of: HashMap<NodeId, String>,
    dirty: HashSet<NodeId>,
}

impl Indexes {
    fn detach_host(
        &mut self,
        id: &NodeId,
    ) {
        if let Some(host) = self.host_of.remove(id) {
            if let Some(members) = self.by_host.get_mut(&host) {
                members.retain(|e| &e.id != id);
                if members.is_empty() {
                    self.by_host.remove(&host);
                }
            }
        }
    }

    fn attach_host(
        &mut self,
        entry: &Arc<NodeEntry>,
        host_id: &str,
    ) {
        self.detach_host(&entry.id);
        self.by_host
            .entry(host_id.to_string())
            .or_default()
            .push(entry.clone());
        self.host_of.insert(entry.id.clone(), host_id.to_string());
    }
}

/// In-memory indexes over node items.
///
/// All indexes and the dirty set change together under one write lock.
/// Registry methods never take an item lock while holding the index lock,
/// so callers may hold an item lock while calling into the registry.
#[derive(Default)]
pub struct NodeRegistry {
    indexes: RwLock<Indexes>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node created by a heartbeat; it stays `Pending` until flushed
    pub fn add_new(
        &self,
        item: NodeItem,
    ) -> Result<Arc<NodeEntry>> {
        debug_assert!(!item.is_persisted());
        self.insert(item)
    }

    /// Adds a node loaded from the store
    pub fn add_existing(
        &self,
        item: NodeItem,
    ) -> Result<Arc<NodeEntry>> {
        debug_assert!(item.is_persisted());
        self.insert(item)
    }

    fn insert(
        &self,
        item: NodeItem,
    ) -> Result<Arc<NodeEntry>> {
        let name = item.node.name.clone();
        let host_id = item.node.host_id.clone();
        let entry = Arc::new(NodeEntry::new(item));

        let mut indexes = self.indexes.write();
        if indexes.by_id.contains_key(&entry.id) {
            error!(node_id = %entry.id, "registry id collision");
            return Err(IntegrityError::IdCollision(entry.id.clone()).into());
        }
        if indexes.by_peer.contains_key(&entry.peer_id) {
            error!(peer_id = %entry.peer_id, "registry peer id collision");
            return Err(IntegrityError::PeerIdCollision(entry.peer_id.clone()).into());
        }
        if indexes.by_name.contains_key(&name) {
            error!(name = %name, "registry name collision");
            return Err(IntegrityError::NameCollision(name).into());
        }

        indexes.by_id.insert(entry.id.clone(), entry.clone());
        indexes.by_peer.insert(entry.peer_id.clone(), entry.clone());
        indexes.by_name.insert(name.clone(), entry.clone());
        indexes.name_of.insert(entry.id.clone(), name);
        if let Some(host_id) = host_id {
            indexes.attach_host(&entry, &host_id);
        }
        Ok(entry)
    }

    pub fn lookup(
        &self,
        identity: &NodeIdentity,
    ) -> Option<Arc<NodeEntry>> {
        let indexes = self.indexes.read();
        match identity.normalized() {
            NodeIdentity::Id(id) => indexes.by_id.get(&id).cloned(),
            NodeIdentity::Name(name) => indexes.by_name.get(&name).cloned(),
            NodeIdentity::PeerId(peer) => indexes.by_peer.get(&peer).cloned(),
            NodeIdentity::RpcAddress(_) => None,
        }
    }

    pub fn get(
        &self,
        id: &NodeId,
    ) -> Option<Arc<NodeEntry>> {
        self.indexes.read().by_id.get(id).cloned()
    }

    /// Resolves a node for a caller.
    ///
    /// Fails with `NoSuchNode` unless `allow_missing`, and with `NodeOffline`
    /// when the node has no connection unless `allow_offline`. Takes the item
    /// lock, so it must not be called while holding one.
    pub fn find(
        &self,
        identity: &NodeIdentity,
        options: LookupOptions,
    ) -> Result<Option<Arc<NodeEntry>>> {
        let Some(entry) = self.lookup(identity) else {
            if options.allow_missing {
                return Ok(None);
            }
            return Err(MonitorError::NoSuchNode(identity.to_string()).into());
        };
        if !options.allow_offline && !entry.item.lock().is_connected() {
            return Err(MonitorError::NodeOffline(identity.to_string()).into());
        }
        Ok(Some(entry))
    }

    pub fn lookup_by_host(
        &self,
        host_id: &str,
    ) -> Result<Vec<Arc<NodeEntry>>> {
        self.indexes
            .read()
            .by_host
            .get(host_id)
            .cloned()
            .ok_or_else(|| MonitorError::NoSuchHost(host_id.to_string()).into())
    }

    pub fn host_of(
        &self,
        id: &NodeId,
    ) -> Option<String> {
        self.indexes.read().host_of.get(id).cloned()
    }

    /// Moves a node to `host_id`
    pub fn set_host(
        &self,
        entry: &Arc<NodeEntry>,
        host_id: &str,
    ) {
        let mut indexes = self.indexes.write();
        if indexes.by_id.contains_key(&entry.id) {
            indexes.attach_host(entry, host_id);
        }
    }

    /// Moves every node grouped under `from` to `to`; returns the moved entries
    pub fn rehost(
        &self,
        from: &str,
        to: &str,
    ) -> Vec<Arc<NodeEntry>> {
        let mut indexes = self.indexes.write();
        let members = indexes.by_host.remove(from).unwrap_or_default();
        for entry in &members {
            indexes.host_of.remove(&entry.id);
            indexes.attach_host(entry, to);
        }
        members
    }

    /// Renames a node to `desired`, or to `desired-N` with the smallest free
    /// suffix. Returns the name the node now holds.
    pub fn rename(
        &self,
        entry: &Arc<NodeEntry>,
        desired: &str,
    ) -> String {
        let mut indexes = self.indexes.write();
        let current = indexes.name_of.get(&entry.id).cloned();
        if current.as_deref() == Some(desired) {
            return desired.to_string();
        }

        let mut candidate = desired.to_string();
        let mut suffix = 1;
        while indexes.by_name.get(&candidate).is_some_and(|owner| owner.id != entry.id) {
            candidate = format!("{desired}-{suffix}");
            suffix += 1;
        }

        if let Some(old) = current {
            indexes.by_name.remove(&old);
        }
        indexes.by_name.insert(candidate.clone(), entry.clone());
        indexes.name_of.insert(entry.id.clone(), candidate.clone());
        candidate
    }

    /// Removes the node from every index and from the dirty set
    pub fn remove(
        &self,
        id: &NodeId,
    ) -> Option<Arc<NodeEntry>> {
        let mut indexes = self.indexes.write();
        let entry = indexes.by_id.remove(id)?;
        indexes.by_peer.remove(&entry.peer_id);
        if let Some(name) = indexes.name_of.remove(id) {
            indexes.by_name.remove(&name);
        }
        indexes.detach_host(id);
        indexes.dirty.remove(id);
        Some(entry)
    }

    pub fn clear(&self) {
        *self.indexes.write() = Indexes::default();
    }

    pub fn len(&self) -> usize {
        self.indexes.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, in no particular order
    pub fn snapshot(&self) -> Vec<Arc<NodeEntry>> {
        self.indexes.read().by_id.values().cloned().collect()
    }

    /// Host groups, in no particular order
    pub fn hosts(&self) -> Vec<(String, Vec<Arc<NodeEntry>>)> {
        self.indexes
            .read()
            .by_host
            .iter()
            .map(|(host, members)| (host.clone(), members.clone()))
            .collect()
    }

    pub fn mark_dirty(
        &self,
        id: &NodeId,
    ) {
        let mut indexes = self.indexes.write();
        if indexes.by_id.contains_key(id) {
            indexes.dirty.insert(id.clone());
        }
    }

    pub fn is_dirty(
        &self,
        id: &NodeId,
    ) -> bool {
        self.indexes.read().dirty.contains(id)
    }

    pub fn dirty_len(&self) -> usize {
        self.indexes.read().dirty.len()
    }

    /// Empties the dirty set and resolves it to live entries
    pub fn take_dirty(&self) -> Vec<Arc<NodeEntry>> {
        let mut indexes = self.indexes.write();
        let dirty = std::mem::take(&mut indexes.dirty);
        dirty
            .iter()
            .filter_map(|id| indexes.by_id.get(id).cloned())
            .collect()
    }
}
