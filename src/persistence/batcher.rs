use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use futures::stream;
use futures::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::BATCH_CREATE;
use crate::metrics::BATCH_DELETE;
use crate::metrics::BATCH_UPDATE;
use crate::metrics::STORE_WRITE_FAILURES;
use crate::utils::async_task::with_timeout;
use crate::utils::time::now_ms;
use crate::AgentConnection;
use crate::NodeEntry;
use crate::NodeHosting;
use crate::NodeId;
use crate::NodeRecord;
use crate::NodeRegistry;
use crate::NodeStore;
use crate::NodeWrite;
use crate::PersistenceConfig;
use crate::ProcessLifecycle;
use crate::SystemCatalog;

/// Name given to heartbeat-created nodes until the agent reports its own
pub const PLACEHOLDER_NAME_PREFIX: &str = "a-node-has-no-name-";

pub fn is_placeholder_name(name: &str) -> bool {
    name.starts_with(PLACEHOLDER_NAME_PREFIX)
}

/// What a flush did that the owner of the registry must follow up on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Inserted into the store; now Persisted
    pub created: Vec<NodeId>,
    /// Written with their deleted timestamp; to be dropped from the registry
    pub deleted: Vec<NodeId>,
    /// Pending nodes that lost their connection before creation
    pub discarded: Vec<NodeId>,
    pub updated: usize,
    /// Writes that failed and were marked dirty again
    pub retried: usize,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        *self == FlushReport::default()
    }
}

/// Coalesces dirty items into bulk store writes.
///
/// One flush runs at a time. The dirty set is taken before any write is
/// issued, so changes made during a flush land in the next one; failed
/// writes are marked dirty again rather than raised.
pub struct PersistenceBatcher {
    config: PersistenceConfig,
    store: Arc<dyn NodeStore>,
    catalog: Arc<dyn SystemCatalog>,
    lifecycle: Arc<dyn ProcessLifecycle>,
    rpc_timeout: Duration,
    flush_lock: tokio::sync::Mutex<()>,
}

impl PersistenceBatcher {
    pub fn new(
        config: PersistenceConfig,
        store: Arc<dyn NodeStore>,
        catalog: Arc<dyn SystemCatalog>,
        lifecycle: Arc<dyn ProcessLifecycle>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            config,
            store,
            catalog,
            lifecycle,
            rpc_timeout,
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Writes the dirty set. A non-forced flush leaves small sets to
    /// accumulate.
    pub async fn flush(
        &self,
        registry: &NodeRegistry,
        force: bool,
    ) -> FlushReport {
        let _flush = self.flush_lock.lock().await;

        let pending = registry.dirty_len();
        if pending == 0 || (!force && pending < self.config.min_batch_items) {
            trace!(pending, force, "flush skipped");
            return FlushReport::default();
        }

        let mut updates = Vec::new();
        let mut creations = Vec::new();
        let mut deletions = Vec::new();
        let mut report = FlushReport::default();
        for entry in registry.take_dirty() {
            let item = entry.item.lock();
            if item.ready_to_be_deleted || item.node.deleted.is_some() {
                if item.is_persisted() {
                    drop(item);
                    deletions.push(entry);
                } else {
                    report.discarded.push(entry.id.clone());
                }
            } else if item.is_persisted() {
                let record = item.node.clone();
                drop(item);
                updates.push((entry, record));
            } else {
                drop(item);
                creations.push(entry);
            }
        }
        debug!(
            updates = updates.len(),
            creations = creations.len(),
            deletions = deletions.len(),
            "flushing dirty nodes"
        );

        let (updated, created, deleted) = tokio::join!(
            self.update_existing(registry, updates),
            self.create_new(registry, creations),
            self.delete_ready(registry, deletions),
        );
        report.updated = updated.0;
        report.retried = updated.1 + created.retried + deleted.1;
        report.created = created.created;
        report.discarded.extend(created.discarded);
        report.deleted = deleted.0;
        report
    }

    /// Returns (written, retried)
    async fn update_existing(
        &self,
        registry: &NodeRegistry,
        updates: Vec<(Arc<NodeEntry>, NodeRecord)>,
    ) -> (usize, usize) {
        if updates.is_empty() {
            return (0, 0);
        }
        let written = self.write(registry, updates, NodeWrite::Update, BATCH_UPDATE).await;
        (written.ok.len(), written.retried)
    }

    async fn create_new(
        &self,
        registry: &NodeRegistry,
        creations: Vec<Arc<NodeEntry>>,
    ) -> Creations {
        let mut outcome = Creations::default();
        let mut ready: Vec<(Arc<NodeEntry>, Arc<dyn AgentConnection>)> = Vec::new();
        for entry in creations {
            let (connection, name) = {
                let item = entry.item.lock();
                (item.connection.clone(), item.node.name.clone())
            };
            match connection {
                None => {
                    debug!(node_id = %entry.id, "pending node lost its connection, discarding");
                    outcome.discarded.push(entry.id.clone());
                }
                Some(_) if is_placeholder_name(&name) => {
                    trace!(node_id = %entry.id, "pending node has no name yet");
                    registry.mark_dirty(&entry.id);
                }
                Some(connection) => ready.push((entry, connection)),
            }
        }
        if ready.is_empty() {
            return outcome;
        }

        let provisioning = ready.len();
        let provisioned: Vec<Arc<NodeEntry>> = stream::iter(ready)
            .map(|(entry, connection)| async move {
                let token = self.catalog.issue_auth_token(&entry.id);
                match with_timeout("update_auth_token", self.rpc_timeout, connection.update_auth_token(token)).await {
                    Ok(()) => Some(entry),
                    Err(e) => {
                        warn!(node_id = %entry.id, ?e, "auth token provisioning failed, node creation deferred");
                        registry.mark_dirty(&entry.id);
                        None
                    }
                }
            })
            .buffer_unordered(self.config.create_concurrency.max(1))
            .filter_map(future::ready)
            .boxed()
            .collect()
            .await;
        outcome.retried = provisioning - provisioned.len();

        let inserts = provisioned
            .into_iter()
            .map(|entry| {
                let record = entry.item.lock().node.clone();
                (entry, record)
            })
            .collect::<Vec<_>>();
        if inserts.is_empty() {
            return outcome;
        }
        let written = self.write(registry, inserts, NodeWrite::Insert, BATCH_CREATE).await;
        for id in &written.ok {
            info!(node_id = %id, "node created");
        }
        outcome.created = written.ok;
        outcome.retried += written.retried;
        outcome
    }

    /// Returns (deleted, retried)
    async fn delete_ready(
        &self,
        registry: &NodeRegistry,
        deletions: Vec<Arc<NodeEntry>>,
    ) -> (Vec<NodeId>, usize) {
        let mut writes = Vec::new();
        let mut durable = Vec::new();
        let mut retried = 0;
        for entry in deletions {
            let (hosting, name, deleted) = {
                let item = entry.item.lock();
                (item.node.hosting, item.node.name.clone(), item.node.deleted)
            };
            if deleted.is_none() {
                match hosting {
                    NodeHosting::Agent => {}
                    NodeHosting::Cloud | NodeHosting::PoolBacked => {
                        if let Err(e) = self.lifecycle.remove_agent_process(name.clone()).await {
                            warn!(node_id = %entry.id, ?e, "agent process teardown failed");
                            registry.mark_dirty(&entry.id);
                            retried += 1;
                            continue;
                        }
                    }
                    NodeHosting::Internal => {
                        warn!(node_id = %entry.id, "deleting internal nodes is not supported");
                        registry.mark_dirty(&entry.id);
                        continue;
                    }
                }
            }
            let record = {
                let mut item = entry.item.lock();
                if item.node.deleted.is_none() {
                    item.node.deleted = Some(now_ms());
                }
                if item.stored().is_some_and(|stored| stored.deleted.is_some()) {
                    None
                } else {
                    Some(item.node.clone())
                }
            };
            match record {
                Some(record) => writes.push((entry, record)),
                None => durable.push(entry.id.clone()),
            }
        }
        if writes.is_empty() {
            return (durable, retried);
        }
        let written = self.write(registry, writes, NodeWrite::Update, BATCH_DELETE).await;
        for id in &written.ok {
            info!(node_id = %id, "node deleted");
        }
        durable.extend(written.ok);
        (durable, retried + written.retried)
    }

    async fn write(
        &self,
        registry: &NodeRegistry,
        batch: Vec<(Arc<NodeEntry>, NodeRecord)>,
        make: fn(NodeRecord) -> NodeWrite,
        kind: &'static str,
    ) -> Written {
        let writes = batch.iter().map(|(_, record)| make(record.clone())).collect();
        let mut pending: HashMap<NodeId, (Arc<NodeEntry>, NodeRecord)> = batch
            .into_iter()
            .map(|(entry, record)| (entry.id.clone(), (entry, record)))
            .collect();

        let outcome = match self.store.bulk_update(writes).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(batch = kind, ?e, "store bulk update failed");
                STORE_WRITE_FAILURES
                    .with_label_values(&[kind])
                    .inc_by(pending.len() as u64);
                for id in pending.keys() {
                    registry.mark_dirty(id);
                }
                return Written {
                    ok: Vec::new(),
                    retried: pending.len(),
                };
            }
        };

        let mut written = Written::default();
        for id in outcome.updated {
            if let Some((entry, record)) = pending.remove(&id) {
                entry.item.lock().mark_persisted(record);
                written.ok.push(id);
            }
        }
        if !outcome.failed.is_empty() {
            warn!(batch = kind, failed = outcome.failed.len(), "store rejected node writes");
            STORE_WRITE_FAILURES
                .with_label_values(&[kind])
                .inc_by(outcome.failed.len() as u64);
        }
        // Anything the store did not acknowledge is retried
        for id in pending.keys() {
            registry.mark_dirty(id);
            written.retried += 1;
        }
        written
    }
}

#[derive(Default)]
struct Written {
    ok: Vec<NodeId>,
    retried: usize,
}

#[derive(Default)]
struct Creations {
    created: Vec<NodeId>,
    discarded: Vec<NodeId>,
    retried: usize,
}
