use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use arc_swap::ArcSwap;
use autometrics::autometrics;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::activity::update_data_activity;
use crate::consolidate_host;
use crate::node_storage_info;
use crate::utils::async_task::task_with_timeout_and_exponential_backoff;
use crate::utils::time::now_ms;
use crate::ActivityContext;
use crate::ConnectionManager;
use crate::Error;
use crate::EventSink;
use crate::FlushReport;
use crate::HostEntry;
use crate::LookupOptions;
use crate::MonitorConfig;
use crate::MonitorError;
use crate::NodeEntry;
use crate::NodeEvent;
use crate::NodeEventKind;
use crate::NodeFilter;
use crate::NodeIdentity;
use crate::NodeInfo;
use crate::NodeItem;
use crate::NodeRegistry;
use crate::NodeRole;
use crate::NodeStore;
use crate::PersistenceBatcher;
use crate::PoolAdvisor;
use crate::ProcessLifecycle;
use crate::RebuildScheduler;
use crate::RebuildService;
use crate::Result;
use crate::ScanLoop;
use crate::ScheduleDecision;
use crate::StatusEngine;
use crate::SystemCatalog;
use crate::TaskScheduler;
use crate::API_SLO;

/// How long `stop()` waits for in-flight background work
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Collaborators a monitor is wired to
pub struct MonitorDeps {
    pub store: Arc<dyn NodeStore>,
    pub catalog: Arc<dyn SystemCatalog>,
    pub rebuild: Arc<dyn RebuildService>,
    pub lifecycle: Arc<dyn ProcessLifecycle>,
    pub advisor: Arc<dyn PoolAdvisor>,
    pub events: Arc<dyn EventSink>,
}

/// The nodes monitor service object.
///
/// Owns the registry and every background task of one run. Item state is
/// mutated under the per-item lock only; no item lock is ever held across an
/// await point.
pub struct NodesMonitor {
    pub(super) me: Weak<NodesMonitor>,
    pub(super) config: MonitorConfig,
    pub(super) store: Arc<dyn NodeStore>,
    pub(super) catalog: Arc<dyn SystemCatalog>,
    pub(super) rebuild_service: Arc<dyn RebuildService>,
    pub(super) advisor: Arc<dyn PoolAdvisor>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) registry: NodeRegistry,
    pub(super) connections: ConnectionManager,
    pub(super) status: StatusEngine,
    pub(super) rebuild: Arc<RebuildScheduler>,
    pub(super) persistence: PersistenceBatcher,
    pub(super) scan: Arc<ScanLoop>,
    /// Replaced on every start; the previous run's tasks are shut down
    pub(super) tasks: ArcSwap<TaskScheduler>,
    started: AtomicBool,
    loaded: AtomicBool,
    /// Serializes start and stop
    lifecycle_lock: tokio::sync::Mutex<()>,
}

impl NodesMonitor {
    pub fn new(
        config: MonitorConfig,
        deps: MonitorDeps,
    ) -> Arc<Self> {
        let persistence = PersistenceBatcher::new(
            config.persistence.clone(),
            deps.store.clone(),
            deps.catalog.clone(),
            deps.lifecycle,
            config.agents.response_timeout(),
        );
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            status: StatusEngine::new(&config),
            rebuild: Arc::new(RebuildScheduler::new(config.rebuild.clone())),
            scan: Arc::new(ScanLoop::new(config.scan.clone())),
            store: deps.store,
            catalog: deps.catalog,
            rebuild_service: deps.rebuild,
            advisor: deps.advisor,
            events: deps.events,
            registry: NodeRegistry::new(),
            connections: ConnectionManager::new(),
            persistence,
            tasks: ArcSwap::from_pointee(TaskScheduler::new()),
            started: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            lifecycle_lock: tokio::sync::Mutex::new(()),
            config,
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Number of nodes in the registry
    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Completed scan passes since construction
    pub fn scan_passes(&self) -> u64 {
        self.scan.passes()
    }

    pub(super) fn tasks(&self) -> Arc<TaskScheduler> {
        self.tasks.load_full()
    }

    pub(super) fn handle(&self) -> Result<Arc<NodesMonitor>> {
        self.me
            .upgrade()
            .ok_or_else(|| Error::Fatal("nodes monitor already dropped".into()))
    }

    /// Loads the nodes of this system, then arms the scan loop and starts the
    /// rebuild workers. Calling it on a started monitor does nothing.
    #[autometrics(objective = API_SLO)]
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle_lock.lock().await;
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("nodes monitor already started");
            return Ok(());
        }
        info!("starting nodes monitor");
        let this = self.handle()?;
        let tasks = Arc::new(TaskScheduler::new());
        self.tasks.store(tasks.clone());

        let loaded = match self.load_from_store().await {
            Ok(loaded) => loaded,
            Err(e) => {
                error!(?e, "loading nodes failed, monitor not started");
                tasks.shutdown(SHUTDOWN_GRACE).await;
                self.clear();
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.loaded.store(true, Ordering::SeqCst);

        let workers = self.rebuild.start_workers(&tasks, this.clone());
        self.scan.schedule(
            &tasks,
            this,
            Duration::from_millis(self.config.scan.initial_delay_ms),
        );
        info!(nodes = loaded, workers, "nodes monitor started");
        Ok(())
    }

    async fn load_from_store(&self) -> Result<usize> {
        let filter = NodeFilter {
            system: Some(self.catalog.system_id()),
            include_deleted: false,
        };
        let store = self.store.clone();
        let records = task_with_timeout_and_exponential_backoff(
            "load_nodes",
            || store.find_nodes(filter.clone()),
            self.config.retry.store_load,
        )
        .await?;

        let count = records.len();
        for record in records {
            self.registry.add_existing(NodeItem::persisted(record))?;
        }
        for entry in self.registry.snapshot() {
            self.refresh_entry(&entry);
        }
        debug!(nodes = count, "nodes loaded from store");
        Ok(count)
    }

    /// Stops all background work, closes every connection and drops the
    /// in-memory state. In-flight remote calls are left to finish.
    #[autometrics(objective = API_SLO)]
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle_lock.lock().await;
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("stopping nodes monitor");
        self.scan.cancel();
        for entry in self.registry.snapshot() {
            self.connections.detach(&mut entry.item.lock());
        }
        self.tasks().shutdown(SHUTDOWN_GRACE).await;
        self.clear();
        info!("nodes monitor stopped");
    }

    fn clear(&self) {
        self.loaded.store(false, Ordering::SeqCst);
        self.registry.clear();
        self.connections.clear();
        self.rebuild.clear();
    }

    pub(super) fn ensure_ready(&self) -> Result<()> {
        if !self.is_started() {
            return Err(MonitorError::NotStarted.into());
        }
        if !self.is_loaded() {
            return Err(MonitorError::NotLoaded.into());
        }
        Ok(())
    }

    pub(super) fn find_entry(
        &self,
        identity: &NodeIdentity,
        options: LookupOptions,
    ) -> Result<Arc<NodeEntry>> {
        self.registry
            .find(identity, options)?
            .ok_or_else(|| MonitorError::NoSuchNode(identity.to_string()).into())
    }

    pub(super) fn event(
        &self,
        kind: NodeEventKind,
        item: &NodeItem,
    ) -> NodeEvent {
        NodeEvent::new(kind, self.catalog.system_id()).node(&item.node.id, &item.node.name)
    }

    pub(super) fn dispatch(
        &self,
        event: Option<NodeEvent>,
    ) {
        if let Some(event) = event {
            self.events.dispatch(event);
        }
    }

    /// Recomputes status and advances the data activity under the caller's
    /// item lock. Closes a stale connection and steers the rebuild queue.
    /// Returns the connect/disconnect event to dispatch once the lock is
    /// released.
    pub(super) fn refresh_item(
        &self,
        item: &mut NodeItem,
        now: u64,
    ) -> Option<NodeEvent> {
        let outcome = self.status.recompute(item, now);
        if outcome.stale_connection {
            self.connections.detach(item);
            self.registry.mark_dirty(&item.node.id);
            self.status.recompute(item, now);
        }

        let ctx = ActivityContext {
            now,
            offline_grace_ms: self.config.rebuild.offline_grace_ms,
            maintenance: self.catalog.in_maintenance(),
        };
        let update = update_data_activity(item, &ctx);
        match update.decision {
            ScheduleDecision::Remove => self.rebuild.remove(&item.node.id),
            ScheduleDecision::EnqueueAfterDelay => {
                self.rebuild.enqueue_after_delay(&self.tasks(), item.node.id.clone())
            }
            ScheduleDecision::Keep => {}
        }
        if update.dirty {
            self.registry.mark_dirty(&item.node.id);
        }

        if !outcome.online_changed || item.node.role != NodeRole::Storage {
            return None;
        }
        let event = if item.status.online {
            self.event(NodeEventKind::Connected, item)
                .description(format!("{} is connected", item.node.name))
        } else {
            self.event(NodeEventKind::Disconnected, item)
                .description(format!("{} is disconnected", item.node.name))
        };
        Some(event)
    }

    pub(super) fn refresh_entry(
        &self,
        entry: &NodeEntry,
    ) {
        let event = {
            let mut item = entry.item.lock();
            self.refresh_item(&mut item, now_ms())
        };
        self.dispatch(event);
    }

    /// Refreshes the entry and returns a copy of the item
    pub(super) fn refreshed_item(
        &self,
        entry: &NodeEntry,
        now: u64,
    ) -> NodeItem {
        let (item, event) = {
            let mut item = entry.item.lock();
            let event = self.refresh_item(&mut item, now);
            (item.clone(), event)
        };
        self.dispatch(event);
        item
    }

    pub(super) fn refreshed_items(&self) -> Vec<NodeItem> {
        let now = now_ms();
        self.registry
            .snapshot()
            .iter()
            .map(|entry| self.refreshed_item(entry, now))
            .collect()
    }

    /// Refreshed copies of the stored items only. A pending node stays out
    /// of listings and aggregates until its first write.
    pub(super) fn refreshed_stored_items(&self) -> Vec<NodeItem> {
        self.refreshed_items()
            .into_iter()
            .filter(|item| item.is_persisted())
            .collect()
    }

    pub(super) fn host_entry(
        &self,
        host_id: &str,
        entries: &[Arc<NodeEntry>],
        now: u64,
    ) -> Option<HostEntry> {
        let nodes: Vec<NodeItem> = entries
            .iter()
            .map(|entry| self.refreshed_item(entry, now))
            .filter(|item| item.is_persisted())
            .collect();
        let status = consolidate_host(host_id, &nodes, self.status.capacity())?;
        let root = nodes.iter().find(|item| item.node.id == status.root)?.clone();
        Some(HostEntry { status, root, nodes })
    }

    pub(super) fn host_entries(&self) -> Vec<HostEntry> {
        let now = now_ms();
        self.registry
            .hosts()
            .iter()
            .filter_map(|(host_id, entries)| self.host_entry(host_id, entries, now))
            .collect()
    }

    pub(super) fn node_info(
        &self,
        item: &NodeItem,
    ) -> NodeInfo {
        let storage = node_storage_info(&item.node, item.status.has_issues, self.status.capacity());
        NodeInfo::from_item(item, storage)
    }

    /// Flushes the dirty set and follows up on what the flush reports:
    /// deleted and discarded nodes leave the registry, created nodes are
    /// announced.
    pub(super) async fn flush(
        &self,
        force: bool,
    ) -> FlushReport {
        let report = self.persistence.flush(&self.registry, force).await;

        for id in report.discarded.iter().chain(&report.deleted) {
            let Some(entry) = self.registry.remove(id) else {
                continue;
            };
            self.rebuild.remove(id);
            let event = {
                let mut item = entry.item.lock();
                self.connections.detach(&mut item);
                item.node.deleted.is_some().then(|| {
                    self.event(NodeEventKind::Deleted, &item)
                        .description(format!("{} was deleted", item.node.name))
                })
            };
            debug!(node_id = %id, "node removed from registry");
            self.dispatch(event);
        }

        for id in &report.created {
            let Some(entry) = self.registry.get(id) else {
                warn!(node_id = %id, "created node no longer registered");
                continue;
            };
            let (created, connected) = {
                let mut item = entry.item.lock();
                let created = (!item.node.hosting.is_ephemeral()).then(|| {
                    self.event(NodeEventKind::Created, &item)
                        .description(format!("{} was added", item.node.name))
                });
                (created, self.refresh_item(&mut item, now_ms()))
            };
            self.dispatch(created);
            self.dispatch(connected);
        }
        report
    }
}
