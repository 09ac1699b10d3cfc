use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use tracing::trace;

use crate::NodeId;
use crate::RebuildConfig;
use crate::TaskScheduler;

/// Runs one rebuild or wipe batch for a node taken off the queue
#[async_trait]
pub trait RebuildWorker: Send + Sync + 'static {
    async fn rebuild_node(
        &self,
        node_id: NodeId,
    );
}

#[derive(Default)]
struct RebuildQueue {
    order: VecDeque<NodeId>,
    members: HashSet<NodeId>,
    /// Nodes with an armed delayed enqueue
    delayed: HashSet<NodeId>,
}

/// The "needs rebuild" work set and its worker pool.
///
/// Holds node ids only; workers resolve them through the registry.
pub struct RebuildScheduler {
    config: RebuildConfig,
    queue: Mutex<RebuildQueue>,
    notify: Notify,
}

impl RebuildScheduler {
    pub fn new(config: RebuildConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(RebuildQueue::default()),
            notify: Notify::new(),
        }
    }

    /// Adds `node_id` unless it is already queued
    pub fn enqueue(
        &self,
        node_id: NodeId,
    ) -> bool {
        let mut queue = self.queue.lock();
        queue.delayed.remove(&node_id);
        if !queue.members.insert(node_id.clone()) {
            return false;
        }
        trace!(%node_id, "queued for rebuild");
        queue.order.push_back(node_id);
        drop(queue);
        self.notify.notify_one();
        true
    }

    /// Queues `node_id` after the batch delay. A node already queued or
    /// waiting on its delay is left alone.
    pub fn enqueue_after_delay(
        self: &Arc<Self>,
        tasks: &TaskScheduler,
        node_id: NodeId,
    ) {
        {
            let mut queue = self.queue.lock();
            if queue.members.contains(&node_id) || !queue.delayed.insert(node_id.clone()) {
                return;
            }
        }
        let this = self.clone();
        let id = node_id.clone();
        let armed = tasks.spawn_after("rebuild_enqueue", self.config.batch_delay(), async move {
            let pending = this.queue.lock().delayed.remove(&id);
            if pending {
                this.enqueue(id);
            }
        });
        if armed.is_none() {
            self.queue.lock().delayed.remove(&node_id);
        }
    }

    /// Drops the node from the queue and disarms its delayed enqueue
    pub fn remove(
        &self,
        node_id: &NodeId,
    ) {
        let mut queue = self.queue.lock();
        queue.delayed.remove(node_id);
        if queue.members.remove(node_id) {
            queue.order.retain(|id| id != node_id);
        }
    }

    pub fn contains(
        &self,
        node_id: &NodeId,
    ) -> bool {
        let queue = self.queue.lock();
        queue.members.contains(node_id) || queue.delayed.contains(node_id)
    }

    pub fn len(&self) -> usize {
        self.queue.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        *self.queue.lock() = RebuildQueue::default();
    }

    fn pop(&self) -> Option<NodeId> {
        let mut queue = self.queue.lock();
        let node_id = queue.order.pop_front()?;
        queue.members.remove(&node_id);
        Some(node_id)
    }

    async fn next(&self) -> NodeId {
        loop {
            if let Some(node_id) = self.pop() {
                return node_id;
            }
            self.notify.notified().await;
        }
    }

    /// Spawns the configured number of workers; each drains the queue until
    /// the scheduler stops. Returns the number of workers started.
    pub fn start_workers(
        self: &Arc<Self>,
        tasks: &TaskScheduler,
        worker: Arc<dyn RebuildWorker>,
    ) -> usize {
        if !self.config.enabled {
            debug!("rebuild disabled, no workers started");
            return 0;
        }
        let mut started = 0;
        for index in 0..self.config.concurrency {
            let this = self.clone();
            let worker = worker.clone();
            let token = tasks.token();
            let spawned = tasks.spawn("rebuild_worker", async move {
                loop {
                    let node_id = tokio::select! {
                        _ = token.cancelled() => {
                            debug!(worker = index, "rebuild worker stopped");
                            return;
                        }
                        node_id = this.next() => node_id,
                    };
                    if token.is_cancelled() {
                        return;
                    }
                    worker.rebuild_node(node_id).await;
                }
            });
            if spawned {
                started += 1;
            }
        }
        debug!(workers = started, "rebuild workers started");
        started
    }
}
