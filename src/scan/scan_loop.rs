use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::metrics::SCAN_DURATION_METRIC;
use crate::metrics::SCAN_PASS_COUNTER;
use crate::NodeId;
use crate::ScanConfig;
use crate::TaskScheduler;
use crate::TimerHandle;

/// The work a scan drives
#[async_trait]
pub trait ScanRunner: Send + Sync + 'static {
    /// One full pass over the registry
    async fn run_pass(&self);

    /// Re-validates a single node outside the periodic pass
    async fn run_node(
        &self,
        node_id: NodeId,
    );
}

struct NextRun {
    deadline: Instant,
    handle: TimerHandle,
}

/// Periodic scan ticker.
///
/// Passes are serialized: a forced pass waits for the one in flight. Only one
/// future pass is armed at a time and the earliest requested deadline wins.
pub struct ScanLoop {
    config: ScanConfig,
    pass_lock: tokio::sync::Mutex<()>,
    next_run: Mutex<Option<NextRun>>,
    passes: AtomicU64,
}

impl ScanLoop {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            pass_lock: tokio::sync::Mutex::new(()),
            next_run: Mutex::new(None),
            passes: AtomicU64::new(0),
        }
    }

    /// Arms a pass after `delay`, capped at the scan period.
    ///
    /// Returns false when an earlier pass is already armed or the scheduler
    /// is stopped.
    pub fn schedule(
        self: &Arc<Self>,
        tasks: &Arc<TaskScheduler>,
        runner: Arc<dyn ScanRunner>,
        delay: Duration,
    ) -> bool {
        let delay = delay.min(self.config.period());
        let deadline = Instant::now() + delay;

        let mut next = self.next_run.lock();
        if let Some(current) = next.as_ref() {
            if !current.handle.is_cancelled() && current.deadline <= deadline {
                trace!("earlier scan already armed");
                return false;
            }
            current.handle.cancel();
        }

        let this = self.clone();
        let scheduler = tasks.clone();
        let handle = tasks.spawn_after("scan_pass", delay, async move {
            this.run_scheduled(scheduler, runner).await;
        });
        let armed = handle.is_some();
        *next = handle.map(|handle| NextRun { deadline, handle });
        if armed {
            debug!(delay_ms = delay.as_millis() as u64, "scan pass armed");
        }
        armed
    }

    async fn run_scheduled(
        self: Arc<Self>,
        tasks: Arc<TaskScheduler>,
        runner: Arc<dyn ScanRunner>,
    ) {
        self.next_run.lock().take();
        self.run_now(runner.as_ref()).await;
        if !tasks.is_stopped() {
            self.schedule(&tasks, runner, self.config.period());
        }
    }

    /// Runs a pass now, after any pass already in flight
    pub async fn run_now(
        &self,
        runner: &dyn ScanRunner,
    ) {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();
        runner.run_pass().await;
        let elapsed = started.elapsed();

        SCAN_PASS_COUNTER.inc();
        SCAN_DURATION_METRIC.observe(elapsed.as_millis() as f64);
        let passes = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(passes, elapsed_ms = elapsed.as_millis() as u64, "scan pass finished");
    }

    /// Re-checks one node after the short recheck delay, giving the
    /// heartbeat reply time to land first
    pub fn schedule_node(
        &self,
        tasks: &TaskScheduler,
        runner: Arc<dyn ScanRunner>,
        node_id: NodeId,
    ) -> bool {
        let delay = Duration::from_millis(self.config.node_recheck_delay_ms);
        tasks
            .spawn_after("node_recheck", delay, async move {
                runner.run_node(node_id).await;
            })
            .is_some()
    }

    pub fn cancel(&self) {
        if let Some(current) = self.next_run.lock().take() {
            current.handle.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.next_run
            .lock()
            .as_ref()
            .is_some_and(|next| !next.handle.is_cancelled())
    }

    /// Completed passes since construction
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }
}
