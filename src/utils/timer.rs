use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;
use tracing::warn;

/// Owns every background task and delayed job of one monitor run.
///
/// Cancellation is cooperative: the token stops pending delays and loop
/// continuations, while work that already started runs to completion.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

/// Handle to one delayed job
#[derive(Debug, Clone)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token observed by long-running loops
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawns a tracked task. Returns false once the scheduler is stopped.
    pub fn spawn<F>(
        &self,
        name: &'static str,
        task: F,
    ) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopped() {
            debug!(task = name, "scheduler stopped, task not spawned");
            return false;
        }
        self.tracker.spawn(task);
        true
    }

    /// Runs `task` after `delay` unless the handle or the scheduler is
    /// cancelled first.
    pub fn spawn_after<F>(
        &self,
        name: &'static str,
        delay: Duration,
        task: F,
    ) -> Option<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopped() {
            debug!(task = name, "scheduler stopped, timer not armed");
            return None;
        }
        let token = self.token.child_token();
        let handle = TimerHandle { token: token.clone() };
        self.tracker.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(task = name, "timer cancelled");
                }
                _ = sleep(delay) => {
                    if !token.is_cancelled() {
                        task.await;
                    }
                }
            }
        });
        Some(handle)
    }

    /// Cancels pending timers and waits up to `grace` for running tasks
    pub async fn shutdown(
        &self,
        grace: Duration,
    ) {
        self.token.cancel();
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                pending = self.tracker.len(),
                "background tasks still running after shutdown grace"
            );
        }
    }

    /// Number of tracked tasks still alive
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }
}
