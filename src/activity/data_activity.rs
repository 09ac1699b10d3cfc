use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::NodeItem;

/// Why a node's data is being moved. Variants are declared in priority
/// order, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityReason {
    Deleting,
    Decommissioning,
    Migrating,
    Restoring,
}

impl ActivityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityReason::Deleting => "DELETING",
            ActivityReason::Decommissioning => "DECOMMISSIONING",
            ActivityReason::Migrating => "MIGRATING",
            ActivityReason::Restoring => "RESTORING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStage {
    /// Waiting for an offline or detained node to come back before rebuilding
    OfflineGrace,
    /// Re-replicating the node's chunks elsewhere
    Rebuilding,
    /// Erasing the node's local data
    Wiping,
}

impl ActivityStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityStage::OfflineGrace => "OFFLINE_GRACE",
            ActivityStage::Rebuilding => "REBUILDING",
            ActivityStage::Wiping => "WIPING",
        }
    }
}

/// Why a stage that has work left is not being scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WaitReason {
    SystemMaintenance,
    NodeOffline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: u64,
    /// Unknown until an estimate exists
    pub end: Option<u64>,
}

impl TimeWindow {
    /// Elapsed fraction of the window in [0, 1]; 0 without an end estimate
    pub fn progress(
        &self,
        now: u64,
    ) -> f64 {
        let Some(end) = self.end else {
            return 0.0;
        };
        if end <= self.start {
            return if now >= end { 1.0 } else { 0.0 };
        }
        let elapsed = now.saturating_sub(self.start) as f64;
        (elapsed / (end - self.start) as f64).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeProgress {
    pub total: u64,
    pub remaining: u64,
    pub completed: u64,
}

/// Opaque resume point handed back by the rebuild collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RebuildMarker(String);

impl RebuildMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of one rebuild or wipe batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildBatch {
    /// `None` once the scan over the node's chunks is complete
    pub next_marker: Option<RebuildMarker>,
    pub bytes_processed: u64,
    /// Chunks in the batch that could not be processed
    pub failed_chunks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub stage: ActivityStage,
    pub time: TimeWindow,
    /// Byte accounting; absent for the grace stage
    pub size: Option<SizeProgress>,
    pub marker: Option<RebuildMarker>,
    pub done: bool,
    /// Time of the first failure since the last clean pass
    pub rebuild_error: Option<u64>,
    /// Where the pass restarts once the scan reaches its end after a failure
    pub error_marker: Option<RebuildMarker>,
    pub error_completed: u64,
    pub wait_reason: Option<WaitReason>,
}

impl StageState {
    fn grace(
        start: u64,
        end: u64,
    ) -> Self {
        Self::new(
            ActivityStage::OfflineGrace,
            TimeWindow {
                start,
                end: Some(end),
            },
            None,
        )
    }

    fn batched(
        stage: ActivityStage,
        now: u64,
        used: u64,
    ) -> Self {
        Self::new(
            stage,
            TimeWindow {
                start: now,
                end: None,
            },
            Some(SizeProgress {
                total: used,
                remaining: used,
                completed: 0,
            }),
        )
    }

    fn new(
        stage: ActivityStage,
        time: TimeWindow,
        size: Option<SizeProgress>,
    ) -> Self {
        Self {
            stage,
            time,
            size,
            marker: None,
            done: false,
            rebuild_error: None,
            error_marker: None,
            error_completed: 0,
            wait_reason: None,
        }
    }

    fn completed(&self) -> u64 {
        self.size.map(|s| s.completed).unwrap_or_default()
    }

    fn record_error(
        &mut self,
        start_marker: Option<RebuildMarker>,
        completed_before: u64,
        now: u64,
    ) {
        if self.rebuild_error.is_none() {
            self.rebuild_error = Some(now);
            self.error_marker = start_marker;
            self.error_completed = completed_before;
        }
    }
}

/// Staged data movement attached to a node during a lifecycle transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataActivity {
    pub reason: ActivityReason,
    pub stage: StageState,
    pub time: TimeWindow,
    /// Fraction in [0, 1], estimated from elapsed time
    pub progress: f64,
    pub done: bool,
    /// A batch is in flight for this node
    pub running: bool,
}

impl DataActivity {
    /// Folds a batch outcome into the current stage. `start_marker` is the
    /// marker the batch was started from.
    pub fn apply_batch(
        &mut self,
        start_marker: Option<RebuildMarker>,
        outcome: Result<RebuildBatch, String>,
        now: u64,
    ) {
        let stage = &mut self.stage;
        let completed_before = stage.completed();
        match outcome {
            Err(error) => {
                warn!(stage = stage.stage.as_str(), %error, "rebuild batch failed");
                stage.record_error(start_marker, completed_before, now);
            }
            Ok(batch) => {
                stage.marker = batch.next_marker;
                if batch.failed_chunks > 0 {
                    warn!(
                        stage = stage.stage.as_str(),
                        failed_chunks = batch.failed_chunks,
                        "rebuild batch had failures"
                    );
                    stage.record_error(start_marker, completed_before, now);
                } else if let Some(size) = stage.size.as_mut() {
                    size.completed = size.completed.saturating_add(batch.bytes_processed);
                }

                if stage.marker.is_none() {
                    if stage.rebuild_error.take().is_some() {
                        debug!(stage = stage.stage.as_str(), "pass had errors, restarting from error cursor");
                        stage.marker = stage.error_marker.take();
                        if let Some(size) = stage.size.as_mut() {
                            size.completed = stage.error_completed;
                        }
                        stage.error_completed = 0;
                    } else {
                        stage.done = true;
                    }
                }
            }
        }
    }
}

/// What the caller should do with the node's rebuild queue membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Take the node out of the rebuild queue
    Remove,
    /// Queue the next batch after the batch delay
    EnqueueAfterDelay,
    /// A batch is in flight; leave the queue alone
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityUpdate {
    pub decision: ScheduleDecision,
    /// The record changed and must be persisted
    pub dirty: bool,
}

/// Inputs of the activity machine besides the item
#[derive(Debug, Clone, Copy)]
pub struct ActivityContext {
    pub now: u64,
    pub offline_grace_ms: u64,
    pub maintenance: bool,
}

/// Highest-priority reason that currently holds, if any
pub fn activity_reason(item: &NodeItem) -> Option<ActivityReason> {
    let node = &item.node;
    if !item.is_persisted() || node.deleted.is_some() || node.is_gateway() {
        return None;
    }
    if node.deleting.is_some() {
        return Some(ActivityReason::Deleting);
    }
    if node.decommissioned.is_some() {
        return None;
    }
    if node.decommissioning.is_some() {
        return Some(ActivityReason::Decommissioning);
    }
    if node.migrating_to_pool.is_some() {
        return Some(ActivityReason::Migrating);
    }
    let status = &item.status;
    if !status.online || !status.trusted || status.io_detention.is_some() {
        return Some(ActivityReason::Restoring);
    }
    None
}

/// Advances the item's data activity. Runs after every status recompute.
pub fn update_data_activity(
    item: &mut NodeItem,
    ctx: &ActivityContext,
) -> ActivityUpdate {
    let mut dirty = false;

    // Gateways hold no data, deletion needs no wipe
    if item.is_persisted()
        && item.node.is_gateway()
        && item.node.deleting.is_some()
        && item.node.deleted.is_none()
        && !item.ready_to_be_deleted
    {
        info!(node_id = %item.node.id, "gateway node ready to be deleted");
        item.ready_to_be_deleted = true;
        dirty = true;
    }

    let Some(reason) = activity_reason(item) else {
        if item.data_activity.take().is_some() {
            debug!(node_id = %item.node.id, "data activity cleared");
            dirty = true;
        }
        return ActivityUpdate {
            decision: ScheduleDecision::Remove,
            dirty,
        };
    };

    dirty |= update_stage(item, reason, ctx);
    let online = item.status.online;
    let Some(act) = item.data_activity.as_mut() else {
        return ActivityUpdate {
            decision: ScheduleDecision::Remove,
            dirty,
        };
    };
    update_progress(act, ctx.now);

    let decision = if act.done {
        ScheduleDecision::Remove
    } else if ctx.maintenance {
        act.stage.wait_reason = Some(WaitReason::SystemMaintenance);
        ScheduleDecision::Remove
    } else {
        match act.stage.stage {
            ActivityStage::OfflineGrace => ScheduleDecision::Remove,
            ActivityStage::Wiping if !online => {
                act.stage.wait_reason = Some(WaitReason::NodeOffline);
                ScheduleDecision::Remove
            }
            _ if act.running => {
                act.stage.wait_reason = None;
                ScheduleDecision::Keep
            }
            _ => {
                act.stage.wait_reason = None;
                ScheduleDecision::EnqueueAfterDelay
            }
        }
    };
    ActivityUpdate { decision, dirty }
}

/// Returns true when a terminal effect changed the record
fn update_stage(
    item: &mut NodeItem,
    reason: ActivityReason,
    ctx: &ActivityContext,
) -> bool {
    let now = ctx.now;
    let start_of_grace = item.status.io_detention.unwrap_or(item.node.heartbeat);
    let end_of_grace = start_of_grace.saturating_add(ctx.offline_grace_ms);
    let in_grace = reason == ActivityReason::Restoring && now < end_of_grace;
    let used = item.node.storage.used;
    let node_id = item.node.id.clone();

    let Some(act) = item.data_activity.as_mut() else {
        let stage = if in_grace {
            StageState::grace(start_of_grace, end_of_grace)
        } else {
            StageState::batched(ActivityStage::Rebuilding, now, used)
        };
        info!(
            %node_id,
            reason = reason.as_str(),
            stage = stage.stage.as_str(),
            "data activity started"
        );
        item.data_activity = Some(DataActivity {
            reason,
            stage,
            time: TimeWindow { start: now, end: None },
            progress: 0.0,
            done: false,
            running: false,
        });
        return false;
    };

    if act.reason != reason {
        info!(%node_id, from = act.reason.as_str(), to = reason.as_str(), "data activity reason changed");
        act.reason = reason;
    }
    if act.done {
        return false;
    }

    if in_grace {
        act.stage = StageState::grace(start_of_grace, end_of_grace);
        return false;
    }
    if act.stage.stage == ActivityStage::OfflineGrace {
        info!(%node_id, "offline grace passed, start rebuilding");
        act.stage = StageState::batched(ActivityStage::Rebuilding, now, used);
        return false;
    }
    if !act.stage.done {
        return false;
    }

    match act.stage.stage {
        ActivityStage::Rebuilding if reason == ActivityReason::Restoring => {
            info!(%node_id, "rebuild done, node restored");
            act.done = true;
            false
        }
        ActivityStage::Rebuilding => {
            info!(%node_id, reason = reason.as_str(), "rebuild done, start wiping");
            act.stage = StageState::batched(ActivityStage::Wiping, now, used);
            false
        }
        ActivityStage::Wiping => {
            info!(%node_id, reason = reason.as_str(), "wiping done");
            act.done = true;
            let node = &mut item.node;
            if node.migrating_to_pool.is_some() {
                node.migrating_to_pool = None;
            }
            if node.decommissioning.is_some() {
                node.decommissioned = Some(now);
            }
            if node.deleting.is_some() {
                item.ready_to_be_deleted = true;
            }
            true
        }
        ActivityStage::OfflineGrace => false,
    }
}

fn update_progress(
    act: &mut DataActivity,
    now: u64,
) {
    let stage = &mut act.stage;
    if let Some(size) = stage.size.as_mut() {
        size.remaining = size.total.saturating_sub(size.completed);
        if size.completed > 0 {
            let elapsed = now.saturating_sub(stage.time.start) as u128;
            let remaining_time = size.remaining as u128 * elapsed / size.completed as u128;
            stage.time.end = Some(now.saturating_add(remaining_time as u64));
        }
    }
    act.time.end = stage.time.end;
    act.progress = act.time.progress(now);
}
