//! Data activity: the staged rebuild/wipe workflow attached to nodes in a
//! lifecycle transition, and the worker pool that drives its batches.
//!
//! Stages run `OFFLINE_GRACE? -> REBUILDING -> WIPING -> done`. The machine
//! itself is synchronous and runs under the item lock; batches run on the
//! rebuild workers against the external [`RebuildService`].

mod data_activity;
mod scheduler;

pub use data_activity::*;
pub use scheduler::*;

#[cfg(test)]
mod data_activity_test;

use async_trait::async_trait;

use crate::NodeId;
use crate::Result;

/// External chunk rebuild collaborator.
///
/// Iterates the node's owned data in stable batches. A `None` marker starts
/// from the beginning; the returned marker resumes the scan.
#[async_trait]
pub trait RebuildService: Send + Sync + 'static {
    async fn plan_and_rebuild(
        &self,
        node_id: NodeId,
        stage: ActivityStage,
        marker: Option<RebuildMarker>,
        batch_size: usize,
    ) -> Result<RebuildBatch>;
}
