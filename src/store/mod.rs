//! Durable node store collaborator.
//!
//! The store is eventually consistent at the granularity of one bulk call;
//! the persistence batcher retries whatever a call reports as failed.

mod mem_node_store;

pub use mem_node_store::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::NodeId;
use crate::NodeRecord;
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub system: Option<String>,
    pub include_deleted: bool,
}

/// One write of a bulk update, matched on the item's persistence state
#[derive(Debug, Clone, PartialEq)]
pub enum NodeWrite {
    Insert(NodeRecord),
    Update(NodeRecord),
}

impl NodeWrite {
    pub fn record(&self) -> &NodeRecord {
        match self {
            NodeWrite::Insert(record) | NodeWrite::Update(record) => record,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.record().id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub updated: Vec<NodeId>,
    pub failed: Vec<NodeId>,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeStore: Send + Sync + 'static {
    async fn find_nodes(
        &self,
        filter: NodeFilter,
    ) -> Result<Vec<NodeRecord>>;

    /// Applies the writes; per-record failures are reported, not raised
    async fn bulk_update(
        &self,
        writes: Vec<NodeWrite>,
    ) -> Result<BulkOutcome>;

    fn make_id(&self) -> String;
}
