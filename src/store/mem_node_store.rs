use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use nanoid::nanoid;
use parking_lot::RwLock;
use tracing::trace;

use super::BulkOutcome;
use super::NodeFilter;
use super::NodeStore;
use super::NodeWrite;
use crate::NodeId;
use crate::NodeRecord;
use crate::Result;
use crate::StoreError;

/// In-memory node store
#[derive(Debug, Default)]
pub struct MemNodeStore {
    records: RwLock<BTreeMap<NodeId, NodeRecord>>,
    rejected: RwLock<HashSet<NodeId>>,
    unavailable: AtomicBool,
    bulk_calls: AtomicUsize,
}

impl MemNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = NodeRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.records.write();
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        store
    }

    pub fn get(
        &self,
        id: &NodeId,
    ) -> Option<NodeRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Number of `bulk_update` calls served so far
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Every call fails while unavailable
    pub fn set_unavailable(
        &self,
        unavailable: bool,
    ) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Writes for `id` are reported as failed until cleared
    pub fn reject_writes_for(
        &self,
        id: NodeId,
    ) {
        self.rejected.write().insert(id);
    }

    pub fn clear_rejections(&self) {
        self.rejected.write().clear();
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl NodeStore for MemNodeStore {
    async fn find_nodes(
        &self,
        filter: NodeFilter,
    ) -> Result<Vec<NodeRecord>> {
        self.check_available()?;
        let records = self.records.read();
        Ok(records
            .values()
            .filter(|r| filter.system.as_ref().map_or(true, |s| &r.system == s))
            .filter(|r| filter.include_deleted || r.deleted.is_none())
            .cloned()
            .collect())
    }

    async fn bulk_update(
        &self,
        writes: Vec<NodeWrite>,
    ) -> Result<BulkOutcome> {
        self.check_available()?;
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        trace!("bulk_update writes = {}", writes.len());

        let rejected = self.rejected.read();
        let mut records = self.records.write();
        let mut outcome = BulkOutcome::default();
        for write in writes {
            let id = write.id().clone();
            if rejected.contains(&id) {
                outcome.failed.push(id);
                continue;
            }
            let accepted = match write {
                NodeWrite::Insert(record) => {
                    if records.contains_key(&id) {
                        false
                    } else {
                        records.insert(id.clone(), record);
                        true
                    }
                }
                NodeWrite::Update(record) => match records.get_mut(&id) {
                    Some(slot) => {
                        *slot = record;
                        true
                    }
                    None => false,
                },
            };
            if accepted {
                outcome.updated.push(id);
            } else {
                outcome.failed.push(id);
            }
        }
        Ok(outcome)
    }

    fn make_id(&self) -> String {
        nanoid!()
    }
}
