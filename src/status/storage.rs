use serde::Deserialize;
use serde::Serialize;

use crate::CapacityConfig;
use crate::NodeRecord;

/// Storage counters as reported to callers.
///
/// `reserved` is held back from `free`; `unavailable_free` is free space on
/// nodes with issues, which cannot take new data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBreakdown {
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub alloc: u64,
    pub limit: u64,
    pub reserved: u64,
    pub used_other: u64,
    pub unavailable_free: u64,
}

impl StorageBreakdown {
    pub fn add(
        &mut self,
        other: &StorageBreakdown,
    ) {
        self.total = self.total.saturating_add(other.total);
        self.free = self.free.saturating_add(other.free);
        self.used = self.used.saturating_add(other.used);
        self.alloc = self.alloc.saturating_add(other.alloc);
        self.limit = self.limit.saturating_add(other.limit);
        self.reserved = self.reserved.saturating_add(other.reserved);
        self.used_other = self.used_other.saturating_add(other.used_other);
        self.unavailable_free = self.unavailable_free.saturating_add(other.unavailable_free);
    }

    /// Free space as a percentage of free plus used; 0 when both are empty
    pub fn free_percent(&self) -> u64 {
        let denominator = self.free.saturating_add(self.used);
        if denominator == 0 {
            return 0;
        }
        ((self.free as u128 * 100) / denominator as u128) as u64
    }
}

/// Bytes of free space kept in reserve on this node
pub fn reserve_for(
    record: &NodeRecord,
    capacity: &CapacityConfig,
) -> u64 {
    if record.hosting.is_ephemeral() {
        0
    } else {
        capacity.free_space_reserve
    }
}

pub fn node_storage_info(
    record: &NodeRecord,
    has_issues: bool,
    capacity: &CapacityConfig,
) -> StorageBreakdown {
    let storage = &record.storage;
    let mut info = StorageBreakdown {
        total: storage.total,
        free: storage.free,
        used: storage.used,
        alloc: storage.alloc,
        limit: storage.limit.unwrap_or_default(),
        ..Default::default()
    };

    info.reserved = reserve_for(record, capacity).min(info.free);
    info.free -= info.reserved;

    if has_issues {
        info.unavailable_free = info.free;
        info.free = 0;
    }

    info.used_other = info
        .total
        .saturating_sub(info.used)
        .saturating_sub(info.reserved)
        .saturating_sub(info.free)
        .saturating_sub(info.unavailable_free);
    info
}
