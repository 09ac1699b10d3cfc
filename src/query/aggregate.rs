use std::collections::BTreeMap;

use serde::Serialize;

use super::HostEntry;
use super::ModeCounts;
use crate::metrics::NODES_BY_MODE;
use crate::node_storage_info;
use crate::ActivityReason;
use crate::CapacityConfig;
use crate::NodeItem;
use crate::StorageBreakdown;
use crate::TimeWindow;

/// Active data activities sharing one reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    pub reason: ActivityReason,
    pub count: usize,
    /// Earliest start and latest end; no end while any member has no estimate
    pub time: TimeWindow,
    pub progress: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub nodes: ModeCounts,
    pub storage: StorageBreakdown,
    pub data_activities: Vec<ActivitySummary>,
}

#[derive(Default)]
struct ActivityBuckets {
    buckets: BTreeMap<&'static str, ActivitySummary>,
}

impl ActivityBuckets {
    fn add(
        &mut self,
        item: &NodeItem,
    ) {
        let Some(activity) = &item.data_activity else {
            return;
        };
        let summary = self
            .buckets
            .entry(activity.reason.as_str())
            .or_insert_with(|| ActivitySummary {
                reason: activity.reason,
                count: 0,
                time: activity.time,
                progress: 0.0,
            });
        if summary.count > 0 {
            summary.time.start = summary.time.start.min(activity.time.start);
            summary.time.end = match (summary.time.end, activity.time.end) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
        }
        summary.count += 1;
    }

    fn finish(
        self,
        now: u64,
    ) -> Vec<ActivitySummary> {
        self.buckets
            .into_values()
            .map(|mut summary| {
                summary.progress = summary.time.progress(now);
                summary
            })
            .collect()
    }
}

/// Sums the per-node storage breakdowns and buckets nodes by mode and by
/// data activity reason. Items must already carry a fresh status.
pub fn aggregate_nodes(
    items: &[NodeItem],
    capacity: &CapacityConfig,
    now: u64,
) -> Aggregate {
    let aggregate = sum_nodes(items, capacity, now);
    publish_modes(&aggregate.nodes);
    aggregate
}

fn sum_nodes(
    items: &[NodeItem],
    capacity: &CapacityConfig,
    now: u64,
) -> Aggregate {
    let mut aggregate = Aggregate::default();
    let mut activities = ActivityBuckets::default();
    for item in items {
        aggregate.nodes.add(item.status.online, item.status.mode.as_str());
        aggregate
            .storage
            .add(&node_storage_info(&item.node, item.status.has_issues, capacity));
        activities.add(item);
    }
    aggregate.data_activities = activities.finish(now);
    aggregate
}

/// Aggregates over pools; keys are pool ids
pub fn aggregate_nodes_by_pool(
    items: &[NodeItem],
    capacity: &CapacityConfig,
    now: u64,
) -> BTreeMap<String, Aggregate> {
    let mut groups: BTreeMap<String, Vec<NodeItem>> = BTreeMap::new();
    for item in items {
        groups.entry(item.node.pool.clone()).or_default().push(item.clone());
    }
    groups
        .into_iter()
        .map(|(pool, members)| (pool, sum_nodes(&members, capacity, now)))
        .collect()
}

pub fn aggregate_hosts(
    hosts: &[HostEntry],
    now: u64,
) -> Aggregate {
    let mut aggregate = Aggregate::default();
    let mut activities = ActivityBuckets::default();
    for host in hosts {
        aggregate.nodes.add(host.status.online, host.status.mode.as_str());
        aggregate.storage.add(&host.status.storage);
        for item in &host.nodes {
            activities.add(item);
        }
    }
    aggregate.data_activities = activities.finish(now);
    aggregate
}

pub fn aggregate_hosts_by_pool(
    hosts: &[HostEntry],
    now: u64,
) -> BTreeMap<String, Aggregate> {
    let mut groups: BTreeMap<String, Vec<HostEntry>> = BTreeMap::new();
    for host in hosts {
        groups.entry(host.root.node.pool.clone()).or_default().push(host.clone());
    }
    groups
        .into_iter()
        .map(|(pool, members)| (pool, aggregate_hosts(&members, now)))
        .collect()
}

fn publish_modes(counts: &ModeCounts) {
    NODES_BY_MODE.reset();
    for (mode, count) in &counts.by_mode {
        NODES_BY_MODE.with_label_values(&[mode]).set(*count as i64);
    }
}
