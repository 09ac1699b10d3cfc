use std::collections::HashSet;

use super::*;
use crate::consolidate_host;
use crate::test_utils::online_item;
use crate::test_utils::POOL_B;
use crate::Error;
use crate::HostMode;
use crate::MonitorConfig;
use crate::MonitorError;
use crate::NodeHosting;
use crate::NodeItem;
use crate::NodeMode;
use crate::StatusEngine;

const NOW: u64 = 1_000_000;

fn evaluated(items: Vec<NodeItem>) -> Vec<NodeItem> {
    let engine = StatusEngine::new(&MonitorConfig::default());
    items
        .into_iter()
        .map(|mut item| {
            engine.recompute(&mut item, NOW);
            item
        })
        .collect()
}

fn offline(id: &str) -> NodeItem {
    let (mut item, _) = online_item(id, NOW);
    item.connection = None;
    item
}

fn three_nodes() -> Vec<NodeItem> {
    evaluated(vec![online_item("n1", NOW).0, online_item("n2", NOW).0, offline("n3")])
}

/// # Case 1: Mode counts are taken before the online filter
///
/// ## Setup:
/// - Two online nodes and one offline node
///
/// ## Validation criteria:
/// 1. Only online nodes are listed
/// 2. Counts cover all three nodes
#[test]
fn test_counts_taken_before_online_filter() {
    let query = NodeQuery {
        online: Some(true),
        ..Default::default()
    }
    .compile()
    .unwrap();

    let filtered = filter_nodes(three_nodes(), &query);

    assert_eq!(filtered.items.len(), 2);
    assert_eq!(filtered.counts.count, 3);
    assert_eq!(filtered.counts.online, 2);
    assert_eq!(filtered.counts.by_mode.get(NodeMode::Offline.as_str()), Some(&1));
}

#[test]
fn test_pre_filters_shrink_counts() {
    let query = NodeQuery {
        node_ids: Some(HashSet::from([crate::NodeId::new("n1"), crate::NodeId::new("n3")])),
        ..Default::default()
    }
    .compile()
    .unwrap();

    let filtered = filter_nodes(three_nodes(), &query);

    assert_eq!(filtered.counts.count, 2);
    assert_eq!(filtered.items.len(), 2);
}

#[test]
fn test_name_filter_is_case_insensitive() {
    let query = NodeQuery {
        filter: Some("NODE-N2".into()),
        ..Default::default()
    }
    .compile()
    .unwrap();

    let filtered = filter_nodes(three_nodes(), &query);

    assert_eq!(filtered.items.len(), 1);
    assert_eq!(filtered.items[0].node.name, "node-n2");
}

#[test]
fn test_invalid_pattern_is_a_bad_request() {
    let result = NodeQuery {
        filter: Some("(unclosed".into()),
        ..Default::default()
    }
    .compile();

    assert!(matches!(result, Err(Error::Monitor(MonitorError::BadRequest(_)))));
}

#[test]
fn test_hosting_rules() {
    let mut items = three_nodes();
    items[0].node.hosting = NodeHosting::Cloud;

    let strictly = NodeQuery {
        strictly_cloud: true,
        ..Default::default()
    }
    .compile()
    .unwrap();
    let skip = NodeQuery {
        skip_cloud: true,
        ..Default::default()
    }
    .compile()
    .unwrap();

    assert_eq!(filter_nodes(items.clone(), &strictly).items.len(), 1);
    assert_eq!(filter_nodes(items, &skip).items.len(), 2);
}

#[test]
fn test_pool_and_mode_filters() {
    let mut items = three_nodes();
    items[1].node.pool = POOL_B.into();

    let query = NodeQuery {
        pools: Some(HashSet::from([POOL_B.to_string()])),
        modes: Some(vec![NodeMode::Offline]),
        ..Default::default()
    }
    .compile()
    .unwrap();

    let filtered = filter_nodes(items, &query);

    assert_eq!(filtered.counts.count, 1);
    assert!(filtered.items.is_empty());
}

/// # Case 2: Host listings filter on the consolidated mode
#[test]
fn test_host_mode_filter_runs_after_counting() {
    let capacity = MonitorConfig::default().capacity;
    let hosts: Vec<HostEntry> = three_nodes()
        .into_iter()
        .map(|item| {
            let host_id = item.node.host_id.clone().unwrap();
            let status = consolidate_host(&host_id, std::slice::from_ref(&item), &capacity).unwrap();
            HostEntry {
                status,
                root: item.clone(),
                nodes: vec![item],
            }
        })
        .collect();

    let query = HostQuery {
        modes: Some(vec![HostMode::Offline]),
        ..Default::default()
    }
    .compile()
    .unwrap();

    let filtered = filter_hosts(hosts, &query);

    assert_eq!(filtered.counts.count, 3);
    assert_eq!(filtered.items.len(), 1);
    assert_eq!(filtered.items[0].root.node.name, "node-n3");
}
