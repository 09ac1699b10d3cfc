use super::*;
use crate::node_storage_info;
use crate::test_utils::online_item;
use crate::test_utils::POOL_A;
use crate::test_utils::POOL_B;
use crate::ActivityReason;
use crate::ActivityStage;
use crate::DataActivity;
use crate::MonitorConfig;
use crate::NodeItem;
use crate::StageState;
use crate::StatusEngine;
use crate::StorageBreakdown;
use crate::TimeWindow;
use crate::GIB;

const NOW: u64 = 1_000_000;

fn items() -> Vec<NodeItem> {
    let engine = StatusEngine::new(&MonitorConfig::default());
    ["n1", "n2", "n3"]
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let (mut item, _) = online_item(id, NOW);
            item.node.storage.free = (10 + 20 * i as u64) * GIB;
            if i == 2 {
                item.node.pool = POOL_B.into();
                item.connection = None;
            }
            engine.recompute(&mut item, NOW);
            item
        })
        .collect()
}

fn activity(
    reason: ActivityReason,
    start: u64,
    end: Option<u64>,
) -> DataActivity {
    let time = TimeWindow { start, end };
    DataActivity {
        reason,
        stage: StageState {
            stage: ActivityStage::Rebuilding,
            time,
            size: None,
            marker: None,
            done: false,
            rebuild_error: None,
            error_marker: None,
            error_completed: 0,
            wait_reason: None,
        },
        time,
        progress: 0.0,
        done: false,
        running: false,
    }
}

/// # Case 1: Storage totals equal the sum of per-node breakdowns
#[test]
fn test_storage_totals_match_per_node_breakdowns() {
    let capacity = MonitorConfig::default().capacity;
    let items = items();

    let aggregate = aggregate_nodes(&items, &capacity, NOW);

    let mut expected = StorageBreakdown::default();
    for item in &items {
        expected.add(&node_storage_info(&item.node, item.status.has_issues, &capacity));
    }
    assert_eq!(aggregate.storage, expected);
    assert_eq!(aggregate.nodes.count, 3);
    assert_eq!(aggregate.nodes.online, 2);
}

/// # Case 2: Activities are summarised per reason
///
/// ## Validation criteria:
/// 1. The window spans the earliest start and the latest end
/// 2. A member without an end estimate leaves the window open
#[test]
fn test_activity_summary_per_reason() {
    let capacity = MonitorConfig::default().capacity;
    let mut items = items();
    items[0].data_activity = Some(activity(ActivityReason::Decommissioning, NOW - 100, Some(NOW + 100)));
    items[1].data_activity = Some(activity(ActivityReason::Decommissioning, NOW - 300, Some(NOW + 500)));
    items[2].data_activity = Some(activity(ActivityReason::Migrating, NOW - 50, None));

    let aggregate = aggregate_nodes(&items, &capacity, NOW);

    assert_eq!(aggregate.data_activities.len(), 2);
    let decommission = aggregate
        .data_activities
        .iter()
        .find(|s| s.reason == ActivityReason::Decommissioning)
        .unwrap();
    assert_eq!(decommission.count, 2);
    assert_eq!(decommission.time.start, NOW - 300);
    assert_eq!(decommission.time.end, Some(NOW + 500));
    assert!((decommission.progress - 0.375).abs() < 1e-9);

    let migrating = aggregate
        .data_activities
        .iter()
        .find(|s| s.reason == ActivityReason::Migrating)
        .unwrap();
    assert_eq!(migrating.time.end, None);
    assert_eq!(migrating.progress, 0.0);
}

#[test]
fn test_group_by_pool() {
    let capacity = MonitorConfig::default().capacity;

    let grouped = aggregate_nodes_by_pool(&items(), &capacity, NOW);

    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[POOL_A].nodes.count, 2);
    assert_eq!(grouped[POOL_B].nodes.count, 1);
    assert_eq!(grouped[POOL_B].nodes.online, 0);
}
