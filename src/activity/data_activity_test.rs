use super::*;
use crate::test_utils::online_item;
use crate::MonitorConfig;
use crate::NodeItem;
use crate::NodeRole;
use crate::StatusEngine;
use crate::GIB;

const NOW: u64 = 1_700_000_000_000;
const GRACE: u64 = 5_000;

fn context(
    now: u64,
    maintenance: bool,
) -> ActivityContext {
    ActivityContext {
        now,
        offline_grace_ms: GRACE,
        maintenance,
    }
}

fn step(
    item: &mut NodeItem,
    now: u64,
) -> ActivityUpdate {
    StatusEngine::new(&MonitorConfig::default()).recompute(item, now);
    update_data_activity(item, &context(now, false))
}

fn activity(item: &NodeItem) -> &DataActivity {
    item.data_activity.as_ref().unwrap()
}

/// Runs the final batch of the current stage
fn finish_stage(
    item: &mut NodeItem,
    now: u64,
) {
    let act = item.data_activity.as_mut().unwrap();
    let marker = act.stage.marker.clone();
    act.apply_batch(
        marker,
        Ok(RebuildBatch {
            next_marker: None,
            bytes_processed: 30 * GIB,
            failed_chunks: 0,
        }),
        now,
    );
}

fn completed(act: &DataActivity) -> u64 {
    act.stage.size.unwrap().completed
}

fn batch(
    next: Option<&str>,
    bytes: u64,
) -> std::result::Result<RebuildBatch, String> {
    Ok(RebuildBatch {
        next_marker: next.map(RebuildMarker::new),
        bytes_processed: bytes,
        failed_chunks: 0,
    })
}

#[test]
fn test_activity_reason_priority() {
    let (mut item, _agent) = online_item("n1", NOW);
    StatusEngine::new(&MonitorConfig::default()).recompute(&mut item, NOW);
    assert_eq!(activity_reason(&item), None);

    item.status.online = false;
    assert_eq!(activity_reason(&item), Some(ActivityReason::Restoring));
    item.node.migrating_to_pool = Some(NOW);
    assert_eq!(activity_reason(&item), Some(ActivityReason::Migrating));
    item.node.decommissioning = Some(NOW);
    assert_eq!(activity_reason(&item), Some(ActivityReason::Decommissioning));
    item.node.deleting = Some(NOW);
    assert_eq!(activity_reason(&item), Some(ActivityReason::Deleting));
    item.node.deleted = Some(NOW);
    assert_eq!(activity_reason(&item), None);
}

#[test]
fn test_no_reason_for_decommissioned_gateway_or_pending() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    item.node.decommissioned = Some(NOW);
    assert_eq!(activity_reason(&item), None);

    let (mut gateway, _agent) = online_item("n2", NOW);
    gateway.node.role = NodeRole::Gateway;
    gateway.node.decommissioning = Some(NOW);
    assert_eq!(activity_reason(&gateway), None);

    let (item, _agent) = online_item("n3", NOW);
    let mut pending = NodeItem::pending(item.node.clone());
    pending.node.decommissioning = Some(NOW);
    assert_eq!(activity_reason(&pending), None);
}

/// # Case 1: Decommission runs REBUILDING then WIPING then completes
///
/// ## Validation criteria:
/// 1. Each batched stage asks for scheduling
/// 2. Wiping is never skipped
/// 3. Completion sets `decommissioned` and marks the record dirty
/// 4. The next pass tears the finished activity down
#[test]
fn test_decommission_lifecycle() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);

    let update = step(&mut item, NOW);
    assert_eq!(update.decision, ScheduleDecision::EnqueueAfterDelay);
    let act = activity(&item);
    assert_eq!(act.reason, ActivityReason::Decommissioning);
    assert_eq!(act.stage.stage, ActivityStage::Rebuilding);
    assert_eq!(
        act.stage.size,
        Some(SizeProgress {
            total: 30 * GIB,
            remaining: 30 * GIB,
            completed: 0
        })
    );

    finish_stage(&mut item, NOW + 5);
    let update = step(&mut item, NOW + 10);
    assert_eq!(update.decision, ScheduleDecision::EnqueueAfterDelay);
    assert_eq!(activity(&item).stage.stage, ActivityStage::Wiping);
    assert!(item.node.decommissioned.is_none());

    finish_stage(&mut item, NOW + 15);
    let update = step(&mut item, NOW + 20);
    assert_eq!(
        update,
        ActivityUpdate {
            decision: ScheduleDecision::Remove,
            dirty: true
        }
    );
    assert!(activity(&item).done);
    assert_eq!(item.node.decommissioned, Some(NOW + 20));

    let update = step(&mut item, NOW + 30);
    assert!(item.data_activity.is_none());
    assert!(update.dirty);
}

/// # Case 2: An offline node waits out the grace window, then rebuilds
///
/// ## Setup:
/// 1. Node without a connection, last heartbeat at NOW
///
/// ## Validation criteria:
/// 1. OFFLINE_GRACE until heartbeat + grace, nothing scheduled
/// 2. REBUILDING afterwards
/// 3. Restoring completes after rebuilding, with no wipe
#[test]
fn test_restoring_waits_for_grace_then_rebuilds() {
    let (mut item, agent) = online_item("n1", NOW);
    item.connection = None;

    let update = step(&mut item, NOW + 1_000);
    assert_eq!(update.decision, ScheduleDecision::Remove);
    let act = activity(&item);
    assert_eq!(act.reason, ActivityReason::Restoring);
    assert_eq!(act.stage.stage, ActivityStage::OfflineGrace);
    assert_eq!(
        act.stage.time,
        TimeWindow {
            start: NOW,
            end: Some(NOW + GRACE)
        }
    );

    let update = step(&mut item, NOW + GRACE);
    assert_eq!(update.decision, ScheduleDecision::EnqueueAfterDelay);
    assert_eq!(activity(&item).stage.stage, ActivityStage::Rebuilding);

    finish_stage(&mut item, NOW + GRACE + 1);
    let update = step(&mut item, NOW + GRACE + 2);
    assert_eq!(update.decision, ScheduleDecision::Remove);
    let act = activity(&item);
    assert!(act.done);
    assert_eq!(act.stage.stage, ActivityStage::Rebuilding);

    // Node comes back
    item.connection = Some(agent);
    item.node.heartbeat = NOW + GRACE + 3;
    step(&mut item, NOW + GRACE + 3);
    assert!(item.data_activity.is_none());
}

/// # Case 3: Batch failures restart the pass from the error cursor
///
/// ## Validation criteria:
/// 1. A failed call keeps the marker and remembers the error cursor
/// 2. Reaching the end after an error restarts from the cursor with the
///    completed count it had then
/// 3. A clean pass marks the stage done
#[test]
fn test_batch_error_restarts_from_error_cursor() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    step(&mut item, NOW);
    let act = item.data_activity.as_mut().unwrap();

    act.apply_batch(None, batch(Some("1"), 10), NOW + 1);
    assert_eq!(completed(act), 10);

    act.apply_batch(Some(RebuildMarker::new("1")), Err("timeout".into()), NOW + 2);
    assert_eq!(act.stage.marker, Some(RebuildMarker::new("1")));
    assert_eq!(act.stage.rebuild_error, Some(NOW + 2));
    assert_eq!(act.stage.error_marker, Some(RebuildMarker::new("1")));
    assert_eq!(act.stage.error_completed, 10);

    act.apply_batch(Some(RebuildMarker::new("1")), batch(Some("2"), 10), NOW + 3);
    assert_eq!(completed(act), 20);
    act.apply_batch(Some(RebuildMarker::new("2")), batch(None, 10), NOW + 4);
    assert!(!act.stage.done);
    assert_eq!(act.stage.marker, Some(RebuildMarker::new("1")));
    assert_eq!(completed(act), 10);
    assert!(act.stage.rebuild_error.is_none());

    act.apply_batch(Some(RebuildMarker::new("1")), batch(None, 20), NOW + 5);
    assert!(act.stage.done);
    assert_eq!(completed(act), 30);
}

#[test]
fn test_failed_chunks_advance_marker_without_progress() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    step(&mut item, NOW);
    let act = item.data_activity.as_mut().unwrap();

    act.apply_batch(
        None,
        Ok(RebuildBatch {
            next_marker: Some(RebuildMarker::new("1")),
            bytes_processed: 10,
            failed_chunks: 2,
        }),
        NOW + 1,
    );

    assert_eq!(act.stage.marker, Some(RebuildMarker::new("1")));
    assert_eq!(act.stage.size.unwrap().completed, 0);
    assert_eq!(act.stage.rebuild_error, Some(NOW + 1));
    assert_eq!(act.stage.error_marker, None);
}

#[test]
fn test_wiping_waits_for_node_online() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    step(&mut item, NOW);
    finish_stage(&mut item, NOW + 1);
    step(&mut item, NOW + 2);
    assert_eq!(activity(&item).stage.stage, ActivityStage::Wiping);

    item.connection = None;
    let update = step(&mut item, NOW + 3);

    assert_eq!(update.decision, ScheduleDecision::Remove);
    assert_eq!(activity(&item).stage.wait_reason, Some(WaitReason::NodeOffline));
}

#[test]
fn test_maintenance_pauses_scheduling() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    StatusEngine::new(&MonitorConfig::default()).recompute(&mut item, NOW);

    let update = update_data_activity(&mut item, &context(NOW, true));

    assert_eq!(update.decision, ScheduleDecision::Remove);
    assert_eq!(activity(&item).stage.wait_reason, Some(WaitReason::SystemMaintenance));

    let update = update_data_activity(&mut item, &context(NOW + 1, false));
    assert_eq!(update.decision, ScheduleDecision::EnqueueAfterDelay);
    assert_eq!(activity(&item).stage.wait_reason, None);
}

#[test]
fn test_running_activity_is_kept() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    step(&mut item, NOW);
    item.data_activity.as_mut().unwrap().running = true;

    assert_eq!(step(&mut item, NOW + 1).decision, ScheduleDecision::Keep);
}

/// # Case 4: Progress is extrapolated from bytes completed
///
/// ## Setup:
/// 1. 10 GiB of 30 GiB completed one second after the stage started
///
/// ## Validation criteria:
/// 1. Stage end estimated two seconds out
/// 2. Progress is a third
#[test]
fn test_progress_estimate() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    step(&mut item, NOW);
    assert_eq!(activity(&item).progress, 0.0);

    item.data_activity
        .as_mut()
        .unwrap()
        .apply_batch(None, batch(Some("1"), 10 * GIB), NOW + 1_000);
    item.node.heartbeat = NOW + 1_000;
    step(&mut item, NOW + 1_000);

    let act = activity(&item);
    assert_eq!(act.stage.size.unwrap().remaining, 20 * GIB);
    assert_eq!(act.stage.time.end, Some(NOW + 3_000));
    assert_eq!(act.time.end, Some(NOW + 3_000));
    assert!((act.progress - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_time_window_progress_bounds() {
    let open = TimeWindow { start: 10, end: None };
    assert_eq!(open.progress(100), 0.0);

    let window = TimeWindow {
        start: 10,
        end: Some(110),
    };
    assert_eq!(window.progress(5), 0.0);
    assert_eq!(window.progress(60), 0.5);
    assert_eq!(window.progress(500), 1.0);
}

/// # Case 5: Deleting gateways skip data activity
#[test]
fn test_deleting_gateway_is_ready_without_activity() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.role = NodeRole::Gateway;
    item.node.deleting = Some(NOW);

    let update = step(&mut item, NOW);
    assert!(update.dirty);
    assert!(item.ready_to_be_deleted);
    assert!(item.data_activity.is_none());

    assert!(!step(&mut item, NOW + 1).dirty);
}

#[test]
fn test_migration_wipe_clears_migrating_flag() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.migrating_to_pool = Some(NOW);

    step(&mut item, NOW);
    finish_stage(&mut item, NOW + 1);
    step(&mut item, NOW + 2);
    assert_eq!(activity(&item).stage.stage, ActivityStage::Wiping);
    finish_stage(&mut item, NOW + 3);
    let update = step(&mut item, NOW + 4);

    assert!(update.dirty);
    assert!(item.node.migrating_to_pool.is_none());
    assert!(item.node.decommissioned.is_none());

    step(&mut item, NOW + 5);
    assert!(item.data_activity.is_none());
}

#[test]
fn test_deleting_node_ready_after_wipe() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.deleting = Some(NOW);

    step(&mut item, NOW);
    finish_stage(&mut item, NOW + 1);
    step(&mut item, NOW + 2);
    finish_stage(&mut item, NOW + 3);
    step(&mut item, NOW + 4);

    assert!(item.ready_to_be_deleted);
    assert!(activity(&item).done);
}

#[test]
fn test_completed_bytes_saturate() {
    let (mut item, _agent) = online_item("n1", NOW);
    item.node.decommissioning = Some(NOW);
    step(&mut item, NOW);
    let act = item.data_activity.as_mut().unwrap();

    act.apply_batch(None, batch(Some("1"), u64::MAX), NOW + 1);
    act.apply_batch(Some(RebuildMarker::new("1")), batch(Some("2"), 10), NOW + 2);

    assert_eq!(completed(act), u64::MAX);
    assert_eq!(act.stage.marker, Some(RebuildMarker::new("2")));
}
