use serde::Serialize;

use super::node_storage_info;
use super::StorageBreakdown;
use crate::average;
use crate::CapacityConfig;
use crate::Drive;
use crate::HostMode;
use crate::NodeId;
use crate::NodeItem;
use crate::NodeMode;
use crate::NodeRole;

const ROOT_MOUNTS: [&str; 2] = ["/", "c:"];

/// Node modes a gateway may report; anything else is an HTTP server error
const GATEWAY_MODES: [NodeMode; 7] = [
    NodeMode::Offline,
    NodeMode::Untrusted,
    NodeMode::Initializing,
    NodeMode::Decommissioned,
    NodeMode::N2nErrors,
    NodeMode::GatewayErrors,
    NodeMode::Optimal,
];

const HAS_ISSUES_MODES: [NodeMode; 5] = [
    NodeMode::Offline,
    NodeMode::StorageNotExist,
    NodeMode::IoErrors,
    NodeMode::N2nErrors,
    NodeMode::GatewayErrors,
];

/// Read-time merge of every node sharing one host id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostStatus {
    pub host_id: String,
    /// Node whose record represents the host
    pub root: NodeId,
    pub mode: HostMode,
    /// `None` when the host has no storage nodes
    pub storage_mode: Option<HostMode>,
    /// `None` when the host has no gateway nodes
    pub gateway_mode: Option<HostMode>,
    pub online: bool,
    pub trusted: bool,
    pub decommissioned: bool,
    pub decommissioning: bool,
    pub migrating: bool,
    pub n2n_errors: bool,
    pub gateway_errors: bool,
    pub io_test_errors: bool,
    pub io_reported_errors: bool,
    /// Summed over the storage nodes only
    pub storage: StorageBreakdown,
    pub drives: Vec<Drive>,
    pub avg_ping: Option<f64>,
    pub avg_disk_read: Option<f64>,
    pub avg_disk_write: Option<f64>,
    pub storage_nodes: Vec<NodeId>,
    pub gateway_nodes: Vec<NodeId>,
}

/// Consolidates already-recomputed items of one host. `None` for an empty host.
pub fn consolidate_host(
    host_id: &str,
    items: &[NodeItem],
    capacity: &CapacityConfig,
) -> Option<HostStatus> {
    let (storage_nodes, gateway_nodes): (Vec<&NodeItem>, Vec<&NodeItem>) =
        items.iter().partition(|item| item.node.role == NodeRole::Storage);
    let root = root_item(&storage_nodes).or_else(|| gateway_nodes.first().copied())?;

    let mut storage = StorageBreakdown::default();
    for item in &storage_nodes {
        storage.add(&node_storage_info(&item.node, item.status.has_issues, capacity));
    }

    let storage_mode = storage_subset_mode(&storage_nodes, &storage, capacity);
    let gateway_mode = gateway_subset_mode(&gateway_nodes);
    let decommissioned = items.iter().all(|item| item.node.decommissioned.is_some());

    let mean = |pick: fn(&NodeItem) -> Option<f64>| {
        let samples: Vec<f64> = storage_nodes.iter().filter_map(|item| pick(item)).collect();
        average(&samples)
    };

    Some(HostStatus {
        host_id: host_id.to_string(),
        root: root.node.id.clone(),
        mode: combine_host_modes(storage_mode, gateway_mode),
        storage_mode,
        gateway_mode,
        online: items.iter().any(|item| item.status.online),
        trusted: items.iter().all(|item| item.status.trusted),
        decommissioned,
        decommissioning: !decommissioned
            && items
                .iter()
                .all(|item| item.node.decommissioned.is_some() || item.node.decommissioning.is_some()),
        migrating: items.iter().any(|item| item.node.migrating_to_pool.is_some()),
        n2n_errors: items.iter().any(|item| item.detention.n2n_errors.is_some()),
        gateway_errors: items.iter().any(|item| item.detention.gateway_errors.is_some()),
        io_test_errors: items.iter().any(|item| item.detention.io_test_errors.is_some()),
        io_reported_errors: items.iter().any(|item| item.detention.io_reported_errors.is_some()),
        storage,
        drives: items.iter().flat_map(|item| item.node.drives.iter().cloned()).collect(),
        avg_ping: mean(|item| item.status.avg_ping),
        avg_disk_read: mean(|item| item.status.avg_disk_read),
        avg_disk_write: mean(|item| item.status.avg_disk_write),
        storage_nodes: storage_nodes.iter().map(|item| item.node.id.clone()).collect(),
        gateway_nodes: gateway_nodes.iter().map(|item| item.node.id.clone()).collect(),
    })
}

/// The storage node mounted at the system root, else the first storage node
fn root_item<'a>(storage_nodes: &[&'a NodeItem]) -> Option<&'a NodeItem> {
    storage_nodes
        .iter()
        .find(|item| {
            item.node.drives.first().is_some_and(|drive| {
                let mount = drive.mount.to_lowercase();
                ROOT_MOUNTS.contains(&mount.as_str())
            })
        })
        .or_else(|| storage_nodes.first())
        .copied()
}

fn all_in(
    items: &[&NodeItem],
    modes: &[NodeMode],
) -> bool {
    items.iter().all(|item| modes.contains(&item.status.mode))
}

fn any_in(
    items: &[&NodeItem],
    modes: &[NodeMode],
) -> bool {
    items.iter().any(|item| modes.contains(&item.status.mode))
}

/// Rollup of the storage nodes
pub fn storage_subset_mode(
    items: &[&NodeItem],
    storage: &StorageBreakdown,
    capacity: &CapacityConfig,
) -> Option<HostMode> {
    use NodeMode::*;

    if items.is_empty() {
        return None;
    }
    // Capacity counts free space held by nodes in transition
    let capacity_view = StorageBreakdown {
        free: storage.free + storage.unavailable_free,
        ..*storage
    };
    let mode = if all_in(items, &[Offline]) {
        HostMode::Offline
    } else if all_in(items, &[Decommissioned]) {
        HostMode::Decommissioned
    } else if all_in(items, &[Decommissioning, Decommissioned]) {
        HostMode::Decommissioning
    } else if any_in(items, &[Untrusted]) {
        HostMode::Untrusted
    } else if all_in(items, &[IoErrors, N2nErrors, GatewayErrors]) {
        HostMode::Detention
    } else if any_in(items, &HAS_ISSUES_MODES) {
        HostMode::HasIssues
    } else if capacity_view.free <= capacity.no_capacity_free {
        HostMode::NoCapacity
    } else if any_in(items, &[Migrating, Decommissioning]) {
        HostMode::DataActivity
    } else if capacity_view.free_percent() <= capacity.low_capacity_percent {
        HostMode::LowCapacity
    } else if any_in(items, &[Initializing]) {
        HostMode::Initializing
    } else {
        HostMode::Optimal
    };
    Some(mode)
}

/// Rollup of the gateway nodes
pub fn gateway_subset_mode(items: &[&NodeItem]) -> Option<HostMode> {
    use NodeMode::*;

    if items.is_empty() {
        return None;
    }
    let mode = if all_in(items, &[Offline]) {
        HostMode::Offline
    } else if all_in(items, &[Decommissioned]) {
        HostMode::Decommissioned
    } else if all_in(items, &[Decommissioning, Decommissioned]) {
        HostMode::Decommissioning
    } else if any_in(items, &[Untrusted]) {
        HostMode::Untrusted
    } else if !all_in(items, &GATEWAY_MODES) {
        HostMode::HttpSrvErrors
    } else if any_in(items, &[Offline, N2nErrors, GatewayErrors]) {
        HostMode::HasIssues
    } else if any_in(items, &[Initializing]) {
        HostMode::Initializing
    } else {
        HostMode::Optimal
    };
    Some(mode)
}

/// Combines the two subset modes, first matching row wins:
///
/// | storage                        | gateway                        | host            |
/// |--------------------------------|--------------------------------|-----------------|
/// | OFFLINE                        | OFFLINE                        | OFFLINE         |
/// | DECOMMISSIONED                 | DECOMMISSIONED                 | DECOMMISSIONED  |
/// | DECOMMISSIONING/DECOMMISSIONED | DECOMMISSIONING/DECOMMISSIONED | DECOMMISSIONING |
/// | UNTRUSTED                      | *                              | UNTRUSTED       |
/// | DATA_ACTIVITY/INITIALIZING     | *                              | DATA_ACTIVITY   |
/// | issues or capacity             | *                              | HAS_ISSUES      |
/// | *                              | HTTP_SRV_ERRORS                | HAS_ISSUES      |
/// | OPTIMAL/DECOMMISSION*          | OPTIMAL/DECOMMISSION*          | OPTIMAL         |
/// | *                              | *                              | HAS_ISSUES      |
///
/// A missing subset takes the other subset's mode, so it matches every row
/// that needs both sides.
pub fn combine_host_modes(
    storage: Option<HostMode>,
    gateway: Option<HostMode>,
) -> HostMode {
    use HostMode::*;

    let (storage, gateway) = match (storage, gateway) {
        (Some(s), Some(g)) => (s, g),
        (Some(s), None) => (s, s),
        (None, Some(g)) => (g, g),
        (None, None) => return Optimal,
    };
    let decommission_like = |mode: HostMode| matches!(mode, Decommissioning | Decommissioned);
    let settled = |mode: HostMode| matches!(mode, Optimal | Decommissioning | Decommissioned);

    match (storage, gateway) {
        (Offline, Offline) => Offline,
        (Decommissioned, Decommissioned) => Decommissioned,
        (s, g) if decommission_like(s) && decommission_like(g) => Decommissioning,
        (Untrusted, _) => Untrusted,
        (DataActivity | Initializing, _) => DataActivity,
        (HasIssues | Detention | NoCapacity | LowCapacity, _) => HasIssues,
        (_, HttpSrvErrors) => HasIssues,
        (s, g) if settled(s) && settled(g) => Optimal,
        _ => HasIssues,
    }
}
