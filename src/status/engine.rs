use tracing::debug;
use tracing::warn;

use super::node_storage_info;
use super::reserve_for;
use crate::average;
use crate::Accessibility;
use crate::CapacityConfig;
use crate::DetentionConfig;
use crate::DetentionTimer;
use crate::LivenessConfig;
use crate::MonitorConfig;
use crate::NodeItem;
use crate::NodeMode;
use crate::NodeRole;

/// Connectivity reported for online nodes
pub const CONNECTIVITY_TCP: &str = "TCP";

/// What a recompute found that the caller must act on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusOutcome {
    /// The item still holds a connection but its heartbeat expired
    pub stale_connection: bool,
    /// Online state flipped since the previous evaluation
    pub online_changed: bool,
}

/// Derives status fields from an item and a clock reading
#[derive(Debug, Clone)]
pub struct StatusEngine {
    liveness: LivenessConfig,
    detention: DetentionConfig,
    capacity: CapacityConfig,
}

impl StatusEngine {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            liveness: config.liveness.clone(),
            detention: config.detention.clone(),
            capacity: config.capacity.clone(),
        }
    }

    pub fn capacity(&self) -> &CapacityConfig {
        &self.capacity
    }

    pub fn is_alive(
        &self,
        item: &NodeItem,
        now: u64,
    ) -> bool {
        now < item.node.heartbeat.saturating_add(self.liveness.heartbeat_grace_ms)
    }

    /// Rewrites `item.status` and the detention timers.
    pub fn recompute(
        &self,
        item: &mut NodeItem,
        now: u64,
    ) -> StatusOutcome {
        let alive = self.is_alive(item, now);
        let connected = item
            .connection
            .as_ref()
            .is_some_and(|conn| conn.is_connected());
        let online = connected && alive;

        let outcome = StatusOutcome {
            stale_connection: item.connection.is_some() && !alive,
            online_changed: item.status.evaluated && item.status.online != online,
        };
        if outcome.stale_connection {
            warn!(
                node_id = %item.node.id,
                heartbeat = item.node.heartbeat,
                "heartbeat expired, connection is stale"
            );
        }
        if outcome.online_changed {
            debug!(node_id = %item.node.id, online, "node online state changed");
        }

        self.update_reported_detention(item, now);
        item.detention.clear_expired(now, self.detention.threshold_ms);

        let trusted = self.is_trusted(item, now);
        let io_detention = item.detention.earliest();
        let persisted = item.is_persisted();
        let has_address = item.has_address();
        let node = &item.node;
        let gateway = node.role == NodeRole::Gateway;

        let storage_full = match node.storage.limit {
            Some(limit) => node.storage.used >= limit,
            None => {
                let reserve = if gateway {
                    0
                } else {
                    reserve_for(node, &self.capacity)
                };
                node.storage.free <= reserve
            }
        };

        let has_issues = !(online
            && trusted
            && persisted
            && has_address
            && io_detention.is_none()
            && !item.activity_in_flight());

        // Decommissioning nodes stay readable
        let readable = online
            && trusted
            && persisted
            && has_address
            && item.storage_not_exist.is_none()
            && item.auth_failed.is_none()
            && io_detention.is_none()
            && node.decommissioned.is_none()
            && node.deleting.is_none()
            && node.deleted.is_none()
            && !gateway;

        let writable = readable
            && !storage_full
            && node.migrating_to_pool.is_none()
            && node.decommissioning.is_none();

        let status = &mut item.status;
        status.evaluated = true;
        status.online = online;
        status.trusted = trusted;
        status.io_detention = io_detention;
        status.storage_full = storage_full;
        status.has_issues = has_issues;
        status.readable = readable;
        status.writable = writable;
        status.accessibility = Accessibility::from_flags(readable, writable);
        status.connectivity = online.then_some(CONNECTIVITY_TCP);
        status.avg_ping = average(&node.latency_to_server);
        status.avg_disk_read = average(&node.latency_of_disk_read);
        status.avg_disk_write = average(&node.latency_of_disk_write);
        item.status.mode = self.mode(item);
        outcome
    }

    /// The first condition that holds, in priority order
    fn mode(
        &self,
        item: &NodeItem,
    ) -> NodeMode {
        let node = &item.node;
        let status = &item.status;
        let detention = &item.detention;
        let storage = node_storage_info(node, status.has_issues, &self.capacity);
        let storage_role = node.role == NodeRole::Storage;

        if !status.online {
            NodeMode::Offline
        } else if !item.has_address() {
            NodeMode::Initializing
        } else if !status.trusted {
            NodeMode::Untrusted
        } else if node.deleting.is_some() {
            NodeMode::Deleting
        } else if node.deleted.is_some() {
            NodeMode::Deleted
        } else if item.storage_not_exist.is_some() {
            NodeMode::StorageNotExist
        } else if item.auth_failed.is_some() {
            NodeMode::AuthFailed
        } else if node.decommissioned.is_some() {
            NodeMode::Decommissioned
        } else if node.decommissioning.is_some() {
            NodeMode::Decommissioning
        } else if node.migrating_to_pool.is_some() {
            NodeMode::Migrating
        } else if detention.n2n_errors.is_some() {
            NodeMode::N2nErrors
        } else if detention.gateway_errors.is_some() {
            NodeMode::GatewayErrors
        } else if detention.has_io_errors() {
            NodeMode::IoErrors
        } else if storage_role && storage.free <= self.capacity.no_capacity_free {
            NodeMode::NoCapacity
        } else if storage_role && storage.free_percent() <= self.capacity.low_capacity_percent {
            NodeMode::LowCapacity
        } else {
            NodeMode::Optimal
        }
    }

    fn is_trusted(
        &self,
        item: &NodeItem,
        now: u64,
    ) -> bool {
        if item.node.permission_tampering {
            return false;
        }
        let strikes = item
            .node
            .issues_report
            .iter()
            .filter(|issue| issue.is_tampering() && self.is_recent(issue.time, now))
            .count();
        strikes < self.detention.tampering_strikes
    }

    /// Enough recent client-reported I/O failures put the node in detention
    fn update_reported_detention(
        &self,
        item: &mut NodeItem,
        now: u64,
    ) {
        let recent: Vec<u64> = item
            .node
            .issues_report
            .iter()
            .filter(|issue| issue.action.is_io() && self.is_recent(issue.time, now))
            .map(|issue| issue.time)
            .collect();
        if recent.len() < self.detention.recent_issues {
            return;
        }
        if item.detention.io_reported_errors.is_none() {
            debug!(node_id = %item.node.id, reports = recent.len(), "node has io_reported_errors");
        }
        if let Some(latest) = recent.into_iter().max() {
            DetentionTimer::record(&mut item.detention.io_reported_errors, latest);
        }
    }

    fn is_recent(
        &self,
        time: u64,
        now: u64,
    ) -> bool {
        now.saturating_sub(time) < self.detention.threshold_ms
    }
}
