use serde::Deserialize;
use serde::Serialize;

/// Node mode. Variants are declared in status priority order; the first
/// condition that holds decides the mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeMode {
    #[default]
    Offline,
    Initializing,
    Untrusted,
    Deleting,
    Deleted,
    StorageNotExist,
    AuthFailed,
    Decommissioned,
    Decommissioning,
    Migrating,
    N2nErrors,
    GatewayErrors,
    IoErrors,
    NoCapacity,
    LowCapacity,
    Optimal,
}

/// Display order used when sorting by mode, best first
pub const MODE_COMPARE_ORDER: [NodeMode; 16] = [
    NodeMode::Optimal,
    NodeMode::LowCapacity,
    NodeMode::NoCapacity,
    NodeMode::Decommissioning,
    NodeMode::Migrating,
    NodeMode::Deleting,
    NodeMode::Decommissioned,
    NodeMode::StorageNotExist,
    NodeMode::AuthFailed,
    NodeMode::Deleted,
    NodeMode::N2nErrors,
    NodeMode::GatewayErrors,
    NodeMode::IoErrors,
    NodeMode::Untrusted,
    NodeMode::Initializing,
    NodeMode::Offline,
];

impl NodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMode::Offline => "OFFLINE",
            NodeMode::Initializing => "INITIALIZING",
            NodeMode::Untrusted => "UNTRUSTED",
            NodeMode::Deleting => "DELETING",
            NodeMode::Deleted => "DELETED",
            NodeMode::StorageNotExist => "STORAGE_NOT_EXIST",
            NodeMode::AuthFailed => "AUTH_FAILED",
            NodeMode::Decommissioned => "DECOMMISSIONED",
            NodeMode::Decommissioning => "DECOMMISSIONING",
            NodeMode::Migrating => "MIGRATING",
            NodeMode::N2nErrors => "N2N_ERRORS",
            NodeMode::GatewayErrors => "GATEWAY_ERRORS",
            NodeMode::IoErrors => "IO_ERRORS",
            NodeMode::NoCapacity => "NO_CAPACITY",
            NodeMode::LowCapacity => "LOW_CAPACITY",
            NodeMode::Optimal => "OPTIMAL",
        }
    }

    pub fn compare_rank(&self) -> usize {
        MODE_COMPARE_ORDER
            .iter()
            .position(|m| m == self)
            .unwrap_or(MODE_COMPARE_ORDER.len())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Accessibility {
    FullAccess,
    ReadOnly,
    #[default]
    NoAccess,
}

impl Accessibility {
    pub fn from_flags(
        readable: bool,
        writable: bool,
    ) -> Self {
        match (readable, writable) {
            (true, true) => Accessibility::FullAccess,
            (true, false) => Accessibility::ReadOnly,
            _ => Accessibility::NoAccess,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Accessibility::FullAccess => "FULL_ACCESS",
            Accessibility::ReadOnly => "READ_ONLY",
            Accessibility::NoAccess => "NO_ACCESS",
        }
    }
}

/// Consolidated host mode, also used for the storage and gateway subsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMode {
    #[default]
    Offline,
    Decommissioned,
    Decommissioning,
    Untrusted,
    Detention,
    HasIssues,
    NoCapacity,
    DataActivity,
    LowCapacity,
    Initializing,
    HttpSrvErrors,
    Optimal,
}

/// Display order used when sorting hosts by mode, best first
pub const HOST_MODE_COMPARE_ORDER: [HostMode; 12] = [
    HostMode::Optimal,
    HostMode::LowCapacity,
    HostMode::DataActivity,
    HostMode::NoCapacity,
    HostMode::Decommissioning,
    HostMode::Decommissioned,
    HostMode::HttpSrvErrors,
    HostMode::HasIssues,
    HostMode::Detention,
    HostMode::Untrusted,
    HostMode::Initializing,
    HostMode::Offline,
];

impl HostMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostMode::Offline => "OFFLINE",
            HostMode::Decommissioned => "DECOMMISSIONED",
            HostMode::Decommissioning => "DECOMMISSIONING",
            HostMode::Untrusted => "UNTRUSTED",
            HostMode::Detention => "DETENTION",
            HostMode::HasIssues => "HAS_ISSUES",
            HostMode::NoCapacity => "NO_CAPACITY",
            HostMode::DataActivity => "DATA_ACTIVITY",
            HostMode::LowCapacity => "LOW_CAPACITY",
            HostMode::Initializing => "INITIALIZING",
            HostMode::HttpSrvErrors => "HTTP_SRV_ERRORS",
            HostMode::Optimal => "OPTIMAL",
        }
    }

    pub fn compare_rank(&self) -> usize {
        HOST_MODE_COMPARE_ORDER
            .iter()
            .position(|m| m == self)
            .unwrap_or(HOST_MODE_COMPARE_ORDER.len())
    }
}
