use serde_json::json;
use serde_json::Map;
use serde_json::Value;

use crate::AgentConfigInfo;
use crate::AgentInfo;
use crate::AgentsConfig;
use crate::CapacityConfig;
use crate::NodeHosting;
use crate::NodeItem;
use crate::NodeRecord;
use crate::NodeRole;
use crate::RpcConfigUpdate;
use crate::SystemCatalog;

/// Copies the agent-reported fields onto the record. Name and host id are
/// reconciled separately since they touch the registry indexes.
pub fn merge_agent_info(
    node: &mut NodeRecord,
    info: &AgentInfo,
    now: u64,
) {
    node.version = info.version.clone();
    node.ip = info.ip.clone();
    node.base_address = info.base_address.clone();
    node.rpc_address = info.rpc_address.clone();
    node.n2n_config = info.n2n_config.clone();
    node.geolocation = info.geolocation.clone();
    node.role = info.role;
    node.storage = info.storage.clone();
    node.drives = info.drives.clone();
    node.os_info = info.os_info.clone();
    node.debug_level = info.debug_level;
    node.enabled = info.enabled;
    node.permission_tampering = info.permission_tampering;
    node.heartbeat = now;
}

/// Whether a newly seen agent may serve under its install-time config.
///
/// Without an agent config, storage agents are allowed and gateways are not.
pub fn should_enable_agent(
    info: &AgentInfo,
    agent_config: Option<&AgentConfigInfo>,
    capacity: &CapacityConfig,
) -> bool {
    match info.role {
        NodeRole::Gateway => agent_config.is_some_and(|config| config.use_s3),
        NodeRole::Storage => {
            if agent_config.is_some_and(|config| !config.use_storage) {
                return false;
            }
            if info.storage.total < capacity.minimum_agent_total_storage {
                return false;
            }
            let excluded = agent_config.map(|c| c.exclude_drives.as_slice()).unwrap_or_default();
            let windows = info
                .os_info
                .as_ref()
                .is_some_and(|os| os.platform.to_ascii_lowercase().starts_with("win"));
            match info.drives.first() {
                Some(drive) => !excluded
                    .iter()
                    .any(|mount| same_mount(mount, &drive.mount, windows)),
                None => true,
            }
        }
    }
}

/// Windows mounts compare by drive letter, case-insensitively
fn same_mount(
    excluded: &str,
    mount: &str,
    windows: bool,
) -> bool {
    if !windows {
        return excluded == mount;
    }
    let letter = |m: &str| m.trim_end_matches(['\\', '/']).trim_end_matches(':').to_ascii_lowercase();
    letter(excluded) == letter(mount)
}

/// Desired service state when it differs from what the agent reports
pub fn service_update(item: &NodeItem) -> Option<bool> {
    let should_enable = item.node.decommissioned.is_none();
    (item.node.enabled != should_enable).then_some(should_enable)
}

/// Addressing fields that differ from what the agent reported.
///
/// Empty when the node is pending or has not reported its info yet.
pub fn rpc_config_update(
    item: &NodeItem,
    catalog: &dyn SystemCatalog,
    agents: &AgentsConfig,
) -> RpcConfigUpdate {
    let mut update = RpcConfigUpdate::default();
    let Some(info) = item.agent_info.as_ref() else {
        return update;
    };
    if !item.is_persisted() {
        return update;
    }
    let node = &item.node;

    let rpc_address = format!("{}://{}", agents.rpc_protocol, node.peer_id);
    if info.rpc_address.as_deref() != Some(rpc_address.as_str()) {
        update.rpc_address = Some(rpc_address);
    }

    if let Some(base_address) = catalog.base_address() {
        let current = info.base_address.as_deref().unwrap_or_default();
        if node.hosting != NodeHosting::Internal
            && !is_localhost(current)
            && !current.eq_ignore_ascii_case(&base_address)
        {
            update.base_address = Some(base_address);
        }
    }

    let n2n_config = desired_n2n_config(info.n2n_config.as_ref(), catalog.n2n_config(), node.hosting, agents);
    if info.n2n_config.as_ref() != Some(&n2n_config) {
        update.n2n_config = Some(n2n_config);
    }
    update
}

/// Agent n2n config overlaid with the system one. Platform-started agents
/// listen on a fixed passive port.
pub fn desired_n2n_config(
    agent: Option<&Value>,
    system: Option<Value>,
    hosting: NodeHosting,
    agents: &AgentsConfig,
) -> Value {
    let mut merged: Map<String, Value> = agent
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(Value::Object(system)) = system {
        merged.extend(system);
    }
    let passive_port = match hosting {
        NodeHosting::Cloud => Some(agents.cloud_n2n_port),
        NodeHosting::PoolBacked => Some(agents.pool_backed_n2n_port),
        NodeHosting::Agent | NodeHosting::Internal => None,
    };
    if let Some(port) = passive_port {
        merged.insert("tcp_permanent_passive".to_string(), json!({ "port": port }));
    }
    Value::Object(merged)
}

/// Applies an accepted rpc config push to the record
pub fn apply_rpc_config(
    node: &mut NodeRecord,
    update: &RpcConfigUpdate,
) {
    if let Some(rpc_address) = &update.rpc_address {
        node.rpc_address = Some(rpc_address.clone());
    }
    if let Some(base_address) = &update.base_address {
        node.base_address = Some(base_address.clone());
    }
    if let Some(n2n_config) = &update.n2n_config {
        node.n2n_config = Some(n2n_config.clone());
    }
}

fn is_localhost(address: &str) -> bool {
    let rest = address
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(address);
    let host = rest.split(['/', ':']).next().unwrap_or_default();
    matches!(host, "localhost" | "127.0.0.1")
}
