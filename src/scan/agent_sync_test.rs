use serde_json::json;

use super::*;
use crate::test_utils::online_item;
use crate::test_utils::test_catalog;
use crate::AgentConfigInfo;
use crate::AgentInfo;
use crate::AgentsConfig;
use crate::CapacityConfig;
use crate::Drive;
use crate::NodeHosting;
use crate::NodeItem;
use crate::NodeRole;
use crate::OsInfo;
use crate::RpcConfigUpdate;
use crate::StorageCounters;
use crate::GIB;

const NOW: u64 = 1_000_000;

fn storage_info(total: u64) -> AgentInfo {
    AgentInfo {
        name: "agent".into(),
        host_id: "host-1".into(),
        version: "1.0.0".into(),
        ip: "10.0.0.7".into(),
        role: NodeRole::Storage,
        storage: StorageCounters {
            total,
            free: total / 2,
            ..Default::default()
        },
        drives: vec![Drive {
            mount: "/data".into(),
            drive_id: "d1".into(),
            storage: StorageCounters::default(),
        }],
        ..Default::default()
    }
}

fn agent_config(
    use_storage: bool,
    use_s3: bool,
    exclude: &[&str],
) -> AgentConfigInfo {
    AgentConfigInfo {
        id: "cfg".into(),
        pool: None,
        use_storage,
        use_s3,
        exclude_drives: exclude.iter().map(|d| d.to_string()).collect(),
    }
}

fn item_with_info(info: AgentInfo) -> NodeItem {
    let (mut item, _agent) = online_item("n1", NOW);
    item.agent_info = Some(info);
    item
}

#[test]
fn test_merge_agent_info_copies_reported_fields() {
    let (mut item, _agent) = online_item("n1", 0);
    let info = storage_info(100 * GIB);

    merge_agent_info(&mut item.node, &info, NOW);

    assert_eq!(item.node.version, "1.0.0");
    assert_eq!(item.node.ip, "10.0.0.7");
    assert_eq!(item.node.storage.total, 100 * GIB);
    assert_eq!(item.node.drives.len(), 1);
    assert_eq!(item.node.heartbeat, NOW);
    // Name is reconciled through the registry, not copied
    assert_eq!(item.node.name, "node-n1");
}

/// # Case 1: Enable policy for new agents
///
/// ## Validation criteria:
/// 1. Storage needs the minimum total and a non-excluded first drive
/// 2. Gateways need an agent config that enables S3
#[test]
fn test_enable_policy() {
    let capacity = CapacityConfig::default();
    let big = storage_info(100 * GIB);
    let small = storage_info(GIB);

    assert!(should_enable_agent(&big, None, &capacity));
    assert!(!should_enable_agent(&small, None, &capacity));
    assert!(should_enable_agent(&big, Some(&agent_config(true, false, &[])), &capacity));
    assert!(!should_enable_agent(&big, Some(&agent_config(false, true, &[])), &capacity));
    assert!(!should_enable_agent(&big, Some(&agent_config(true, false, &["/data"])), &capacity));

    let gateway = AgentInfo {
        role: NodeRole::Gateway,
        ..storage_info(0)
    };
    assert!(!should_enable_agent(&gateway, None, &capacity));
    assert!(should_enable_agent(&gateway, Some(&agent_config(false, true, &[])), &capacity));
}

#[test]
fn test_windows_excluded_drive_matches_by_letter() {
    let capacity = CapacityConfig::default();
    let mut info = storage_info(100 * GIB);
    info.drives[0].mount = "C:\\".into();
    info.os_info = Some(OsInfo {
        platform: "Windows_NT".into(),
        ..Default::default()
    });

    assert!(!should_enable_agent(&info, Some(&agent_config(true, false, &["c:"])), &capacity));
    assert!(should_enable_agent(&info, Some(&agent_config(true, false, &["d:"])), &capacity));
}

#[test]
fn test_service_update_follows_decommissioned_flag() {
    let (mut item, _agent) = online_item("n1", NOW);
    assert_eq!(service_update(&item), None);

    item.node.decommissioned = Some(NOW);
    assert_eq!(service_update(&item), Some(false));

    item.node.enabled = false;
    assert_eq!(service_update(&item), None);
}

/// # Case 2: Only differing addressing fields are pushed
#[test]
fn test_rpc_config_update_sends_changed_fields() {
    let agents = AgentsConfig::default();
    let catalog = test_catalog()
        .with_base_address("wss://10.0.0.100:8443")
        .with_n2n_config(json!({ "tcp_active": true }));
    let mut info = storage_info(100 * GIB);
    info.base_address = Some("WSS://10.0.0.100:8443".into());
    let item = item_with_info(info);

    let update = rpc_config_update(&item, &catalog, &agents);

    assert_eq!(update.rpc_address.as_deref(), Some("n2n://peer-n1"));
    // Base address matches ignoring case
    assert!(update.base_address.is_none());
    assert_eq!(update.n2n_config, Some(json!({ "tcp_active": true })));
}

#[test]
fn test_rpc_config_update_is_empty_when_in_sync() {
    let agents = AgentsConfig::default();
    let catalog = test_catalog().with_base_address("wss://10.0.0.100:8443");
    let mut info = storage_info(100 * GIB);
    info.rpc_address = Some("n2n://peer-n1".into());
    info.base_address = Some("wss://10.0.0.100:8443".into());
    info.n2n_config = Some(json!({}));
    let item = item_with_info(info);

    assert!(rpc_config_update(&item, &catalog, &agents).is_empty());
}

#[test]
fn test_localhost_base_address_is_kept() {
    let agents = AgentsConfig::default();
    let catalog = test_catalog().with_base_address("wss://10.0.0.100:8443");
    let mut info = storage_info(100 * GIB);
    info.base_address = Some("wss://localhost:8443".into());
    let item = item_with_info(info);

    assert!(rpc_config_update(&item, &catalog, &agents).base_address.is_none());
}

#[test]
fn test_pending_or_unreported_nodes_get_no_update() {
    let agents = AgentsConfig::default();
    let catalog = test_catalog();
    let (item, _agent) = online_item("n1", NOW);
    assert!(rpc_config_update(&item, &catalog, &agents).is_empty());

    let pending = NodeItem {
        agent_info: Some(storage_info(100 * GIB)),
        ..NodeItem::pending(item.node.clone())
    };
    assert!(rpc_config_update(&pending, &catalog, &agents).is_empty());
}

#[test]
fn test_passive_port_for_platform_agents() {
    let agents = AgentsConfig::default();
    let merged = desired_n2n_config(
        Some(&json!({ "a": 1 })),
        Some(json!({ "b": 2 })),
        NodeHosting::Cloud,
        &agents,
    );
    assert_eq!(
        merged,
        json!({ "a": 1, "b": 2, "tcp_permanent_passive": { "port": agents.cloud_n2n_port } })
    );

    let pool_backed = desired_n2n_config(None, None, NodeHosting::PoolBacked, &agents);
    assert_eq!(
        pool_backed["tcp_permanent_passive"]["port"],
        json!(agents.pool_backed_n2n_port)
    );
    assert_eq!(desired_n2n_config(None, None, NodeHosting::Agent, &agents), json!({}));
}

#[test]
fn test_apply_rpc_config_updates_record() {
    let (mut item, _agent) = online_item("n1", NOW);
    let update = RpcConfigUpdate {
        rpc_address: Some("n2n://peer-n1".into()),
        base_address: None,
        n2n_config: Some(json!({ "x": 1 })),
    };

    apply_rpc_config(&mut item.node, &update);

    assert_eq!(item.node.rpc_address.as_deref(), Some("n2n://peer-n1"));
    assert_eq!(item.node.n2n_config, Some(json!({ "x": 1 })));
}
