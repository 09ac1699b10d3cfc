use super::*;

fn pool(
    id: &str,
    hosting: NodeHosting,
) -> PoolInfo {
    PoolInfo {
        id: id.to_string(),
        name: format!("{id}-name"),
        hosting,
    }
}

#[test]
fn test_pool_lookup_by_id_and_name() {
    let catalog = StaticSystemCatalog::new("sys")
        .with_pool(pool("p1", NodeHosting::Agent))
        .with_pool(pool("cloud", NodeHosting::Cloud));

    assert_eq!(catalog.pool("p1").map(|p| p.name), Some("p1-name".to_string()));
    assert!(catalog.pool_by_name("cloud-name").unwrap().is_resource_pool());
    assert!(catalog.pool("missing").is_none());
    assert_eq!(catalog.pools().len(), 2);
}

#[test]
fn test_add_pool_replaces_same_id() {
    let catalog = StaticSystemCatalog::new("sys").with_pool(pool("p1", NodeHosting::Agent));
    catalog.add_pool(pool("p1", NodeHosting::PoolBacked));

    assert_eq!(catalog.pools().len(), 1);
    assert!(catalog.pool("p1").unwrap().is_resource_pool());
}

#[test]
fn test_master_and_maintenance_flags() {
    let catalog = StaticSystemCatalog::new("sys");
    assert!(catalog.is_master());
    assert!(!catalog.in_maintenance());

    catalog.set_master(false, Some("10.0.0.1".into()));
    catalog.set_maintenance(true);

    assert!(!catalog.is_master());
    assert_eq!(catalog.master_address().as_deref(), Some("10.0.0.1"));
    assert!(catalog.in_maintenance());
}

#[test]
fn test_issued_tokens_are_unique() {
    let catalog = StaticSystemCatalog::new("sys");
    let id = NodeId::new("n1");
    assert_ne!(catalog.issue_auth_token(&id), catalog.issue_auth_token(&id));
    assert!(catalog.issue_create_node_token("p1").starts_with("sys.create.p1."));
}
