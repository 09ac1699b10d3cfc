use super::*;

#[test]
fn detention_defaults_are_valid() {
    let config = DetentionConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.tampering_strikes, 1);
}

#[test]
fn detention_requires_at_least_one_strike() {
    let config = DetentionConfig {
        tampering_strikes: 0,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn capacity_percent_is_bounded() {
    let config = CapacityConfig {
        low_capacity_percent: 101,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn classified_pools_are_default_and_new_system() {
    let pools = PoolsConfig::default();
    assert!(pools.is_classified_pool("default_pool"));
    assert!(pools.is_classified_pool("first.pool"));
    assert!(!pools.is_classified_pool("archive"));
}
