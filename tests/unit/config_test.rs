//! Tests for configuration validation

use std::io::Write;
use std::time::Duration;

use prometheus_resource_pool::config::{PoolConfig, PoolSetConfig, DEFAULT_ACQUIRE_TIMEOUT_MS};

#[test]
fn test_pool_config_validation() {
    let valid = PoolConfig::new(8).with_min_size(2);
    assert!(valid.validate().is_ok());
    assert_eq!(valid.acquire_timeout_ms, DEFAULT_ACQUIRE_TIMEOUT_MS);
}

#[test]
fn test_pool_config_invalid_max_size() {
    assert!(PoolConfig::new(0).validate().is_err());
}

#[test]
fn test_pool_config_min_above_max() {
    let invalid = PoolConfig::new(2).with_min_size(3);
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("min_size"));
}

#[test]
fn test_pool_config_invalid_timeout() {
    let invalid = PoolConfig {
        acquire_timeout_ms: 0,
        ..PoolConfig::new(4)
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_zero_validation_interval() {
    let invalid = PoolConfig::new(4).with_validation_interval(Duration::ZERO);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_from_json() {
    let cfg = PoolConfig::from_json_str(
        r#"{
            "name": "postgres",
            "min_size": 2,
            "max_size": 16,
            "acquire_timeout_ms": 1500,
            "validation_interval_ms": 30000
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.name, "postgres");
    assert_eq!(cfg.acquire_timeout(), Duration::from_millis(1500));
    assert_eq!(cfg.validation_interval(), Some(Duration::from_secs(30)));
}

#[test]
fn test_pool_config_from_json_rejects_missing_max_size() {
    let err = PoolConfig::from_json_str(r#"{ "min_size": 1 }"#).unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_pool_set_config_validation() {
    let cfg = PoolSetConfig::from_json_str(
        r#"{ "pools": { "redis": { "max_size": 4 }, "postgres": { "min_size": 1, "max_size": 8 } } }"#,
    )
    .unwrap();
    assert_eq!(cfg.pools.len(), 2);

    let empty = PoolSetConfig::from_json_str(r#"{ "pools": {} }"#);
    assert!(empty.is_err());

    let bad = PoolSetConfig::from_json_str(r#"{ "pools": { "redis": { "max_size": 0 } } }"#);
    assert!(bad.unwrap_err().contains("redis"));
}

#[test]
fn test_pool_set_config_from_file() {
    let path = std::env::temp_dir().join(format!("pool-set-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, r#"{{ "pools": {{ "cache": {{ "max_size": 3 }} }} }}"#).unwrap();
    drop(file);

    let cfg = PoolSetConfig::from_file(&path).unwrap();
    assert_eq!(cfg.pools["cache"].max_size, 3);
    std::fs::remove_file(&path).unwrap();

    let err = PoolSetConfig::from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("reading pool config"));
}
