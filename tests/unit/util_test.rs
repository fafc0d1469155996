//! Tests for utility functions

use prometheus_resource_pool::core::{PoolPhase, PoolStats};
use prometheus_resource_pool::util::{init_tracing, now_ms, DEFAULT_LOG_FILTER};

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(a > 0);
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_repeatable() {
    init_tracing();
    init_tracing();
    assert!(DEFAULT_LOG_FILTER.starts_with("prometheus_resource_pool"));
}

#[test]
fn test_phase_ordering() {
    assert!(PoolPhase::Initializing < PoolPhase::Running);
    assert!(PoolPhase::Running < PoolPhase::Draining);
    assert!(PoolPhase::Draining < PoolPhase::Closed);
    assert!(PoolPhase::Closed.is_draining());
    assert!(!PoolPhase::Running.is_draining());
}

#[test]
fn test_stats_serialize() {
    let stats = PoolStats {
        total: 3,
        idle: 1,
        in_use: 2,
        waiting: 0,
    };
    let json = serde_json::to_string(&stats).unwrap();
    assert_eq!(json, r#"{"total":3,"idle":1,"in_use":2,"waiting":0}"#);
}
