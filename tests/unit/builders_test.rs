//! Tests for builder modules

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_resource_pool::builders::{build_pools, PoolBuilder};
use prometheus_resource_pool::config::{PoolConfig, PoolSetConfig};
use prometheus_resource_pool::core::{
    InMemoryEventSink, PoolError, PoolEventKind, PoolPhase, ResourceFactory,
};
use prometheus_resource_pool::runtime::TokioSpawner;

/// Hands out strings tagged with the pool they belong to.
struct LabelFactory {
    label: String,
}

#[async_trait]
impl ResourceFactory for LabelFactory {
    type Resource = String;
    type Error = Infallible;

    async fn create(&self) -> Result<String, Infallible> {
        Ok(self.label.clone())
    }

    async fn destroy(&self, _resource: String) -> Result<(), Infallible> {
        Ok(())
    }

    async fn validate(&self, _resource: &mut String) -> bool {
        true
    }
}

fn factory(label: &str) -> LabelFactory {
    LabelFactory {
        label: label.to_string(),
    }
}

#[test]
fn test_pool_builder_defaults() {
    let pool = PoolBuilder::new(factory("a")).build().unwrap();
    assert_eq!(pool.config(), &PoolConfig::default());
    assert_eq!(pool.phase(), PoolPhase::Initializing);
    assert_eq!(pool.subscriber_count(), 0);
}

#[test]
fn test_pool_builder_settings() {
    let pool = PoolBuilder::new(factory("a"))
        .name("cache")
        .min_size(1)
        .max_size(3)
        .acquire_timeout(Duration::from_millis(750))
        .validation_interval(Duration::from_secs(10))
        .subscriber(Arc::new(InMemoryEventSink::new(8)))
        .build()
        .unwrap();

    let cfg = pool.config();
    assert_eq!(cfg.name, "cache");
    assert_eq!((cfg.min_size, cfg.max_size), (1, 3));
    assert_eq!(cfg.acquire_timeout(), Duration::from_millis(750));
    assert_eq!(cfg.validation_interval(), Some(Duration::from_secs(10)));
    assert_eq!(pool.subscriber_count(), 1);
}

#[tokio::test]
async fn test_pool_builder_custom_spawner() {
    let sink = Arc::new(InMemoryEventSink::new(8));
    let pool = PoolBuilder::new(factory("a"))
        .max_size(1)
        .subscriber(sink.clone())
        .spawner(TokioSpawner::new(tokio::runtime::Handle::current()))
        .build()
        .unwrap();
    pool.initialize().await.unwrap();

    let conn = pool.acquire(None).await.unwrap();
    assert_eq!(conn.as_str(), "a");
    pool.release(conn).unwrap();
    assert_eq!(sink.count(PoolEventKind::Released), 1);
}

#[tokio::test]
async fn test_build_pools_names_each_pool() {
    let mut pools = HashMap::new();
    pools.insert("redis".to_string(), PoolConfig::new(2));
    pools.insert("postgres".to_string(), PoolConfig::new(4).with_min_size(1));
    let cfg = PoolSetConfig { pools };

    let built = build_pools(&cfg, |name, _| Ok(factory(name)), TokioSpawner::current()).unwrap();
    assert_eq!(built.len(), 2);
    assert_eq!(built["redis"].config().name, "redis");
    assert_ne!(built["redis"].id(), built["postgres"].id());

    let postgres = &built["postgres"];
    postgres.initialize().await.unwrap();
    let conn = postgres.acquire(None).await.unwrap();
    assert_eq!(conn.as_str(), "postgres");
    postgres.release(conn).unwrap();
}

#[test]
fn test_build_pools_propagates_factory_errors() {
    let mut pools = HashMap::new();
    pools.insert("broken".to_string(), PoolConfig::new(1));
    let cfg = PoolSetConfig { pools };

    let result = build_pools(
        &cfg,
        |_, _| Err::<LabelFactory, _>(PoolError::InvalidConfig("no credentials".into())),
        TokioSpawner::current(),
    );
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}
