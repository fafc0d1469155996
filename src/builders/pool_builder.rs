//! Builders to construct resource pools from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{PoolConfig, PoolSetConfig};
use crate::core::{EventSink, Pool, PoolError, ResourceFactory, Spawn};
use crate::runtime::TokioSpawner;

/// Fluent construction of a single [`Pool`].
///
/// ```rust,ignore
/// let pool = PoolBuilder::new(factory)
///     .name("postgres")
///     .min_size(2)
///     .max_size(16)
///     .acquire_timeout(Duration::from_secs(2))
///     .subscriber(Arc::new(InMemoryEventSink::new(256)))
///     .build()?;
/// pool.initialize().await?;
/// ```
pub struct PoolBuilder<F, S = TokioSpawner> {
    config: PoolConfig,
    factory: F,
    spawner: S,
    subscribers: Vec<Arc<dyn EventSink>>,
}

impl<F: ResourceFactory> PoolBuilder<F> {
    /// Start from default configuration, spawning on the current tokio runtime.
    pub fn new(factory: F) -> Self {
        Self {
            config: PoolConfig::default(),
            factory,
            spawner: TokioSpawner::current(),
            subscribers: Vec::new(),
        }
    }
}

impl<F: ResourceFactory, S> PoolBuilder<F, S> {
    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pool name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the warm size.
    #[must_use]
    pub fn min_size(mut self, min_size: usize) -> Self {
        self.config.min_size = min_size;
        self
    }

    /// Set the upper bound.
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.max_size = max_size;
        self
    }

    /// Set the default acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_acquire_timeout(timeout);
        self
    }

    /// Enable the validation sweep.
    #[must_use]
    pub fn validation_interval(mut self, interval: Duration) -> Self {
        self.config = self.config.with_validation_interval(interval);
        self
    }

    /// Register an event subscriber at construction time.
    #[must_use]
    pub fn subscriber(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.subscribers.push(sink);
        self
    }

    /// Use a different spawner for background work.
    pub fn spawner<S2>(self, spawner: S2) -> PoolBuilder<F, S2> {
        PoolBuilder {
            config: self.config,
            factory: self.factory,
            spawner,
            subscribers: self.subscribers,
        }
    }
}

impl<F, S> PoolBuilder<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    /// Validate the configuration and create the pool (still `Initializing`).
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidConfig`] if the configuration is invalid.
    pub fn build(self) -> Result<Pool<F, S>, PoolError> {
        let pool = Pool::new(self.config, self.factory, self.spawner)?;
        for sink in self.subscribers {
            pool.subscribe(sink);
        }
        Ok(pool)
    }
}

/// Build one pool per entry of a [`PoolSetConfig`], naming each after its key.
///
/// # Errors
/// Fails on invalid configuration or when `factory_for` fails for any pool.
pub fn build_pools<F, S, FF>(
    cfg: &PoolSetConfig,
    mut factory_for: FF,
    spawner: S,
) -> Result<HashMap<String, Pool<F, S>>, PoolError>
where
    F: ResourceFactory,
    S: Spawn + Clone + Send + Sync + 'static,
    FF: FnMut(&str, &PoolConfig) -> Result<F, PoolError>,
{
    cfg.validate().map_err(PoolError::InvalidConfig)?;

    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        let factory = factory_for(name, pool_cfg)?;
        let config = pool_cfg.clone().with_name(name.clone());
        let pool = Pool::new(config, factory, spawner.clone())?;
        pools.insert(name.clone(), pool);
    }

    Ok(pools)
}
