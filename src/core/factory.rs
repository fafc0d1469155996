//! Resource factory trait consumed by the pool.

use async_trait::async_trait;

use super::BoxError;

/// Creates, destroys and validates the handles a [`Pool`](crate::core::Pool) manages.
///
/// The pool never inspects `Resource`; every I/O step is delegated here and
/// runs outside the pool's state lock.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_resource_pool::core::ResourceFactory;
///
/// struct RedisFactory {
///     client: redis::Client,
/// }
///
/// #[async_trait]
/// impl ResourceFactory for RedisFactory {
///     type Resource = redis::aio::MultiplexedConnection;
///     type Error = redis::RedisError;
///
///     async fn create(&self) -> Result<Self::Resource, Self::Error> {
///         self.client.get_multiplexed_async_connection().await
///     }
///
///     async fn destroy(&self, _conn: Self::Resource) -> Result<(), Self::Error> {
///         Ok(())
///     }
///
///     async fn validate(&self, conn: &mut Self::Resource) -> bool {
///         redis::cmd("PING").query_async::<String>(conn).await.is_ok()
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    /// Handle type managed by the pool.
    type Resource: Send + 'static;

    /// Implementation-defined failure.
    type Error: Into<BoxError> + Send;

    /// Create a new handle.
    async fn create(&self) -> Result<Self::Resource, Self::Error>;

    /// Tear a handle down. Failures are logged by the pool, never propagated.
    async fn destroy(&self, resource: Self::Resource) -> Result<(), Self::Error>;

    /// Liveness check. `false` causes the handle to be destroyed and replaced.
    async fn validate(&self, resource: &mut Self::Resource) -> bool;
}
