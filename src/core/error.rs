//! Error types for pool operations.

use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by a [`ResourceFactory`](crate::core::ResourceFactory).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced to callers of pool operations.
///
/// Validation failures and best-effort destroy failures never appear here;
/// the pool logs them and replaces the affected resource.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The factory failed to create a resource. No slot was consumed.
    #[error("resource creation failed: {0}")]
    ResourceCreation(#[source] BoxError),
    /// The waiter's deadline elapsed before a resource became available.
    #[error("timed out after {0:?} waiting for a resource")]
    AcquireTimeout(Duration),
    /// The pool is draining or closed.
    #[error("pool closed")]
    PoolClosed,
    /// The released handle is not tracked as in-use by this pool.
    #[error("invalid release of resource {0}")]
    InvalidRelease(u64),
    /// `initialize()` was called on a pool that left the initializing phase.
    #[error("pool already initialized")]
    AlreadyInitialized,
    /// Configuration values were rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    /// Wrap a factory error as a creation failure.
    pub fn creation(err: impl Into<BoxError>) -> Self {
        Self::ResourceCreation(err.into())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
