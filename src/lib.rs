//! # Prometheus Resource Pool
//!
//! A generic, bounded, asynchronous resource pool for expensive-to-create,
//! reusable handles such as network connections.
//!
//! The pool keeps between `min_size` warm and `max_size` outstanding handles,
//! queues callers fairly once it is full, and shuts down through an orderly
//! drain. It never looks inside the handles it manages: construction,
//! teardown and liveness checks are delegated to a [`core::ResourceFactory`].
//!
//! ## Key Features
//!
//! - **Bounded**: `idle + in_use == total <= max_size` after every operation
//! - **Warm reuse**: idle handles are reused most-recently-released first
//! - **Fair queuing**: waiters are served strictly in arrival order, with
//!   per-call deadlines and cancellation that never leaks a slot
//! - **Direct handoff**: `release` passes a handle straight to the earliest
//!   waiter without re-validating it
//! - **Orderly drain**: rejects waiters, destroys idle handles, then waits for
//!   every in-use handle to come back
//! - **Validation sweep**: optional background pass that evicts dead idle
//!   handles and replenishes toward `min_size`
//! - **Events**: explicit subscriber registry plus a phase `watch` channel
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use prometheus_resource_pool::builders::PoolBuilder;
//!
//! let pool = PoolBuilder::new(MyConnectionFactory::new(url))
//!     .name("postgres")
//!     .min_size(2)
//!     .max_size(16)
//!     .acquire_timeout(Duration::from_secs(5))
//!     .build()?;
//! pool.initialize().await?;
//!
//! let conn = pool.acquire(None).await?;
//! conn.query("SELECT 1").await?;
//! pool.release(conn)?;
//!
//! pool.drain().await;
//! ```
//!
//! For complete examples, see:
//! - `tests/pool_scenarios_test.rs` - lifecycle and contention scenarios
//! - `tests/fairness_test.rs` - FIFO ordering and cancellation

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Pool state machine, bookkeeping and collaborator traits.
pub mod core;
/// Configuration models for pools and pool sets.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Runtime adapters for spawning background work.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::PoolBuilder;
pub use crate::config::PoolConfig;
pub use crate::core::{Pool, PoolError, PoolPhase, PoolStats, ResourceFactory, ResourceWrapper};
pub use crate::runtime::TokioSpawner;
