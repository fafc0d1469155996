//! Configuration models for pools and pool sets.

pub mod pool;

pub use pool::{PoolConfig, PoolSetConfig, DEFAULT_ACQUIRE_TIMEOUT_MS};
