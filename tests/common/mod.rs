//! Shared fixtures for pool integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use prometheus_resource_pool::builders::PoolBuilder;
use prometheus_resource_pool::core::{Pool, ResourceFactory};
use prometheus_resource_pool::runtime::TokioSpawner;

// ============================================================================
// MOCK CONNECTION + FACTORY
// ============================================================================

/// Stand-in for a network connection. `serial` is the creation ordinal.
#[derive(Debug)]
pub struct MockConn {
    pub serial: u64,
}

/// Counters and knobs shared between a test and the factory the pool owns.
#[derive(Default)]
pub struct Backend {
    pub created: AtomicU64,
    pub destroyed: AtomicU64,
    pub validated: AtomicU64,
    /// Serials destroyed, in order. Used to detect double destroys.
    pub destroyed_serials: Mutex<Vec<u64>>,
    /// Serials that fail validation.
    pub invalid: Mutex<HashSet<u64>>,
    /// Number of upcoming `create` calls that fail.
    pub failing_creates: AtomicUsize,
    /// Fail every `create` once this many handles exist.
    pub fail_once_created: Mutex<Option<u64>>,
    /// Fail every destroy call (the pool must only log it).
    pub failing_destroys: AtomicBool,
    /// Delay applied inside `create`, in milliseconds.
    pub create_delay_ms: AtomicU64,
    /// Delay applied inside `destroy` before it counts, in milliseconds.
    pub destroy_delay_ms: AtomicU64,
}

impl Backend {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn invalidate(&self, serial: u64) {
        self.invalid.lock().insert(serial);
    }

    pub fn fail_next_creates(&self, n: usize) {
        self.failing_creates.store(n, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap();
        self.create_delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_destroy_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap();
        self.destroy_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// True if no serial was destroyed twice.
    pub fn no_double_destroy(&self) -> bool {
        let serials = self.destroyed_serials.lock();
        let unique: HashSet<_> = serials.iter().collect();
        unique.len() == serials.len()
    }
}

pub struct MockFactory {
    backend: Arc<Backend>,
}

impl MockFactory {
    pub fn new() -> (Self, Arc<Backend>) {
        let backend = Arc::new(Backend::default());
        (
            Self {
                backend: Arc::clone(&backend),
            },
            backend,
        )
    }
}

#[async_trait]
impl ResourceFactory for MockFactory {
    type Resource = MockConn;
    type Error = io::Error;

    async fn create(&self) -> Result<MockConn, io::Error> {
        let delay = self.backend.create_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let failing = self
            .backend
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        let capped = self
            .backend
            .fail_once_created
            .lock()
            .is_some_and(|cap| self.backend.created.load(Ordering::SeqCst) >= cap);
        if failing.is_ok() || capped {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "backend unavailable"));
        }
        let serial = self.backend.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockConn { serial })
    }

    async fn destroy(&self, conn: MockConn) -> Result<(), io::Error> {
        let delay = self.backend.destroy_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.backend.destroyed.fetch_add(1, Ordering::SeqCst);
        self.backend.destroyed_serials.lock().push(conn.serial);
        if self.backend.failing_destroys.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "close failed"));
        }
        Ok(())
    }

    async fn validate(&self, conn: &mut MockConn) -> bool {
        self.backend.validated.fetch_add(1, Ordering::SeqCst);
        !self.backend.invalid.lock().contains(&conn.serial)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

pub type TestPool = Pool<MockFactory, TokioSpawner>;

/// Build an uninitialized pool over a fresh mock factory.
pub fn mock_pool(min_size: usize, max_size: usize) -> (TestPool, Arc<Backend>) {
    let (factory, backend) = MockFactory::new();
    let pool = PoolBuilder::new(factory)
        .name("mock")
        .min_size(min_size)
        .max_size(max_size)
        .acquire_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    (pool, backend)
}

/// Build and initialize a pool.
pub async fn running_pool(min_size: usize, max_size: usize) -> (TestPool, Arc<Backend>) {
    let (pool, backend) = mock_pool(min_size, max_size);
    pool.initialize().await.unwrap();
    (pool, backend)
}

/// Poll `cond` until it holds or `within` elapses.
pub async fn wait_until(within: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
