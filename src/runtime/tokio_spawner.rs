//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use crate::core::Spawn;

/// Tokio-based spawner for the pool's background work.
///
/// [`current`](Self::current) remembers the runtime it was created in, so
/// work can be spawned from plain threads later on. Without a remembered
/// handle, the runtime current at spawn time is used; with neither, the
/// future is dropped and a warning logged.
#[derive(Clone, Default)]
pub struct TokioSpawner {
    handle: Option<Handle>,
    // Keeps a dedicated runtime alive for as long as any clone exists.
    runtime: Option<Arc<tokio::runtime::Runtime>>,
}

impl TokioSpawner {
    /// Spawn onto the runtime behind `handle`.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self {
            handle: Some(handle),
            runtime: None,
        }
    }

    /// Spawn onto the runtime this is called from, if any.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: Handle::try_current().ok(),
            runtime: None,
        }
    }

    /// Create a spawner backed by its own multi-threaded runtime.
    ///
    /// The runtime shuts down when the last clone is dropped, which must
    /// happen outside of an async context.
    #[cfg(feature = "tokio-runtime")]
    pub fn with_worker_threads(worker_threads: usize) -> Result<Self, std::io::Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("resource-pool-bg")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: Some(runtime.handle().clone()),
            runtime: Some(Arc::new(runtime)),
        })
    }

    /// Dedicated runtime sized to the number of CPUs.
    #[cfg(feature = "tokio-runtime")]
    pub fn dedicated() -> Result<Self, std::io::Error> {
        Self::with_worker_threads(num_cpus::get())
    }

    /// True if this spawner owns its runtime.
    #[must_use]
    pub const fn is_dedicated(&self) -> bool {
        self.runtime.is_some()
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(handle) = &self.handle {
            handle.spawn(fut);
            return;
        }
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(fut);
            }
            Err(err) => warn!("no tokio runtime to spawn background work on: {}", err),
        }
    }
}
