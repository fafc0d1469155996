//! Bounded asynchronous resource pool.
//!
//! All bookkeeping lives in one `parking_lot::Mutex<PoolState>`. Factory
//! calls (`create`, `validate`, `destroy`) always run with the lock released;
//! the slot they work on is reserved beforehand and settled afterwards by a
//! [`Reservation`] guard, which also rolls the slot back if the acquiring
//! future is dropped mid-call. Destroys are tracked by [`PendingDestroy`] so
//! the pool only reports `Closed` once the last one has finished.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::core::events::{EventSink, PoolEventKind, Subscribers, SubscriptionId};
use crate::core::state::{CheckIn, Checkout, PoolState, Retry, SlotRelease};
use crate::core::sweep::{self, SweepReport};
use crate::core::waiter::Grant;
use crate::core::{BoxError, PoolError, PoolPhase, PoolStats, ResourceFactory, ResourceWrapper};

/// Deadline used when `now + timeout` overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Abstraction for spawning background work on a runtime.
///
/// The pool spawns best-effort destroys and the validation sweep through it,
/// so `release` never has to suspend. `spawn` may be called from any thread;
/// an implementation that cannot run the future should drop it rather than
/// panic.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Shared pool internals.
pub(crate) struct PoolInner<F: ResourceFactory, S> {
    pub(crate) id: Uuid,
    pub(crate) config: PoolConfig,
    pub(crate) factory: F,
    pub(crate) spawner: S,
    pub(crate) state: Mutex<PoolState<F::Resource>>,
    pub(crate) phase_tx: watch::Sender<PoolPhase>,
    pub(crate) subscribers: Subscribers,
}

impl<F, S> PoolInner<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    /// Run `f` inside the serialization domain, then publish any phase change.
    pub(crate) fn update<T>(&self, f: impl FnOnce(&mut PoolState<F::Resource>) -> T) -> T {
        let (out, before, after) = {
            let mut state = self.state.lock();
            let before = state.phase();
            let out = f(&mut state);
            (out, before, state.phase())
        };
        if after != before {
            // Phases only move forward; a late publisher must not roll one back.
            self.phase_tx.send_if_modified(|current| {
                if after > *current {
                    *current = after;
                    true
                } else {
                    false
                }
            });
            if before < PoolPhase::Draining && after.is_draining() {
                self.publish(PoolEventKind::DrainStarted, None);
            }
            if after == PoolPhase::Closed {
                info!(pool = %self.config.name, "pool closed");
                self.publish(PoolEventKind::Closed, None);
            }
        }
        out
    }

    pub(crate) fn phase(&self) -> PoolPhase {
        self.state.lock().phase()
    }

    pub(crate) fn publish(&self, kind: PoolEventKind, resource_id: Option<u64>) {
        self.subscribers.publish(&self.config.name, kind, resource_id);
    }

    /// Destroy a handle in the background, counting it in flight first.
    pub(crate) fn spawn_destroy(self: &Arc<Self>, entry: ResourceWrapper<F::Resource>) {
        self.spawner.spawn(PendingDestroy::start(self, entry).run());
    }

    /// Carry out what a check-in left to do once the lock is released.
    pub(crate) fn settle(self: &Arc<Self>, outcome: CheckIn<F::Resource>, id: u64) {
        match outcome {
            CheckIn::HandedOff(waiter) => {
                debug!(pool = %self.config.name, resource = id, waiter, "handed resource to waiter");
                self.publish(PoolEventKind::HandedOff, Some(id));
            }
            CheckIn::Idled => {
                debug!(pool = %self.config.name, resource = id, "resource returned to idle");
                self.publish(PoolEventKind::Released, Some(id));
            }
            CheckIn::Destroy(entry) => {
                self.spawner.spawn(PendingDestroy::counted(self, entry).run());
            }
        }
    }

    /// Return a handle that never reached a caller.
    pub(crate) fn restore(self: &Arc<Self>, entry: ResourceWrapper<F::Resource>) {
        let id = entry.id();
        let outcome = self.update(|state| state.restore(entry));
        self.settle(outcome, id);
    }

    /// Give up a reserved slot holding no handle.
    pub(crate) fn release_slot(&self) {
        if let SlotRelease::HandedOff(waiter) = self.update(PoolState::release_slot) {
            debug!(pool = %self.config.name, waiter, "handed creation slot to waiter");
        }
    }
}

/// A destroy counted in flight by `PoolState` until this guard goes away.
///
/// Dropping it without [`run`](Self::run), as happens when a spawner cannot
/// take the task, drops the handle without a factory destroy but still
/// settles the count, so drain cannot hang on it.
pub(crate) struct PendingDestroy<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    pool: Arc<PoolInner<F, S>>,
    entry: Option<ResourceWrapper<F::Resource>>,
}

impl<F, S> PendingDestroy<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    /// Wrap a handle the state already counts as being destroyed.
    pub(crate) fn counted(
        pool: &Arc<PoolInner<F, S>>,
        entry: ResourceWrapper<F::Resource>,
    ) -> Self {
        Self {
            pool: Arc::clone(pool),
            entry: Some(entry),
        }
    }

    /// Count a new destroy in flight and wrap the handle.
    pub(crate) fn start(
        pool: &Arc<PoolInner<F, S>>,
        entry: ResourceWrapper<F::Resource>,
    ) -> Self {
        pool.update(PoolState::destroy_started);
        Self::counted(pool, entry)
    }

    /// Tear the handle down, logging (never propagating) failures.
    pub(crate) async fn run(mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        let pool = Arc::clone(&self.pool);
        let id = entry.id();
        match pool.factory.destroy(entry.into_resource()).await {
            Ok(()) => debug!(pool = %pool.config.name, resource = id, "destroyed resource"),
            Err(err) => {
                let err: BoxError = err.into();
                error!(pool = %pool.config.name, resource = id, "failed to destroy resource: {}", err);
            }
        }
        pool.publish(PoolEventKind::Destroyed, Some(id));
    }
}

impl<F, S> Drop for PendingDestroy<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            warn!(pool = %self.pool.config.name, resource = entry.id(), "resource dropped without destroy");
        }
        self.pool.update(PoolState::destroy_finished);
    }
}

/// A slot counted in `total`/`in_use` that must be settled exactly once.
///
/// Dropping an armed reservation returns its handle to the pool, or releases
/// the empty slot (passing it to the earliest waiter when one is queued).
pub(crate) struct Reservation<'a, F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    pool: &'a Arc<PoolInner<F, S>>,
    entry: Option<ResourceWrapper<F::Resource>>,
    armed: bool,
}

impl<'a, F, S> Reservation<'a, F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    pub(crate) fn empty(pool: &'a Arc<PoolInner<F, S>>) -> Self {
        Self {
            pool,
            entry: None,
            armed: true,
        }
    }

    pub(crate) fn holding(
        pool: &'a Arc<PoolInner<F, S>>,
        entry: ResourceWrapper<F::Resource>,
    ) -> Self {
        Self {
            pool,
            entry: Some(entry),
            armed: true,
        }
    }

    pub(crate) fn attach(&mut self, entry: ResourceWrapper<F::Resource>) {
        self.entry = Some(entry);
    }

    pub(crate) fn take(&mut self) -> Option<ResourceWrapper<F::Resource>> {
        self.entry.take()
    }

    pub(crate) fn resource_mut(&mut self) -> Option<&mut F::Resource> {
        self.entry.as_deref_mut()
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl<F, S> Drop for Reservation<'_, F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.entry.take() {
            Some(entry) => self.pool.restore(entry),
            None => self.pool.release_slot(),
        }
    }
}

/// A queued acquire. Dropping it unresolved removes it from the queue, or
/// returns whatever was granted to it in the meantime.
struct QueuedWaiter<'a, F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    pool: &'a Arc<PoolInner<F, S>>,
    id: u64,
    rx: oneshot::Receiver<Grant<F::Resource>>,
    settled: bool,
}

impl<F, S> QueuedWaiter<'_, F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    async fn wait(mut self, deadline: Instant) -> Grant<F::Resource> {
        let outcome = tokio::time::timeout_at(deadline, &mut self.rx).await;
        self.settled = true;
        match outcome {
            Ok(Ok(grant)) => grant,
            // Sender dropped without a grant: only happens if the queue was torn down.
            Ok(Err(_)) => Grant::Closed,
            Err(_) => {
                let id = self.id;
                let rx = &mut self.rx;
                self.pool.update(|state| {
                    if state.remove_waiter(id) {
                        Grant::TimedOut
                    } else {
                        // Granted under the lock after our timer fired.
                        rx.try_recv().unwrap_or(Grant::TimedOut)
                    }
                })
            }
        }
    }
}

impl<F, S> Drop for QueuedWaiter<'_, F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let id = self.id;
        let rx = &mut self.rx;
        let leftover = self.pool.update(|state| {
            if state.remove_waiter(id) {
                None
            } else {
                rx.close();
                rx.try_recv().ok()
            }
        });
        match leftover {
            Some(Grant::Resource(entry)) => self.pool.restore(entry),
            Some(Grant::Slot) => self.pool.release_slot(),
            _ => {}
        }
        debug!(pool = %self.pool.config.name, waiter = id, "queued acquire cancelled");
    }
}

/// Generic bounded resource pool.
///
/// Keeps between `min_size` warm and `max_size` outstanding handles of
/// `F::Resource`, serving acquire calls in arrival order once the pool is
/// full. Cloning is cheap and yields another handle to the same pool.
///
/// Lifecycle: `Initializing → Running → Draining → Closed`. The composing
/// process owns it: call [`initialize`](Self::initialize) once, share clones,
/// and finish with [`drain`](Self::drain).
pub struct Pool<F, S>
where
    F: ResourceFactory,
{
    inner: Arc<PoolInner<F, S>>,
}

impl<F: ResourceFactory, S> Clone for Pool<F, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ResourceFactory, S> fmt::Debug for Pool<F, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pool")
            .field("name", &self.inner.config.name)
            .field("id", &self.inner.id)
            .field("phase", &state.phase())
            .field("stats", &state.stats())
            .finish()
    }
}

impl<F, S> Pool<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    /// Create a pool in the `Initializing` phase.
    ///
    /// # Errors
    /// Returns [`PoolError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: PoolConfig, factory: F, spawner: S) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let id = Uuid::new_v4();
        let (phase_tx, _) = watch::channel(PoolPhase::Initializing);
        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                state: Mutex::new(PoolState::new(id, config.min_size, config.max_size)),
                config,
                factory,
                spawner,
                phase_tx,
                subscribers: Subscribers::default(),
            }),
        })
    }

    /// Pool instance id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Configuration the pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> PoolPhase {
        self.inner.phase()
    }

    /// Channel publishing every phase transition.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<PoolPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Snapshot of `{total, idle, in_use, waiting}`. Never blocks on I/O.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.state.lock().stats()
    }

    /// Register an event subscriber.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        self.inner.subscribers.subscribe(sink)
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Warm the pool to `min_size` and enter `Running`.
    ///
    /// Starts the validation sweep when a `validation_interval` is configured.
    ///
    /// # Errors
    /// - [`PoolError::AlreadyInitialized`] if called twice.
    /// - [`PoolError::ResourceCreation`] with the first factory error; every
    ///   handle created so far is destroyed and the pool stays `Initializing`.
    /// - [`PoolError::PoolClosed`] if drain started before warming finished.
    pub async fn initialize(&self) -> Result<(), PoolError> {
        let inner = &self.inner;
        inner.update(PoolState::begin_initialize)?;

        let mut warmed = Vec::new();
        while inner.update(PoolState::reserve_toward_min) {
            let mut slot = Reservation::empty(inner);
            match inner.factory.create().await {
                Ok(resource) => {
                    let entry = inner.update(|state| state.wrap(resource));
                    inner.publish(PoolEventKind::Created, Some(entry.id()));
                    slot.attach(entry);
                    warmed.push(slot);
                }
                Err(err) => {
                    let err = PoolError::creation(err);
                    error!(pool = %inner.config.name, warmed = warmed.len(), "pool initialization failed: {}", err);
                    drop(slot);
                    for mut slot in warmed {
                        if let Some(entry) = slot.take() {
                            PendingDestroy::start(inner, entry).run().await;
                        }
                    }
                    inner.update(PoolState::abort_initialize);
                    return Err(err);
                }
            }
        }

        let count = warmed.len();
        // Dropping an armed reservation restores its handle to idle.
        drop(warmed);
        if !inner.update(PoolState::mark_running) {
            return Err(PoolError::PoolClosed);
        }
        info!(pool = %inner.config.name, warm = count, max = inner.config.max_size, "pool initialized");

        if let Some(interval) = inner.config.validation_interval() {
            sweep::spawn_validation_sweep(inner, interval);
        }
        Ok(())
    }

    /// Check out a handle.
    ///
    /// `timeout` overrides the configured acquire timeout; `Duration::ZERO`
    /// fails immediately when no handle can be had without waiting. Waiters
    /// are served strictly in arrival order. Dropping the returned future
    /// abandons the request without leaking its slot.
    ///
    /// # Errors
    /// - [`PoolError::PoolClosed`] once drain has started.
    /// - [`PoolError::AcquireTimeout`] if the deadline passes while queued.
    /// - [`PoolError::ResourceCreation`] if the factory fails to create.
    pub async fn acquire(
        &self,
        timeout: Option<Duration>,
    ) -> Result<ResourceWrapper<F::Resource>, PoolError> {
        let inner = &self.inner;
        let timeout = timeout.unwrap_or_else(|| inner.config.acquire_timeout());
        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or(now + FAR_FUTURE);
        let may_wait = (!timeout.is_zero()).then_some(deadline);

        let slot = match inner.update(|state| state.checkout(may_wait)) {
            Checkout::Idle(entry) => Reservation::holding(inner, entry),
            Checkout::Create => Reservation::empty(inner),
            Checkout::Closed => return Err(PoolError::PoolClosed),
            Checkout::Exhausted => {
                debug!(pool = %inner.config.name, "pool exhausted, caller declined to wait");
                return Err(PoolError::AcquireTimeout(timeout));
            }
            Checkout::Queued(id, rx) => {
                debug!(pool = %inner.config.name, waiter = id, "pool exhausted, queued acquire");
                let waiter = QueuedWaiter {
                    pool: inner,
                    id,
                    rx,
                    settled: false,
                };
                match waiter.wait(deadline).await {
                    Grant::Resource(entry) => {
                        inner.publish(PoolEventKind::Acquired, Some(entry.id()));
                        return Ok(entry);
                    }
                    Grant::Slot => Reservation::empty(inner),
                    Grant::Closed => return Err(PoolError::PoolClosed),
                    Grant::TimedOut => {
                        warn!(pool = %inner.config.name, waiter = id, ?timeout, "acquire timed out");
                        inner.publish(PoolEventKind::WaiterTimedOut, None);
                        return Err(PoolError::AcquireTimeout(timeout));
                    }
                }
            }
        };
        self.fill(slot).await
    }

    /// Turn a reserved slot into a validated or freshly created handle.
    async fn fill(
        &self,
        mut slot: Reservation<'_, F, S>,
    ) -> Result<ResourceWrapper<F::Resource>, PoolError> {
        let inner = &self.inner;
        loop {
            if let Some(resource) = slot.resource_mut() {
                if inner.factory.validate(resource).await {
                    if let Some(entry) = slot.take() {
                        return self.lease(slot, entry);
                    }
                    continue;
                }
                if let Some(stale) = slot.take() {
                    warn!(pool = %inner.config.name, resource = stale.id(), "idle resource failed validation");
                    inner.publish(PoolEventKind::ValidationFailed, Some(stale.id()));
                    inner.spawn_destroy(stale);
                }
                match inner.update(PoolState::retry) {
                    Retry::Idle(next) => slot.attach(next),
                    Retry::Create => {}
                    Retry::Closed => return Err(PoolError::PoolClosed),
                }
                continue;
            }

            let resource = inner.factory.create().await.map_err(|err| {
                let err = PoolError::creation(err);
                warn!(pool = %inner.config.name, "resource creation failed: {}", err);
                err
            })?;
            let entry = inner.update(|state| state.wrap(resource));
            debug!(pool = %inner.config.name, resource = entry.id(), "created resource");
            inner.publish(PoolEventKind::Created, Some(entry.id()));
            return self.lease(slot, entry);
        }
    }

    fn lease(
        &self,
        slot: Reservation<'_, F, S>,
        entry: ResourceWrapper<F::Resource>,
    ) -> Result<ResourceWrapper<F::Resource>, PoolError> {
        let inner = &self.inner;
        match inner.update(|state| state.lease(entry)) {
            Ok(entry) => {
                slot.disarm();
                debug!(pool = %inner.config.name, resource = entry.id(), "acquired resource");
                inner.publish(PoolEventKind::Acquired, Some(entry.id()));
                Ok(entry)
            }
            Err(entry) => {
                // Drain began while we were validating or creating.
                inner.spawn_destroy(entry);
                drop(slot);
                Err(PoolError::PoolClosed)
            }
        }
    }

    /// Return a handle.
    ///
    /// Hands it to the earliest queued waiter without re-validation, or parks
    /// it in idle. While draining the handle is destroyed instead. Never
    /// suspends and may be called from outside the runtime; destruction runs
    /// on the spawner.
    ///
    /// # Errors
    /// [`PoolError::InvalidRelease`] if the handle is not leased from this
    /// pool. Pool state is untouched and the stray handle is destroyed.
    pub fn release(&self, resource: ResourceWrapper<F::Resource>) -> Result<(), PoolError> {
        let inner = &self.inner;
        let id = resource.id();
        let now = std::time::Instant::now();
        match inner.update(|state| state.release(resource, now)) {
            Ok(outcome) => {
                inner.settle(outcome, id);
                Ok(())
            }
            Err(stray) => {
                warn!(pool = %inner.config.name, resource = id, "rejected release of untracked resource");
                inner.publish(PoolEventKind::ReleaseRejected, Some(id));
                inner.spawn_destroy(stray);
                Err(PoolError::InvalidRelease(id))
            }
        }
    }

    /// Shut the pool down.
    ///
    /// Rejects queued waiters, destroys idle handles, then waits until every
    /// in-use handle has been released and its destroy has finished.
    /// Idempotent: later or concurrent calls wait for the same completion.
    pub async fn drain(&self) {
        let inner = &self.inner;
        let mut phase_rx = inner.phase_tx.subscribe();

        if let Some(start) = inner.update(PoolState::begin_drain) {
            info!(
                pool = %inner.config.name,
                idle = start.idle.len(),
                rejected_waiters = start.rejected,
                "pool draining"
            );
            for entry in start.idle {
                PendingDestroy::counted(inner, entry).run().await;
            }
        }

        let closed = phase_rx.wait_for(|phase| *phase == PoolPhase::Closed).await.is_ok();
        if !closed {
            error!(pool = %inner.config.name, "phase channel closed before drain completed");
        }
    }

    /// Run one validation pass over idle handles now, then replenish toward
    /// `min_size`. The background sweep calls the same routine.
    pub async fn sweep(&self) -> SweepReport {
        self.inner.sweep_once().await
    }
}
