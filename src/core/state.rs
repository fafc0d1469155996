//! Authoritative pool bookkeeping.
//!
//! `PoolState` is plain data guarded by the pool's single mutex. Every method
//! here is synchronous; factory I/O happens in the caller after the lock is
//! released, and the returned outcome tells the caller what is left to do.
//!
//! Any slot counted in `total` but not sitting in `idle` is counted in
//! `in_use`: leased handles, creations in flight, and idle handles popped for
//! validation alike. Handles that left `total` to be destroyed stay counted in
//! `destroying` until their destroy finishes; the pool closes only when both
//! reach zero.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::waiter::{Grant, WaiterQueue};
use super::PoolError;

/// Lifecycle phase of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPhase {
    /// Created, `initialize()` not yet completed.
    Initializing,
    /// Serving acquire/release.
    Running,
    /// Drain requested; waiting for in-use handles to come back.
    Draining,
    /// Terminal. No handles remain and every destroy has finished.
    Closed,
}

impl PoolPhase {
    /// True once drain has started (draining or closed).
    #[must_use]
    pub const fn is_draining(self) -> bool {
        matches!(self, Self::Draining | Self::Closed)
    }
}

/// Point-in-time counts returned by [`Pool::stats`](crate::core::Pool::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Handles owned by the pool, idle or in use.
    pub total: usize,
    /// Handles available for reuse.
    pub idle: usize,
    /// Handles checked out, including creations in flight.
    pub in_use: usize,
    /// Queued acquire calls.
    pub waiting: usize,
}

/// A pooled handle together with its bookkeeping.
///
/// Returned by [`Pool::acquire`](crate::core::Pool::acquire) and handed back
/// through [`Pool::release`](crate::core::Pool::release). Dereferences to the
/// underlying resource.
pub struct ResourceWrapper<R> {
    id: u64,
    pool_id: Uuid,
    created_at: Instant,
    last_used_at: Instant,
    resource: R,
}

impl<R> ResourceWrapper<R> {
    pub(crate) fn new(id: u64, pool_id: Uuid, resource: R) -> Self {
        let now = Instant::now();
        Self {
            id,
            pool_id,
            created_at: now,
            last_used_at: now,
            resource,
        }
    }

    /// Identifier unique within the owning pool.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Instance id of the owning pool.
    #[must_use]
    pub const fn pool_id(&self) -> Uuid {
        self.pool_id
    }

    /// When the factory created the handle.
    #[must_use]
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the handle was last returned to the pool (or created).
    #[must_use]
    pub const fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub(crate) fn into_resource(self) -> R {
        self.resource
    }
}

impl<R> Deref for ResourceWrapper<R> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R> DerefMut for ResourceWrapper<R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.resource
    }
}

impl<R: fmt::Debug> fmt::Debug for ResourceWrapper<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceWrapper")
            .field("id", &self.id)
            .field("pool_id", &self.pool_id)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Result of a checkout attempt.
pub(crate) enum Checkout<R> {
    /// Popped the warmest idle handle; it still needs validation.
    Idle(ResourceWrapper<R>),
    /// Reserved a slot; the caller must create the handle.
    Create,
    /// Queued as a waiter.
    Queued(u64, oneshot::Receiver<Grant<R>>),
    /// Pool is full and the caller refused to wait.
    Exhausted,
    /// Pool is draining or closed.
    Closed,
}

/// What happened to a handle coming back into the pool.
pub(crate) enum CheckIn<R> {
    /// Passed directly to the given waiter.
    HandedOff(u64),
    /// Stored in idle.
    Idled,
    /// Pool is draining; the slot is gone and the handle must be destroyed.
    /// The destroy is already counted in flight.
    Destroy(ResourceWrapper<R>),
}

/// Next step after an idle handle failed validation.
pub(crate) enum Retry<R> {
    /// Try this idle handle with the same slot.
    Idle(ResourceWrapper<R>),
    /// No idle handle left; create with the slot.
    Create,
    /// Pool started draining.
    Closed,
}

/// What happened to a released creation slot.
pub(crate) enum SlotRelease {
    /// Passed to the given waiter, which now creates.
    HandedOff(u64),
    /// Capacity freed.
    Freed,
}

/// Idle handles and waiter count collected when drain starts.
///
/// Every handle in `idle` is counted as a destroy in flight.
pub(crate) struct DrainStart<R> {
    pub idle: Vec<ResourceWrapper<R>>,
    pub rejected: usize,
}

/// Where a returning handle is placed in idle.
#[derive(Clone, Copy)]
enum Placement {
    /// Just used: most-recently-released goes first.
    Front(Instant),
    /// Never reached a caller: keep its position by `last_used_at`.
    Ordered,
}

pub(crate) struct PoolState<R> {
    pool_id: Uuid,
    min_size: usize,
    max_size: usize,
    idle: VecDeque<ResourceWrapper<R>>,
    leased: HashSet<u64>,
    in_use: usize,
    total: usize,
    destroying: usize,
    waiters: WaiterQueue<R>,
    phase: PoolPhase,
    init_started: bool,
    next_id: u64,
}

impl<R> PoolState<R> {
    pub(crate) fn new(pool_id: Uuid, min_size: usize, max_size: usize) -> Self {
        Self {
            pool_id,
            min_size,
            max_size,
            idle: VecDeque::with_capacity(max_size),
            leased: HashSet::with_capacity(max_size),
            in_use: 0,
            total: 0,
            destroying: 0,
            waiters: WaiterQueue::default(),
            phase: PoolPhase::Initializing,
            init_started: false,
            next_id: 1,
        }
    }

    pub(crate) const fn phase(&self) -> PoolPhase {
        self.phase
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.total,
            idle: self.idle.len(),
            in_use: self.in_use,
            waiting: self.waiters.len(),
        }
    }

    /// Claim the right to run `initialize()`.
    pub(crate) fn begin_initialize(&mut self) -> Result<(), PoolError> {
        if self.phase.is_draining() {
            return Err(PoolError::PoolClosed);
        }
        if self.init_started || self.phase != PoolPhase::Initializing {
            return Err(PoolError::AlreadyInitialized);
        }
        self.init_started = true;
        Ok(())
    }

    /// Allow another `initialize()` attempt after a failed one.
    pub(crate) fn abort_initialize(&mut self) {
        self.init_started = false;
    }

    /// Move to `Running`. Fails if drain started meanwhile.
    pub(crate) fn mark_running(&mut self) -> bool {
        if self.phase == PoolPhase::Initializing {
            self.phase = PoolPhase::Running;
            true
        } else {
            false
        }
    }

    /// Take the warmest idle handle, reserve a creation slot, or queue.
    ///
    /// `deadline == None` means the caller will not wait.
    pub(crate) fn checkout(&mut self, deadline: Option<tokio::time::Instant>) -> Checkout<R> {
        if self.phase.is_draining() {
            return Checkout::Closed;
        }
        if let Some(entry) = self.idle.pop_front() {
            self.in_use += 1;
            return Checkout::Idle(entry);
        }
        if self.total < self.max_size {
            self.total += 1;
            self.in_use += 1;
            return Checkout::Create;
        }
        match deadline {
            Some(deadline) => {
                let (id, rx) = self.waiters.push(deadline);
                Checkout::Queued(id, rx)
            }
            None => Checkout::Exhausted,
        }
    }

    /// Reserve a slot for warming toward `min_size`.
    pub(crate) fn reserve_toward_min(&mut self) -> bool {
        if self.phase.is_draining() || self.total >= self.min_size.min(self.max_size) {
            return false;
        }
        self.total += 1;
        self.in_use += 1;
        true
    }

    /// Stamp a freshly created handle with a pool-unique id.
    pub(crate) fn wrap(&mut self, resource: R) -> ResourceWrapper<R> {
        let id = self.next_id;
        self.next_id += 1;
        ResourceWrapper::new(id, self.pool_id, resource)
    }

    /// Hand a reserved handle to its caller. Gives it back if draining began.
    pub(crate) fn lease(
        &mut self,
        entry: ResourceWrapper<R>,
    ) -> Result<ResourceWrapper<R>, ResourceWrapper<R>> {
        if self.phase.is_draining() {
            return Err(entry);
        }
        self.leased.insert(entry.id);
        Ok(entry)
    }

    /// Called with a slot still reserved after its idle handle failed validation.
    pub(crate) fn retry(&mut self) -> Retry<R> {
        if self.phase.is_draining() {
            return Retry::Closed;
        }
        match self.idle.pop_front() {
            Some(entry) => {
                // The popped handle inherits the slot; the stale one's slot goes.
                self.total -= 1;
                Retry::Idle(entry)
            }
            None => Retry::Create,
        }
    }

    /// Caller-initiated release. Unknown handles are given back untouched.
    pub(crate) fn release(
        &mut self,
        entry: ResourceWrapper<R>,
        now: Instant,
    ) -> Result<CheckIn<R>, ResourceWrapper<R>> {
        if entry.pool_id != self.pool_id || !self.leased.contains(&entry.id) {
            return Err(entry);
        }
        Ok(self.check_in(entry, Placement::Front(now)))
    }

    /// Return a handle that never reached a caller (cancelled checkout,
    /// validated by the sweep, freshly warmed).
    pub(crate) fn restore(&mut self, entry: ResourceWrapper<R>) -> CheckIn<R> {
        self.check_in(entry, Placement::Ordered)
    }

    fn check_in(&mut self, entry: ResourceWrapper<R>, placement: Placement) -> CheckIn<R> {
        if self.phase.is_draining() {
            self.leased.remove(&entry.id);
            self.in_use -= 1;
            self.total -= 1;
            self.destroying += 1;
            return CheckIn::Destroy(entry);
        }

        let id = entry.id;
        match self.waiters.offer(Grant::Resource(entry), tokio::time::Instant::now()) {
            Ok(waiter) => {
                self.leased.insert(id);
                CheckIn::HandedOff(waiter)
            }
            Err(grant) => {
                self.leased.remove(&id);
                self.in_use -= 1;
                if let Grant::Resource(mut entry) = grant {
                    match placement {
                        Placement::Front(now) => {
                            entry.last_used_at = now;
                            self.idle.push_front(entry);
                        }
                        Placement::Ordered => {
                            let at = self
                                .idle
                                .partition_point(|e| e.last_used_at > entry.last_used_at);
                            self.idle.insert(at, entry);
                        }
                    }
                }
                CheckIn::Idled
            }
        }
    }

    /// Give up a reserved slot that holds no handle.
    pub(crate) fn release_slot(&mut self) -> SlotRelease {
        if !self.phase.is_draining() {
            if let Ok(waiter) = self.waiters.offer(Grant::Slot, tokio::time::Instant::now()) {
                return SlotRelease::HandedOff(waiter);
            }
        }
        self.in_use -= 1;
        self.total -= 1;
        self.finish_if_drained();
        SlotRelease::Freed
    }

    /// Remove a waiter that timed out or was cancelled.
    pub(crate) fn remove_waiter(&mut self, id: u64) -> bool {
        self.waiters.remove(id)
    }

    /// Enter `Draining`: reject waiters and surrender idle handles.
    ///
    /// Returns `None` if drain already started.
    pub(crate) fn begin_drain(&mut self) -> Option<DrainStart<R>> {
        if self.phase.is_draining() {
            return None;
        }
        self.phase = PoolPhase::Draining;
        let rejected = self.waiters.close_all();
        let idle: Vec<_> = self.idle.drain(..).collect();
        self.total -= idle.len();
        self.destroying += idle.len();
        self.finish_if_drained();
        Some(DrainStart { idle, rejected })
    }

    /// Count a destroy the pool started outside of a check-in or drain.
    pub(crate) fn destroy_started(&mut self) {
        self.destroying += 1;
    }

    /// A destroy finished, successfully or not.
    pub(crate) fn destroy_finished(&mut self) {
        self.destroying -= 1;
        self.finish_if_drained();
    }

    fn finish_if_drained(&mut self) {
        if self.phase == PoolPhase::Draining && self.total == 0 && self.destroying == 0 {
            self.phase = PoolPhase::Closed;
        }
    }

    /// Ids of idle handles, oldest first.
    pub(crate) fn idle_ids(&self) -> Vec<u64> {
        if self.phase.is_draining() {
            return Vec::new();
        }
        self.idle.iter().rev().map(|e| e.id).collect()
    }

    /// Pull one idle handle out for validation, reserving its slot.
    pub(crate) fn take_idle(&mut self, id: u64) -> Option<ResourceWrapper<R>> {
        if self.phase.is_draining() {
            return None;
        }
        let index = self.idle.iter().position(|e| e.id == id)?;
        let entry = self.idle.remove(index)?;
        self.in_use += 1;
        Some(entry)
    }

    /// Check the bookkeeping invariants. Used by tests.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.idle.len() + self.in_use != self.total {
            return Err(format!(
                "idle {} + in_use {} != total {}",
                self.idle.len(),
                self.in_use,
                self.total
            ));
        }
        if self.total > self.max_size {
            return Err(format!("total {} > max {}", self.total, self.max_size));
        }
        if self.idle.iter().any(|e| self.leased.contains(&e.id)) {
            return Err("idle handle is also leased".into());
        }
        if !self.waiters.is_empty() && (!self.idle.is_empty() || self.total != self.max_size) {
            return Err("waiters queued while capacity is available".into());
        }
        if self.phase == PoolPhase::Closed
            && (self.total != 0 || self.destroying != 0 || !self.waiters.is_empty())
        {
            return Err("closed pool still owns resources, destroys or waiters".into());
        }
        Ok(())
    }
}
