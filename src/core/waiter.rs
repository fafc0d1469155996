//! FIFO queue of pending acquire requests.
//!
//! Each waiter owns the sending half of a `oneshot` channel, so it is
//! resolved at most once. All resolution happens while the pool's state lock
//! is held, which lets a timed-out waiter tell "still queued" apart from
//! "already granted" by checking whether it is still present in the queue.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::state::ResourceWrapper;

/// Outcome delivered to a queued waiter.
pub(crate) enum Grant<R> {
    /// A released handle, passed over without visiting idle.
    Resource(ResourceWrapper<R>),
    /// A reserved creation slot; the waiter must create the handle itself.
    Slot,
    /// The pool started draining.
    Closed,
    /// The waiter's deadline had passed when it reached the head of the queue.
    TimedOut,
}

struct Waiter<R> {
    id: u64,
    deadline: Instant,
    tx: oneshot::Sender<Grant<R>>,
}

/// Pending acquire requests in arrival order.
pub(crate) struct WaiterQueue<R> {
    waiters: VecDeque<Waiter<R>>,
    next_id: u64,
}

impl<R> Default for WaiterQueue<R> {
    fn default() -> Self {
        Self {
            waiters: VecDeque::new(),
            next_id: 1,
        }
    }
}

impl<R> WaiterQueue<R> {
    /// Enqueue a waiter at the tail.
    pub(crate) fn push(&mut self, deadline: Instant) -> (u64, oneshot::Receiver<Grant<R>>) {
        let id = self.next_id;
        self.next_id += 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(Waiter { id, deadline, tx });
        (id, rx)
    }

    /// Remove a waiter that gave up. Returns `false` if it was already resolved.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        // Timeouts fire roughly in arrival order, so the head is the usual hit.
        if self.waiters.front().is_some_and(|w| w.id == id) {
            self.waiters.pop_front();
            return true;
        }
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Hand `grant` to the earliest live waiter.
    ///
    /// `now` is read from the tokio clock, the same one queued acquires time
    /// out on. Waiters whose deadline has passed are resolved with `TimedOut` and
    /// skipped. Returns the grant back if nobody could take it.
    pub(crate) fn offer(&mut self, grant: Grant<R>, now: Instant) -> Result<u64, Grant<R>> {
        let mut grant = grant;
        while let Some(waiter) = self.waiters.pop_front() {
            if waiter.deadline <= now {
                let _ = waiter.tx.send(Grant::TimedOut);
                continue;
            }
            match waiter.tx.send(grant) {
                Ok(()) => return Ok(waiter.id),
                Err(returned) => grant = returned,
            }
        }
        Err(grant)
    }

    /// Resolve every queued waiter with `Closed`. Returns how many were rejected.
    pub(crate) fn close_all(&mut self) -> usize {
        let count = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.tx.send(Grant::Closed);
        }
        count
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
