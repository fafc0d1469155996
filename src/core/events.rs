//! Pool events and the explicit subscriber registry.
//!
//! Subscribers are registered on a pool instance and receive every event the
//! pool publishes. Events are published after the state lock is released, so
//! a slow sink delays only the caller that produced the event.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Kind of state change a pool reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolEventKind {
    /// The factory produced a new handle.
    Created,
    /// A handle was torn down.
    Destroyed,
    /// A caller received a handle.
    Acquired,
    /// A handle went back to idle.
    Released,
    /// A released handle went straight to a queued waiter.
    HandedOff,
    /// A release was rejected as untracked.
    ReleaseRejected,
    /// An idle handle failed its liveness check.
    ValidationFailed,
    /// A queued acquire gave up.
    WaiterTimedOut,
    /// Drain began.
    DrainStarted,
    /// The pool reached its terminal phase.
    Closed,
}

/// A single pool event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEvent {
    /// Name of the publishing pool.
    pub pool: String,
    /// What happened.
    pub kind: PoolEventKind,
    /// Handle involved, if any.
    pub resource_id: Option<u64>,
    /// Timestamp in milliseconds since epoch.
    pub at_ms: u128,
}

/// Receiver of pool events.
pub trait EventSink: Send + Sync {
    /// Record an event. Must not block for long.
    fn record(&self, event: &PoolEvent);
}

/// Adapts a closure into an [`EventSink`].
pub struct CallbackSink<F>(pub F);

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(&PoolEvent) + Send + Sync,
{
    fn record(&self, event: &PoolEvent) {
        (self.0)(event);
    }
}

/// In-memory event sink with a bounded buffer, for tests and dev.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<PoolEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink keeping at most `max_events` of the newest events.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of stored events of `kind`.
    pub fn count(&self, kind: PoolEventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: &PoolEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

/// Handle returned by [`Pool::subscribe`](crate::core::Pool::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct Subscribers {
    sinks: RwLock<Vec<(SubscriptionId, Arc<dyn EventSink>)>>,
    next_id: AtomicU64,
}

impl Subscribers {
    pub(crate) fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sinks.write().push((id, sink));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|(sid, _)| *sid != id);
        sinks.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks.read().len()
    }

    pub(crate) fn publish(&self, pool: &str, kind: PoolEventKind, resource_id: Option<u64>) {
        let sinks = self.sinks.read();
        if sinks.is_empty() {
            return;
        }
        let event = PoolEvent {
            pool: pool.to_string(),
            kind,
            resource_id,
            at_ms: now_ms(),
        };
        for (_, sink) in sinks.iter() {
            sink.record(&event);
        }
    }
}
