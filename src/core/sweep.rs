//! Periodic validation of idle handles.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::core::events::PoolEventKind;
use crate::core::resource_pool::{PoolInner, Reservation, Spawn};
use crate::core::state::PoolState;
use crate::core::{PoolError, ResourceFactory};

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Idle handles that passed validation.
    pub validated: usize,
    /// Idle handles destroyed after failing validation.
    pub evicted: usize,
    /// Handles created to get back to `min_size`.
    pub replenished: usize,
}

/// Start the background sweep. It holds only a weak reference, stops once
/// drain begins, and never touches in-use handles.
pub(crate) fn spawn_validation_sweep<F, S>(pool: &Arc<PoolInner<F, S>>, interval: Duration)
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    let weak = Arc::downgrade(pool);
    let mut phase_rx = pool.phase_tx.subscribe();
    let name = pool.config.name.clone();

    pool.spawner.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the pool was just warmed.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = phase_rx.changed() => {
                    if changed.is_err() || phase_rx.borrow().is_draining() {
                        break;
                    }
                    continue;
                }
            }

            let Some(pool) = weak.upgrade() else { break };
            if pool.phase().is_draining() {
                break;
            }
            let report = pool.sweep_once().await;
            if report.evicted > 0 || report.replenished > 0 {
                debug!(
                    pool = %name,
                    validated = report.validated,
                    evicted = report.evicted,
                    replenished = report.replenished,
                    "validation sweep"
                );
            }
        }
        debug!(pool = %name, "validation sweep stopped");
    });
}

impl<F, S> PoolInner<F, S>
where
    F: ResourceFactory,
    S: Spawn + Send + Sync + 'static,
{
    /// Validate every idle handle once, oldest first, then replenish toward
    /// `min_size`. Each handle is pulled out of idle while it is checked, so
    /// acquire/release keep running against the rest.
    pub(crate) async fn sweep_once(self: &Arc<Self>) -> SweepReport {
        let mut report = SweepReport::default();

        for id in self.update(|state| state.idle_ids()) {
            let Some(entry) = self.update(|state| state.take_idle(id)) else {
                // Acquired since the snapshot, or drain started.
                continue;
            };
            let mut slot = Reservation::holding(self, entry);
            let valid = match slot.resource_mut() {
                Some(resource) => self.factory.validate(resource).await,
                None => continue,
            };
            if valid {
                report.validated += 1;
                // Dropping the armed reservation restores the handle in place.
                drop(slot);
                continue;
            }
            if let Some(stale) = slot.take() {
                warn!(pool = %self.config.name, resource = stale.id(), "evicting idle resource that failed validation");
                self.publish(PoolEventKind::ValidationFailed, Some(stale.id()));
                self.spawn_destroy(stale);
                report.evicted += 1;
            }
        }

        while self.update(PoolState::reserve_toward_min) {
            let mut slot = Reservation::empty(self);
            match self.factory.create().await {
                Ok(resource) => {
                    let entry = self.update(|state| state.wrap(resource));
                    self.publish(PoolEventKind::Created, Some(entry.id()));
                    slot.attach(entry);
                    report.replenished += 1;
                }
                Err(err) => {
                    let err = PoolError::creation(err);
                    warn!(pool = %self.config.name, "failed to replenish pool: {}", err);
                    break;
                }
            }
        }

        report
    }
}
