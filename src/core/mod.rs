//! Pool state machine, bookkeeping and collaborator traits.

pub mod error;
pub mod events;
pub mod factory;
pub mod resource_pool;
pub mod state;
pub mod sweep;
mod waiter;

pub use error::{AppResult, BoxError, PoolError};
pub use events::{
    CallbackSink, EventSink, InMemoryEventSink, PoolEvent, PoolEventKind, SubscriptionId,
};
pub use factory::ResourceFactory;
pub use resource_pool::{Pool, Spawn};
pub use state::{PoolPhase, PoolStats, ResourceWrapper};
pub use sweep::SweepReport;
