//! Event system - publish/subscribe for pool lifecycle
//!
//! The pool publishes one event per task state change and per pool lifecycle
//! transition. Consumers either register an [`EventListener`] (delivered
//! inline) or pull from a broadcast receiver.

pub mod bus;
pub mod types;

// Re-exports
pub use bus::{EventBus, EventBusConfig, EventFilter, EventListener, ListenerId};

pub use types::{
    // Event constructors
    pool,
    task,
    // Core types
    EventCategory,
    EventId,
    EventSeverity,
    PoolEvent,
};
