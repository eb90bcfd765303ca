//! # ballast-foundation
//!
//! Foundation layer for Ballast:
//! - Error: central error type and `Result` alias
//! - Event: publish/subscribe bus for pool and task lifecycle events

pub mod error;
pub mod event;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Event
// ============================================================================
pub use event::{
    EventBus,
    EventBusConfig,
    EventCategory,
    EventFilter,
    EventId,
    EventListener,
    EventSeverity,
    ListenerId,
    PoolEvent,
};
