//! Event types published by the task pool
//!
//! Every terminal task outcome is published as a `PoolEvent` so an
//! observability layer can subscribe without the pool knowing about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event ID
// ============================================================================

/// Unique event identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// Event category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Pool lifecycle (open, closed, drained)
    Pool,
    /// Per-task lifecycle (queued, running, terminal outcomes)
    Task,
    /// Error events
    Error,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pool => "pool",
            Self::Task => "task",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// Event Severity
// ============================================================================

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl Default for EventSeverity {
    fn default() -> Self {
        Self::Info
    }
}

// ============================================================================
// PoolEvent
// ============================================================================

/// A single pool event
///
/// `event_type` is a dotted name such as "task.succeeded" or "pool.drained";
/// `data` carries the event payload as opaque JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEvent {
    /// Event ID
    pub id: EventId,

    /// Event type (e.g. "task.succeeded", "pool.closed")
    pub event_type: String,

    /// Event category
    pub category: EventCategory,

    /// Severity
    pub severity: EventSeverity,

    /// When the event was published
    pub timestamp: DateTime<Utc>,

    /// Task id this event concerns, if any
    pub task_id: Option<String>,

    /// Event payload
    pub data: Value,
}

impl PoolEvent {
    /// Create a new event with default severity and empty payload
    pub fn new(event_type: impl Into<String>, category: EventCategory) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            category,
            severity: EventSeverity::default(),
            timestamp: Utc::now(),
            task_id: None,
            data: Value::Null,
        }
    }

    /// Set severity
    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Attach a task id
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Attach a payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

// ============================================================================
// Event constructors
// ============================================================================

/// Task lifecycle events
pub mod task {
    use super::*;
    use serde_json::json;

    pub fn queued(task_id: impl Into<String>, declared_memory: u64) -> PoolEvent {
        PoolEvent::new("task.queued", EventCategory::Task)
            .with_severity(EventSeverity::Debug)
            .with_task_id(task_id)
            .with_data(json!({ "declared_memory": declared_memory }))
    }

    pub fn running(task_id: impl Into<String>, slot: usize) -> PoolEvent {
        PoolEvent::new("task.running", EventCategory::Task)
            .with_severity(EventSeverity::Debug)
            .with_task_id(task_id)
            .with_data(json!({ "slot": slot }))
    }

    pub fn succeeded(task_id: impl Into<String>, duration_ms: u64) -> PoolEvent {
        PoolEvent::new("task.succeeded", EventCategory::Task)
            .with_task_id(task_id)
            .with_data(json!({ "duration_ms": duration_ms }))
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> PoolEvent {
        PoolEvent::new("task.failed", EventCategory::Task)
            .with_severity(EventSeverity::Error)
            .with_task_id(task_id)
            .with_data(json!({ "error": error.into() }))
    }

    pub fn timed_out(task_id: impl Into<String>, budget_ms: u64) -> PoolEvent {
        PoolEvent::new("task.timed_out", EventCategory::Task)
            .with_severity(EventSeverity::Warning)
            .with_task_id(task_id)
            .with_data(json!({ "budget_ms": budget_ms }))
    }

    pub fn cancelled(task_id: impl Into<String>) -> PoolEvent {
        PoolEvent::new("task.cancelled", EventCategory::Task)
            .with_severity(EventSeverity::Warning)
            .with_task_id(task_id)
    }
}

/// Pool lifecycle events
pub mod pool {
    use super::*;
    use serde_json::json;

    pub fn closed(discarded: usize) -> PoolEvent {
        PoolEvent::new("pool.closed", EventCategory::Pool)
            .with_data(json!({ "discarded": discarded }))
    }

    pub fn drained() -> PoolEvent {
        PoolEvent::new("pool.drained", EventCategory::Pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_constructors() {
        let event = task::succeeded("abc123", 42);
        assert_eq!(event.event_type, "task.succeeded");
        assert_eq!(event.category, EventCategory::Task);
        assert_eq!(event.severity, EventSeverity::Info);
        assert_eq!(event.task_id.as_deref(), Some("abc123"));

        let event = task::failed("abc123", "boom");
        assert_eq!(event.severity, EventSeverity::Error);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(EventSeverity::Debug < EventSeverity::Info);
        assert!(EventSeverity::Warning < EventSeverity::Error);
    }
}
