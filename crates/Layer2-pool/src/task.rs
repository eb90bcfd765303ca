//! Task definition and types

use crate::workload::{FnWorkload, Workload};
use ballast_foundation::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// A unit of work to be executed by the pool
///
/// The id is minted at construction and stays unique for as long as the pool
/// tracks the task. `declared_memory` is a self-reported hint used only for
/// admission accounting; nothing enforces it physically.
#[derive(Clone)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Human-readable label for logs and events
    pub label: String,

    /// Self-reported peak memory, in abstract units
    pub declared_memory: u64,

    /// Time budget; absent means the task runs unbounded
    pub time_budget: Option<Duration>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// The work itself
    pub(crate) workload: Arc<dyn Workload>,
}

impl Task {
    /// Create a new task around a workload
    pub fn new(label: impl Into<String>, workload: Arc<dyn Workload>) -> Self {
        Self {
            id: TaskId::new(),
            label: label.into(),
            declared_memory: 0,
            time_budget: None,
            created_at: Utc::now(),
            workload,
        }
    }

    /// Create a task from an async closure
    pub fn from_fn<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult>> + Send + 'static,
    {
        Self::new(label, FnWorkload::arc(f))
    }

    /// Set the declared peak memory
    pub fn with_declared_memory(mut self, units: u64) -> Self {
        self.declared_memory = units;
        self
    }

    /// Set the time budget
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("declared_memory", &self.declared_memory)
            .field("time_budget", &self.time_budget)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Result of a successful task execution
///
/// The payload is opaque JSON; the pool hands it through without looking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Output content
    pub output: Value,

    /// Additional metadata
    pub metadata: Option<Value>,
}

impl TaskResult {
    /// Create a success result with a payload
    pub fn success(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            metadata: None,
        }
    }

    /// Create a success result with no payload
    pub fn empty() -> Self {
        Self {
            output: Value::Null,
            metadata: None,
        }
    }

    /// Add metadata to the result
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_builder_defaults() {
        let task = Task::from_fn("noop", |_c| async { Ok(TaskResult::empty()) });
        assert_eq!(task.declared_memory, 0);
        assert!(task.time_budget.is_none());
        assert_eq!(task.label, "noop");
    }

    #[test]
    fn test_task_builder() {
        let task = Task::from_fn("heavy", |_c| async { Ok(TaskResult::empty()) })
            .with_declared_memory(512)
            .with_time_budget(Duration::from_secs(5));

        assert_eq!(task.declared_memory, 512);
        assert_eq!(task.time_budget, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = Task::from_fn("a", |_c| async { Ok(TaskResult::empty()) });
        let b = Task::from_fn("b", |_c| async { Ok(TaskResult::empty()) });
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_task_result_metadata() {
        let result = TaskResult::success(json!("done")).with_metadata(json!({ "retries": 0 }));
        assert_eq!(result.output, json!("done"));
        assert_eq!(result.metadata, Some(json!({ "retries": 0 })));
    }

    #[test]
    fn test_task_id_display_is_short() {
        let id = TaskId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
