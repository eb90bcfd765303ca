//! Task state machine

use crate::task::TaskResult;
use serde::{Deserialize, Serialize};

/// Possible states of a task
///
/// `Queued` and `Running` are the only non-terminal states. A task moves
/// `Queued -> Running -> terminal`, or straight `Queued -> Cancelled` when it
/// is discarded before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskState {
    /// Task is waiting in the submission queue
    Queued,

    /// Task is currently running in a worker slot
    Running,

    /// Task completed successfully
    Succeeded(TaskResult),

    /// Task failed with an error
    Failed(String),

    /// Task exceeded its time budget
    TimedOut,

    /// Task was cancelled before or during execution
    Cancelled,
}

impl TaskState {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded(_)
                | TaskState::Failed(_)
                | TaskState::TimedOut
                | TaskState::Cancelled
        )
    }

    /// Check if the task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running)
    }

    /// Check if the task is still waiting for dispatch
    pub fn is_queued(&self) -> bool {
        matches!(self, TaskState::Queued)
    }

    /// Check if the task completed successfully
    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Succeeded(_))
    }

    /// Successful result payload, if any
    pub fn result(&self) -> Option<&TaskResult> {
        match self {
            TaskState::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::Queued => "Queued",
            TaskState::Running => "Running",
            TaskState::Succeeded(_) => "Succeeded",
            TaskState::Failed(_) => "Failed",
            TaskState::TimedOut => "TimedOut",
            TaskState::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
