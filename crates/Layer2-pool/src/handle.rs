//! Task handle - caller-side view of a submitted task

use crate::state::TaskState;
use crate::task::TaskId;
use ballast_foundation::{Error, Result};
use tokio::sync::watch;

/// Handle returned by `submit`; tracks one task to its terminal state
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    state_rx: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, state_rx: watch::Receiver<TaskState>) -> Self {
        Self { id, state_rx }
    }

    /// The task's id
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Current state snapshot (non-blocking)
    pub fn state(&self) -> TaskState {
        self.state_rx.borrow().clone()
    }

    /// Has the task reached a terminal state?
    pub fn is_finished(&self) -> bool {
        self.state_rx.borrow().is_terminal()
    }

    /// Block until the task reaches a terminal state and return it.
    ///
    /// Errors only if the pool stopped tracking the task before it finished
    /// (the task record was cleaned up while still live).
    pub async fn wait(&mut self) -> Result<TaskState> {
        let state = self
            .state_rx
            .wait_for(|state| state.is_terminal())
            .await
            .map_err(|_| Error::Task(format!("task {} dropped before completion", self.id)))?
            .clone();
        Ok(state)
    }
}
