//! Worker slot - supervised execution of one task at a time

use crate::guard;
use crate::state::TaskState;
use crate::task::TaskId;
use crate::workload::Workload;
use ballast_foundation::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Everything a slot needs to run one dispatched task
pub(crate) struct DispatchLease {
    pub id: TaskId,
    pub label: String,
    pub workload: Arc<dyn Workload>,
    pub time_budget: Option<Duration>,
    pub cancel: CancellationToken,
}

/// One concurrent execution lane in the pool
pub(crate) struct WorkerSlot {
    slot: usize,
}

impl WorkerSlot {
    pub(crate) fn new(slot: usize) -> Self {
        Self { slot }
    }

    /// Run one task to a terminal state and return it.
    ///
    /// The workload runs in its own spawned task so work that never yields
    /// cannot suppress the time-budget alarm. On expiry the lease token is
    /// cancelled and `TimedOut` is reported immediately; the orphaned call
    /// may keep running in the background. The same applies to the
    /// cancellation path: signal, report, detach.
    pub(crate) async fn run(self, lease: DispatchLease) -> TaskState {
        let DispatchLease {
            id,
            label,
            workload,
            time_budget,
            cancel,
        } = lease;

        debug!("Slot {} executing task {}: {}", self.slot, id, label);

        let work_token = cancel.child_token();
        let mut join = tokio::spawn(async move { workload.invoke(work_token).await });

        let outcome = tokio::select! {
            res = &mut join => match res {
                Ok(Ok(result)) => TaskState::Succeeded(result),
                Ok(Err(Error::Cancelled)) => TaskState::Cancelled,
                Ok(Err(Error::Timeout(_))) => TaskState::TimedOut,
                Ok(Err(e)) => TaskState::Failed(e.to_string()),
                Err(join_err) if join_err.is_panic() => {
                    warn!("Task {} panicked in slot {}", id, self.slot);
                    TaskState::Failed(format!("workload panicked: {}", join_err))
                }
                Err(join_err) => TaskState::Failed(format!("workload aborted: {}", join_err)),
            },
            _ = guard::time_budget_expired(time_budget) => {
                cancel.cancel();
                TaskState::TimedOut
            }
            _ = cancel.cancelled() => TaskState::Cancelled,
        };

        debug!(
            "Slot {} finished task {}: {}",
            self.slot,
            id,
            outcome.display_name()
        );

        outcome
    }
}
