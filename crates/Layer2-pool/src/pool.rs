//! Task pool - bounded concurrent execution with resource accounting
//!
//! The pool owns a fixed set of worker slots, a FIFO submission queue, and
//! the declared-memory ledger. All of queue, in-flight map, and ledger live
//! behind one mutex, so exactly one admission decision is in flight at any
//! time and two tasks can never be admitted against the same headroom.
//!
//! Admission is strict FIFO: the queue head dispatches as soon as a slot is
//! idle and its declared memory fits under the ceiling. A head that does not
//! fit blocks everything behind it - a deliberate simplicity/fairness
//! tradeoff, controlled for the pathological case (declared memory larger
//! than the whole ceiling) by [`OversizedPolicy`].

use crate::guard::MemoryLedger;
use crate::handle::TaskHandle;
use crate::state::TaskState;
use crate::task::{Task, TaskId, TaskResult};
use crate::worker::{DispatchLease, WorkerSlot};
use crate::workload::{FnWorkload, Workload};
use ballast_foundation::{event, Error, EventBus, PoolEvent, Result};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Policy for a task whose declared memory exceeds the pool ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversizedPolicy {
    /// Leave it queued. Under strict FIFO it can never dispatch and blocks
    /// everything behind it until cancelled or discarded.
    Wait,

    /// Refuse the submission with `Error::MemoryCeiling`.
    Reject,
}

/// Configuration for the task pool
#[derive(Debug, Clone)]
pub struct TaskPoolConfig {
    /// Number of worker slots (fixed for the pool's lifetime)
    pub capacity: usize,

    /// Aggregate declared-memory budget across in-flight tasks
    pub memory_ceiling: u64,

    /// Bounded queue length; None means unbounded
    pub queue_capacity: Option<usize>,

    /// What to do with tasks that can never fit the ceiling
    pub oversized: OversizedPolicy,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            capacity: 4,
            memory_ceiling: u64::MAX,
            queue_capacity: None,
            oversized: OversizedPolicy::Wait,
        }
    }
}

impl TaskPoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("capacity must be at least 1".to_string()));
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::Config(
                "queue_capacity must be at least 1 when bounded".to_string(),
            ));
        }
        Ok(())
    }
}

/// Task status for external queries
#[derive(Debug, Clone)]
pub struct TaskStatus {
    pub id: TaskId,
    pub label: String,
    pub state: TaskState,
    pub declared_memory: u64,
    pub time_budget: Option<Duration>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    /// Execution duration, if the task has started
    pub fn duration(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - start).to_std().ok()
    }
}

/// Aggregate pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_tasks: usize,
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub committed_memory: u64,
    pub memory_ceiling: u64,
}

/// Registry record for one tracked task
struct TaskEntry {
    label: String,
    declared_memory: u64,
    time_budget: Option<Duration>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    state_tx: watch::Sender<TaskState>,
}

/// Pending queue entry; metadata stays in the registry
struct QueuedTask {
    id: TaskId,
    workload: Arc<dyn Workload>,
}

/// Accounting for one running task
struct InFlight {
    slot: usize,
    declared_memory: u64,
    cancel: CancellationToken,
}

/// Shared mutable pool state - every mutation is serialized through one lock
struct PoolState {
    queue: VecDeque<QueuedTask>,
    tasks: HashMap<TaskId, TaskEntry>,
    in_flight: HashMap<TaskId, InFlight>,
    idle_slots: Vec<usize>,
    ledger: MemoryLedger,
    closed: bool,
}

struct PoolInner {
    config: TaskPoolConfig,
    state: Mutex<PoolState>,
    /// queue + in-flight count, for drain waiting
    active: watch::Sender<usize>,
    events: Arc<EventBus>,
}

/// Bounded concurrent task pool
#[derive(Clone)]
pub struct TaskPool {
    inner: Arc<PoolInner>,
}

impl TaskPool {
    /// Create a new pool; capacity and memory ceiling are fixed thereafter
    pub fn new(config: TaskPoolConfig) -> Result<Self> {
        config.validate()?;

        let state = PoolState {
            queue: VecDeque::new(),
            tasks: HashMap::new(),
            in_flight: HashMap::with_capacity(config.capacity),
            idle_slots: (0..config.capacity).rev().collect(),
            ledger: MemoryLedger::new(config.memory_ceiling),
            closed: false,
        };

        let (active, _) = watch::channel(0usize);

        Ok(Self {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
                active,
                events: Arc::new(EventBus::new()),
            }),
        })
    }

    /// Pool configuration
    pub fn config(&self) -> &TaskPoolConfig {
        &self.inner.config
    }

    /// The event bus this pool publishes to
    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.inner.events)
    }

    /// Broadcast receiver for pool events
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.receiver()
    }

    /// Submit a task for execution.
    ///
    /// Enqueues and returns immediately; admission into a slot happens
    /// opportunistically as slots and memory headroom free up. Never waits
    /// for a worker. Fails with `PoolClosed` after shutdown, `QueueFull`
    /// when the bounded queue is at capacity, and `MemoryCeiling` for an
    /// oversized task under `OversizedPolicy::Reject`.
    pub async fn submit(&self, task: Task) -> Result<TaskHandle> {
        let Task {
            id,
            label,
            declared_memory,
            time_budget,
            created_at,
            workload,
        } = task;

        if let Some(budget) = time_budget {
            if budget.is_zero() {
                return Err(Error::InvalidInput(format!(
                    "task {}: time budget must be positive",
                    id
                )));
            }
        }

        if self.inner.config.oversized == OversizedPolicy::Reject
            && declared_memory > self.inner.config.memory_ceiling
        {
            return Err(Error::MemoryCeiling {
                declared: declared_memory,
                ceiling: self.inner.config.memory_ceiling,
            });
        }

        let mut events = Vec::new();
        let handle = {
            let mut st = self.inner.state.lock().await;

            if st.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(cap) = self.inner.config.queue_capacity {
                if st.queue.len() >= cap {
                    return Err(Error::QueueFull {
                        pending: st.queue.len(),
                        capacity: cap,
                    });
                }
            }
            if st.tasks.contains_key(&id) {
                return Err(Error::InvalidInput(format!("task {} already submitted", id)));
            }

            let (state_tx, state_rx) = watch::channel(TaskState::Queued);
            st.tasks.insert(
                id,
                TaskEntry {
                    label: label.clone(),
                    declared_memory,
                    time_budget,
                    created_at,
                    started_at: None,
                    completed_at: None,
                    state_tx,
                },
            );
            st.queue.push_back(QueuedTask { id, workload });

            debug!("Queued task {}: {}", id, label);
            events.push(event::task::queued(id.0.to_string(), declared_memory));

            PoolInner::pump(&self.inner, &mut st, &mut events);
            self.inner.sync_active(&st);

            TaskHandle::new(id, state_rx)
        };

        for e in events {
            self.inner.events.publish(e).await;
        }

        Ok(handle)
    }

    /// Submit an async closure with flat resource hints
    pub async fn submit_fn<F, Fut>(
        &self,
        label: impl Into<String>,
        declared_memory: u64,
        time_budget: Option<Duration>,
        f: F,
    ) -> Result<TaskHandle>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult>> + Send + 'static,
    {
        let mut task = Task::new(label, FnWorkload::arc(f)).with_declared_memory(declared_memory);
        if let Some(budget) = time_budget {
            task = task.with_time_budget(budget);
        }
        self.submit(task).await
    }

    /// Cancel a task.
    ///
    /// Queued tasks are removed and reported `Cancelled`; running tasks get
    /// their token signalled and finish with `Cancelled` (or their natural
    /// outcome if they win the race). Terminal tasks are a no-op.
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;

            if !st.tasks.contains_key(&id) {
                return Err(Error::NotFound(format!("Task {} not found", id)));
            }

            if let Some(pos) = st.queue.iter().position(|q| q.id == id) {
                let _ = st.queue.remove(pos);
                if let Some(entry) = st.tasks.get_mut(&id) {
                    entry.completed_at = Some(Utc::now());
                    entry.state_tx.send_replace(TaskState::Cancelled);
                }
                events.push(event::task::cancelled(id.0.to_string()));
                info!("Cancelled queued task {}", id);

                // The queue head may have changed.
                PoolInner::pump(&self.inner, &mut st, &mut events);
                self.inner.sync_active(&st);
            } else if let Some(in_flight) = st.in_flight.get(&id) {
                in_flight.cancel.cancel();
                info!("Cancellation signalled for running task {}", id);
            }
        }

        for e in events {
            self.inner.events.publish(e).await;
        }

        Ok(())
    }

    /// Shut the pool down. Idempotent.
    ///
    /// With `wait == true`, blocks until both queue and in-flight work have
    /// drained; queued tasks still run, only new submissions are refused.
    /// With `wait == false`, discards queued tasks as `Cancelled` and fires
    /// every in-flight cancellation token (best-effort cooperative; work
    /// that ignores the token is detached, not killed).
    pub async fn shutdown(&self, wait: bool) {
        let mut events = Vec::new();
        {
            let mut st = self.inner.state.lock().await;

            let first_close = !st.closed;
            st.closed = true;
            if first_close {
                info!("Pool closed to new submissions");
            }

            if !wait {
                let discarded: Vec<QueuedTask> = st.queue.drain(..).collect();
                for queued in &discarded {
                    if let Some(entry) = st.tasks.get_mut(&queued.id) {
                        entry.completed_at = Some(Utc::now());
                        entry.state_tx.send_replace(TaskState::Cancelled);
                    }
                    debug!("Discarded queued task {}", queued.id);
                    events.push(event::task::cancelled(queued.id.0.to_string()));
                }

                for in_flight in st.in_flight.values() {
                    in_flight.cancel.cancel();
                }

                if first_close {
                    events.push(event::pool::closed(discarded.len()));
                }
                self.inner.sync_active(&st);
            } else if first_close {
                events.push(event::pool::closed(0));
                if st.queue.is_empty() && st.in_flight.is_empty() {
                    events.push(event::pool::drained());
                }
            }
        }

        for e in events {
            self.inner.events.publish(e).await;
        }

        if wait {
            let mut active = self.inner.active.subscribe();
            if active.wait_for(|count| *count == 0).await.is_err() {
                warn!("Active counter dropped during drain wait");
            }
        }
    }

    /// Whether the pool has been closed to new submissions
    pub async fn is_closed(&self) -> bool {
        self.inner.state.lock().await.closed
    }

    /// Status of a tracked task
    pub async fn status(&self, id: TaskId) -> Option<TaskStatus> {
        let st = self.inner.state.lock().await;
        st.tasks.get(&id).map(|entry| TaskStatus {
            id,
            label: entry.label.clone(),
            state: entry.state_tx.borrow().clone(),
            declared_memory: entry.declared_memory,
            time_budget: entry.time_budget,
            created_at: entry.created_at,
            started_at: entry.started_at,
            completed_at: entry.completed_at,
        })
    }

    /// Number of tasks currently running
    pub async fn running_count(&self) -> usize {
        self.inner.state.lock().await.in_flight.len()
    }

    /// Number of tasks waiting in the queue
    pub async fn queued_count(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    /// Declared memory currently committed to in-flight tasks
    pub async fn committed_memory(&self) -> u64 {
        self.inner.state.lock().await.ledger.committed()
    }

    /// Aggregate statistics over every tracked task
    pub async fn stats(&self) -> PoolStats {
        let st = self.inner.state.lock().await;

        let mut stats = PoolStats {
            total_tasks: st.tasks.len(),
            queued: st.queue.len(),
            running: st.in_flight.len(),
            succeeded: 0,
            failed: 0,
            timed_out: 0,
            cancelled: 0,
            committed_memory: st.ledger.committed(),
            memory_ceiling: st.ledger.ceiling(),
        };

        for entry in st.tasks.values() {
            match &*entry.state_tx.borrow() {
                TaskState::Succeeded(_) => stats.succeeded += 1,
                TaskState::Failed(_) => stats.failed += 1,
                TaskState::TimedOut => stats.timed_out += 1,
                TaskState::Cancelled => stats.cancelled += 1,
                TaskState::Queued | TaskState::Running => {}
            }
        }

        stats
    }

    /// Drop terminal task records older than the given age.
    ///
    /// Returns how many records were removed. Live tasks are never touched.
    pub async fn cleanup_older_than(&self, older_than: Duration) -> usize {
        let mut st = self.inner.state.lock().await;
        let cutoff = Utc::now() - chrono::Duration::from_std(older_than).unwrap_or_default();

        let to_remove: Vec<TaskId> = st
            .tasks
            .iter()
            .filter(|(_, entry)| {
                entry.state_tx.borrow().is_terminal()
                    && entry.completed_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();

        let count = to_remove.len();
        for id in to_remove {
            st.tasks.remove(&id);
        }

        if count > 0 {
            debug!("Cleaned up {} finished tasks", count);
        }

        count
    }
}

impl PoolInner {
    /// Admission pump: dispatch from the queue head while a slot is idle and
    /// the head fits under the memory ceiling. Strict FIFO, no head-of-line
    /// skipping. Caller holds the state lock.
    fn pump(inner: &Arc<PoolInner>, st: &mut PoolState, events: &mut Vec<PoolEvent>) {
        loop {
            if st.idle_slots.is_empty() || st.queue.is_empty() {
                break;
            }

            let head_id = st.queue[0].id;
            let (declared, time_budget) = match st.tasks.get(&head_id) {
                Some(entry) => (entry.declared_memory, entry.time_budget),
                None => {
                    warn!("Task {} missing from registry; dropping queue entry", head_id);
                    let _ = st.queue.pop_front();
                    continue;
                }
            };

            // Head does not fit: it blocks the queue until memory frees up.
            if !st.ledger.try_commit(declared) {
                break;
            }

            let (queued, slot) = match (st.queue.pop_front(), st.idle_slots.pop()) {
                (Some(q), Some(s)) => (q, s),
                _ => {
                    st.ledger.release(declared);
                    break;
                }
            };

            let cancel = CancellationToken::new();
            st.in_flight.insert(
                head_id,
                InFlight {
                    slot,
                    declared_memory: declared,
                    cancel: cancel.clone(),
                },
            );

            let label = match st.tasks.get_mut(&head_id) {
                Some(entry) => {
                    entry.started_at = Some(Utc::now());
                    entry.state_tx.send_replace(TaskState::Running);
                    entry.label.clone()
                }
                None => String::new(),
            };

            info!(
                "Dispatching task {} to slot {} ({}/{} memory committed)",
                head_id,
                slot,
                st.ledger.committed(),
                st.ledger.ceiling()
            );
            events.push(event::task::running(head_id.0.to_string(), slot));

            spawn_worker(
                Arc::clone(inner),
                slot,
                DispatchLease {
                    id: head_id,
                    label,
                    workload: queued.workload,
                    time_budget,
                    cancel,
                },
            );
        }
    }

    /// Completion callback from a worker slot. Exactly one per task; a
    /// duplicate report is dropped so accounting is never released twice.
    async fn on_complete(self: Arc<Self>, id: TaskId, outcome: TaskState) {
        let mut events = Vec::new();
        {
            let mut st = self.state.lock().await;

            let Some(in_flight) = st.in_flight.remove(&id) else {
                warn!("Ignoring completion report for untracked task {}", id);
                return;
            };

            st.ledger.release(in_flight.declared_memory);
            st.idle_slots.push(in_flight.slot);

            if let Some(entry) = st.tasks.get_mut(&id) {
                entry.completed_at = Some(Utc::now());
                events.push(terminal_event(id, entry, &outcome));
                entry.state_tx.send_replace(outcome.clone());
            }

            info!("Task {} finished: {}", id, outcome.display_name());

            PoolInner::pump(&self, &mut st, &mut events);
            self.sync_active(&st);

            if st.closed && st.queue.is_empty() && st.in_flight.is_empty() {
                events.push(event::pool::drained());
            }
        }

        for e in events {
            self.events.publish(e).await;
        }
    }

    /// Refresh the drain counter. Caller holds the state lock.
    fn sync_active(&self, st: &PoolState) {
        self.active.send_replace(st.queue.len() + st.in_flight.len());
    }
}

/// Hand a dispatched task to its worker slot on the runtime.
fn spawn_worker(inner: Arc<PoolInner>, slot: usize, lease: DispatchLease) {
    tokio::spawn(async move {
        let id = lease.id;
        let outcome = WorkerSlot::new(slot).run(lease).await;
        inner.on_complete(id, outcome).await;
    });
}

/// Terminal outcome -> published event
fn terminal_event(id: TaskId, entry: &TaskEntry, outcome: &TaskState) -> PoolEvent {
    let task_id = id.0.to_string();
    match outcome {
        TaskState::Succeeded(_) => {
            let duration_ms = entry
                .started_at
                .map(|start| (Utc::now() - start).num_milliseconds().max(0) as u64)
                .unwrap_or(0);
            event::task::succeeded(task_id, duration_ms)
        }
        TaskState::Failed(err) => event::task::failed(task_id, err.clone()),
        TaskState::TimedOut => {
            let budget_ms = entry
                .time_budget
                .map(|budget| budget.as_millis() as u64)
                .unwrap_or(0);
            event::task::timed_out(task_id, budget_ms)
        }
        TaskState::Cancelled => event::task::cancelled(task_id),
        // Non-terminal outcomes never reach here; report them as-is anyway.
        other => event::task::failed(task_id, format!("unexpected outcome {}", other)),
    }
}
