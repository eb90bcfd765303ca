//! # ballast-pool
//!
//! Bounded concurrent task pool for Ballast.
//! Runs submitted workloads under a fixed worker-slot ceiling with
//! declared-memory admission accounting and per-task time budgets.
//!
//! ## Features
//!
//! - Strict FIFO admission with aggregate declared-memory accounting
//! - Per-task time budgets with cooperative cancellation
//! - Graceful (drain) and immediate (discard) shutdown
//! - Per-task handles for joining terminal outcomes
//! - Completion events for the observability layer

pub mod guard;
pub mod handle;
pub mod pool;
pub mod state;
pub mod task;
pub mod workload;

mod worker;

// Pool
pub use pool::{OversizedPolicy, PoolStats, TaskPool, TaskPoolConfig, TaskStatus};

// Task system
pub use handle::TaskHandle;
pub use state::TaskState;
pub use task::{Task, TaskId, TaskResult};
pub use workload::{FnWorkload, Workload};

// Resource accounting
pub use guard::MemoryLedger;

// Foundation re-exports for downstream convenience
pub use ballast_foundation::{
    Error, EventBus, EventCategory, EventFilter, EventListener, EventSeverity, PoolEvent, Result,
};

// Workloads receive this token for cooperative cancellation
pub use tokio_util::sync::CancellationToken;
