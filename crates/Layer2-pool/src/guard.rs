//! Resource guard - declared-memory ledger and time budget expiry
//!
//! Both policies are kept apart from the pool so they can be tested on their
//! own: the ledger is plain bookkeeping over the admission formula, and the
//! expiry future is the single place a time budget turns into a deadline.

use std::time::Duration;

/// Aggregate declared-memory accounting for in-flight tasks
///
/// Invariant: `committed <= ceiling` after every successful commit.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    ceiling: u64,
    committed: u64,
}

impl MemoryLedger {
    /// Create a ledger with a fixed ceiling
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            committed: 0,
        }
    }

    /// The fixed aggregate budget
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// Memory currently committed to in-flight tasks
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Remaining headroom
    pub fn available(&self) -> u64 {
        self.ceiling.saturating_sub(self.committed)
    }

    /// Would `declared` fit under the ceiling right now?
    pub fn fits(&self, declared: u64) -> bool {
        self.committed
            .checked_add(declared)
            .is_some_and(|total| total <= self.ceiling)
    }

    /// Commit `declared` units if they fit; returns false otherwise
    pub fn try_commit(&mut self, declared: u64) -> bool {
        if !self.fits(declared) {
            return false;
        }
        self.committed += declared;
        true
    }

    /// Release `declared` units committed earlier
    pub fn release(&mut self, declared: u64) {
        debug_assert!(declared <= self.committed, "releasing more than committed");
        self.committed = self.committed.saturating_sub(declared);
    }
}

/// Resolves when the time budget elapses; pends forever without a budget.
pub async fn time_budget_expired(budget: Option<Duration>) {
    match budget {
        Some(limit) => tokio::time::sleep(limit).await,
        None => futures::future::pending::<()>().await,
    }
}
