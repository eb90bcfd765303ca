//! Error types for Ballast
//!
//! All errors are managed centrally here.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Ballast error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Admission
    // ========================================================================
    #[error("Pool closed")]
    PoolClosed,

    #[error("Queue full: {pending} pending (capacity {capacity})")]
    QueueFull { pending: usize, capacity: usize },

    #[error("Declared memory {declared} exceeds pool ceiling {ceiling}")]
    MemoryCeiling { declared: u64, ceiling: u64 },

    // ========================================================================
    // Task execution
    // ========================================================================
    #[error("Task error: {0}")]
    Task(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // General
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // External error conversion
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for submission rejections the caller may retry after backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::QueueFull { .. })
    }
}
