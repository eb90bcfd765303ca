//! Workload abstraction
//!
//! A workload is the opaque callable side of a task. The pool never inspects
//! what it computes; it only drives `invoke` and hands over a cancellation
//! token. Cancellation is cooperative: a workload that ignores the token can
//! only be detached, not killed.

use crate::task::TaskResult;
use async_trait::async_trait;
use ballast_foundation::Result;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Workload trait - implement to define an executable unit of work
#[async_trait]
pub trait Workload: Send + Sync {
    /// Run the work to completion or until `cancel` is signalled.
    ///
    /// Returning `Err(Error::Cancelled)` after observing the token is folded
    /// into the `Cancelled` outcome; any other error becomes `Failed`.
    async fn invoke(&self, cancel: CancellationToken) -> Result<TaskResult>;
}

/// Adapter turning an async closure into a [`Workload`]
pub struct FnWorkload {
    f: Box<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<TaskResult>> + Send + Sync>,
}

impl FnWorkload {
    /// Wrap an async closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult>> + Send + 'static,
    {
        Self {
            f: Box::new(move |cancel| f(cancel).boxed()),
        }
    }

    /// Wrap an async closure directly as a shared workload
    pub fn arc<F, Fut>(f: F) -> Arc<dyn Workload>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskResult>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl Workload for FnWorkload {
    async fn invoke(&self, cancel: CancellationToken) -> Result<TaskResult> {
        (self.f)(cancel).await
    }
}
