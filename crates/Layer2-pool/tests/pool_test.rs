//! End-to-end behavior tests for the task pool:
//! admission accounting, FIFO dispatch, time budgets, cancellation, shutdown.

use anyhow::Result;
use ballast_pool::{
    Error, TaskHandle, TaskPool, TaskPoolConfig, TaskResult, TaskState,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn pool_with(capacity: usize, memory_ceiling: u64) -> TaskPool {
    TaskPool::new(TaskPoolConfig {
        capacity,
        memory_ceiling,
        ..Default::default()
    })
    .expect("valid config")
}

/// A gate the test opens to let gated tasks finish.
fn gate() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Submit a task that parks until its gate opens.
async fn submit_gated(
    pool: &TaskPool,
    label: &str,
    declared_memory: u64,
    rx: watch::Receiver<bool>,
) -> TaskHandle {
    pool.submit_fn(label, declared_memory, None, move |_cancel| {
        let mut rx = rx.clone();
        async move {
            rx.wait_for(|open| *open).await.ok();
            Ok(TaskResult::empty())
        }
    })
    .await
    .expect("submission accepted")
}

#[tokio::test]
async fn test_single_slot_runs_in_submission_order() -> Result<()> {
    init_tracing();
    let pool = pool_with(1, u64::MAX);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..3u32 {
        let order = Arc::clone(&order);
        let handle = pool
            .submit_fn(format!("task-{i}"), 0, None, move |_cancel| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(i);
                    Ok(TaskResult::success(json!(i)))
                }
            })
            .await?;
        handles.push(handle);
    }

    for handle in &mut handles {
        assert!(handle.wait().await?.is_success());
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_memory_admission_holds_back_second_large_task() -> Result<()> {
    init_tracing();
    let pool = pool_with(2, 100);

    let (open1, rx1) = gate();
    let (open23, rx23) = gate();

    let mut h1 = submit_gated(&pool, "large-1", 60, rx1.clone()).await;
    let mut h2 = submit_gated(&pool, "large-2", 60, rx23.clone()).await;
    let mut h3 = submit_gated(&pool, "small-3", 10, rx23.clone()).await;

    // Only the first large task is admitted: the second does not fit
    // (60 + 60 > 100) and, as the queue head, also holds back the small
    // task behind it despite the idle slot.
    assert_eq!(pool.running_count().await, 1);
    assert_eq!(pool.queued_count().await, 2);
    assert_eq!(pool.committed_memory().await, 60);

    open1.send(true).ok();
    assert!(h1.wait().await?.is_success());

    // With the first 60 released, the second 60 and the 10 fit together.
    let mut saw_both = false;
    for _ in 0..200 {
        if pool.running_count().await == 2 {
            saw_both = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(saw_both, "60 and 10 should run concurrently after the drain");
    assert_eq!(pool.committed_memory().await, 70);

    open23.send(true).ok();
    assert!(h2.wait().await?.is_success());
    assert!(h3.wait().await?.is_success());
    assert_eq!(pool.committed_memory().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_capacity_bounds_concurrency() -> Result<()> {
    let pool = pool_with(2, u64::MAX);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..6 {
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        let handle = pool
            .submit_fn(format!("task-{i}"), 0, None, move |_cancel| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(TaskResult::empty())
                }
            })
            .await?;
        handles.push(handle);
    }

    for handle in &mut handles {
        assert!(handle.wait().await?.is_success());
    }

    let peak = peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 2, "peak concurrency was {peak}");

    let stats = pool.stats().await;
    assert_eq!(stats.total_tasks, 6);
    assert_eq!(stats.succeeded, 6);
    assert_eq!(stats.running, 0);
    Ok(())
}

#[tokio::test]
async fn test_committed_memory_never_exceeds_ceiling() -> Result<()> {
    let pool = pool_with(4, 100);

    let mut handles = Vec::new();
    for i in 0..8 {
        let handle = pool
            .submit_fn(format!("chunk-{i}"), 40, None, |_cancel| async {
                tokio::time::sleep(Duration::from_millis(15)).await;
                Ok(TaskResult::empty())
            })
            .await?;
        handles.push(handle);
    }

    // Sample the invariant while the batch drains.
    loop {
        let stats = pool.stats().await;
        assert!(stats.committed_memory <= stats.memory_ceiling);
        if stats.queued == 0 && stats.running == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    for handle in &mut handles {
        assert!(handle.wait().await?.is_success());
    }
    Ok(())
}

#[tokio::test]
async fn test_time_budget_reported_promptly() -> Result<()> {
    init_tracing();
    let pool = pool_with(1, u64::MAX);

    let start = Instant::now();
    let mut handle = pool
        .submit_fn(
            "sleepy",
            0,
            Some(Duration::from_millis(100)),
            |_cancel| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(TaskResult::empty())
            },
        )
        .await?;

    let state = handle.wait().await?;
    let elapsed = start.elapsed();

    assert!(matches!(state, TaskState::TimedOut));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(
        elapsed < Duration::from_secs(2),
        "timeout was not reported promptly: {elapsed:?}"
    );
    Ok(())
}

#[tokio::test]
async fn test_cancel_running_task() -> Result<()> {
    let pool = pool_with(1, u64::MAX);

    let mut handle = pool
        .submit_fn("obedient", 0, None, |cancel| async move {
            cancel.cancelled().await;
            Err(Error::Cancelled)
        })
        .await?;

    assert_eq!(pool.running_count().await, 1);

    pool.cancel(handle.id()).await?;
    assert!(matches!(handle.wait().await?, TaskState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn test_cancel_queued_task() -> Result<()> {
    let pool = pool_with(1, u64::MAX);
    let (open, rx) = gate();

    let mut h1 = submit_gated(&pool, "runner", 0, rx.clone()).await;
    let mut h2 = submit_gated(&pool, "waiting", 0, rx.clone()).await;
    assert_eq!(pool.queued_count().await, 1);

    pool.cancel(h2.id()).await?;
    assert!(matches!(h2.wait().await?, TaskState::Cancelled));
    assert_eq!(pool.queued_count().await, 0);

    open.send(true).ok();
    assert!(h1.wait().await?.is_success());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_discard_cancels_queued_and_running() -> Result<()> {
    init_tracing();
    let pool = pool_with(1, u64::MAX);

    let mut h1 = pool
        .submit_fn("running", 0, None, |cancel| async move {
            cancel.cancelled().await;
            Err(Error::Cancelled)
        })
        .await?;
    let (_open, rx) = gate();
    let mut h2 = submit_gated(&pool, "queued-1", 0, rx.clone()).await;
    let mut h3 = submit_gated(&pool, "queued-2", 0, rx.clone()).await;

    pool.shutdown(false).await;

    assert!(matches!(h2.wait().await?, TaskState::Cancelled));
    assert!(matches!(h3.wait().await?, TaskState::Cancelled));
    // The running task observed its token.
    assert!(matches!(h1.wait().await?, TaskState::Cancelled));

    let refused = pool
        .submit_fn("late", 0, None, |_cancel| async { Ok(TaskResult::empty()) })
        .await;
    assert!(matches!(refused, Err(Error::PoolClosed)));

    // Second shutdown changes nothing.
    pool.shutdown(false).await;
    assert_eq!(pool.queued_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_wait_drains_queued_work() -> Result<()> {
    let pool = pool_with(1, u64::MAX);

    let mut handles = Vec::new();
    for i in 0..3 {
        let handle = pool
            .submit_fn(format!("drain-{i}"), 0, None, |_cancel| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(TaskResult::empty())
            })
            .await?;
        handles.push(handle);
    }

    pool.shutdown(true).await;

    let stats = pool.stats().await;
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.running, 0);

    for handle in &mut handles {
        assert!(handle.wait().await?.is_success());
    }

    // Idempotent: a second graceful shutdown returns immediately.
    pool.shutdown(true).await;
    assert!(pool.is_closed().await);
    Ok(())
}

#[tokio::test]
async fn test_bounded_queue_rejects_overflow() -> Result<()> {
    let pool = TaskPool::new(TaskPoolConfig {
        capacity: 1,
        queue_capacity: Some(1),
        ..Default::default()
    })?;

    let (open, rx) = gate();
    let mut h1 = submit_gated(&pool, "busy", 0, rx.clone()).await;
    let mut h2 = submit_gated(&pool, "waiting", 0, rx.clone()).await;

    let err = pool
        .submit_fn("overflow", 0, None, |_cancel| async { Ok(TaskResult::empty()) })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::QueueFull {
            pending: 1,
            capacity: 1
        }
    ));
    assert!(err.is_retryable());

    open.send(true).ok();
    assert!(h1.wait().await?.is_success());
    assert!(h2.wait().await?.is_success());
    Ok(())
}

#[tokio::test]
async fn test_oversized_head_blocks_queue_under_wait_policy() -> Result<()> {
    // Default policy keeps the oversized task queued; strict FIFO means the
    // small task behind it starves until the queue is discarded.
    let pool = pool_with(2, 100);

    let mut h_big = pool
        .submit_fn("oversized", 200, None, |_cancel| async {
            Ok(TaskResult::empty())
        })
        .await?;
    let mut h_small = pool
        .submit_fn("small", 10, None, |_cancel| async { Ok(TaskResult::empty()) })
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.running_count().await, 0);
    assert_eq!(pool.queued_count().await, 2);

    pool.shutdown(false).await;
    assert!(matches!(h_big.wait().await?, TaskState::Cancelled));
    assert!(matches!(h_small.wait().await?, TaskState::Cancelled));
    Ok(())
}

#[tokio::test]
async fn test_result_payload_reaches_handle() -> Result<()> {
    let pool = pool_with(1, u64::MAX);

    let mut handle = pool
        .submit_fn("answer", 0, None, |_cancel| async {
            Ok(TaskResult::success(json!({ "answer": 42 }))
                .with_metadata(json!({ "attempt": 1 })))
        })
        .await?;

    match handle.wait().await? {
        TaskState::Succeeded(result) => {
            assert_eq!(result.output["answer"], 42);
            assert_eq!(result.metadata, Some(json!({ "attempt": 1 })));
        }
        other => panic!("expected success, got {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_terminal_outcome_is_published() -> Result<()> {
    let pool = pool_with(1, u64::MAX);
    let mut rx = pool.subscribe();

    let mut handle = pool
        .submit_fn("observed", 0, None, |_cancel| async { Ok(TaskResult::empty()) })
        .await?;
    handle.wait().await?;

    let full_id = handle.id().0.to_string();
    let mut saw_succeeded = false;
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
        if event.event_type == "task.succeeded"
            && event.task_id.as_deref() == Some(full_id.as_str())
        {
            saw_succeeded = true;
            break;
        }
    }
    assert!(saw_succeeded, "no task.succeeded event observed");
    Ok(())
}

#[tokio::test]
async fn test_workload_panic_does_not_poison_pool() -> Result<()> {
    let pool = pool_with(1, u64::MAX);

    let mut boom = pool
        .submit_fn("explodes", 0, None, |_cancel| async { panic!("kaboom") })
        .await?;
    assert!(matches!(boom.wait().await?, TaskState::Failed(msg) if msg.contains("panicked")));

    // The pool keeps serving.
    let mut next = pool
        .submit_fn("after", 0, None, |_cancel| async { Ok(TaskResult::empty()) })
        .await?;
    assert!(next.wait().await?.is_success());

    let stats = pool.stats().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
    Ok(())
}
