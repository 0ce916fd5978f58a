//! Integration tests for the worker pool: ordering, timeouts, crash
//! isolation, retries and cleanup between calls.

use blockaudit::config::{RetryConfig, WorkerPoolConfig};
use blockaudit::pool::WorkerPool;
use blockaudit::{PoolError, TaskError};
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn config(workers: usize, timeout_ms: u64) -> WorkerPoolConfig {
    WorkerPoolConfig::default()
        .with_workers(workers)
        .with_timeout(Duration::from_millis(timeout_ms))
}

/// Poll until `check` holds or `limit` elapses.
fn eventually(limit: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_results_keep_submission_order_under_reversed_completion() {
    let pool = WorkerPool::new(config(4, 5_000), |n: u64| {
        std::thread::sleep(Duration::from_millis((20 - n % 20) * 2));
        Ok::<_, String>(n * 3)
    });

    let input: Vec<u64> = (0..40).collect();
    let results = pool.process_all(input.clone()).unwrap();

    assert_eq!(results, input.iter().map(|n| n * 3).collect::<Vec<_>>());
}

#[test]
fn test_settled_results_align_with_inputs() {
    let pool = WorkerPool::new(config(3, 5_000), |n: u64| {
        if n % 3 == 0 {
            Err(format!("multiple of three: {n}"))
        } else {
            Ok(n)
        }
    });

    let results = pool.process_all_settled((0..9).collect()).unwrap();

    for (n, result) in results.iter().enumerate() {
        if n % 3 == 0 {
            assert!(matches!(result, Err(TaskError::Failed { .. })), "task {n}");
        } else {
            assert_eq!(result, &Ok(n as u64));
        }
    }
}

// ============================================================================
// Timeouts
// ============================================================================

#[test]
fn test_timeout_fires_near_deadline_and_clears_active_tasks() {
    let release = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&release);
    let pool = WorkerPool::new(config(2, 100), move |n: u64| {
        if n == 1 {
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        Ok::<_, String>(n)
    });

    let started = Instant::now();
    let results = pool.process_all_settled(vec![0, 1, 2]).unwrap();
    let elapsed = started.elapsed();

    assert_eq!(results[0], Ok(0));
    assert!(matches!(results[1], Err(TaskError::Timeout { .. })));
    assert_eq!(results[2], Ok(2));
    assert!(elapsed >= Duration::from_millis(100), "settled after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "settled after {elapsed:?}");
    assert_eq!(pool.active_task_count(), 0);
    assert_eq!(pool.live_workers(), 0);

    release.store(true, Ordering::SeqCst);
    assert!(eventually(Duration::from_secs(2), || pool.running_threads() == 0));
}

#[test]
fn test_fail_fast_timeout_returns_pool_error() {
    let pool = WorkerPool::new(config(1, 30), |n: u64| {
        std::thread::sleep(Duration::from_millis(300));
        Ok::<_, String>(n)
    });

    let err = pool.process_all(vec![1, 2]).unwrap_err();
    assert!(matches!(err, PoolError::Task(TaskError::Timeout { .. })));
    assert_eq!(pool.live_workers(), 0);
}

// ============================================================================
// Crashes
// ============================================================================

#[test]
fn test_crash_is_charged_to_the_owning_task_only() {
    let pool = WorkerPool::new(config(3, 5_000), |n: u64| {
        if n == 4 {
            panic!("boom on {n}");
        }
        Ok::<_, String>(n)
    });

    let results = pool.process_all_settled((0..8).collect()).unwrap();

    let failed: Vec<usize> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_err())
        .map(|(i, _)| i)
        .collect();
    assert_eq!(failed, vec![4]);
    assert!(matches!(results[4], Err(TaskError::WorkerCrashed { .. })));
}

// ============================================================================
// Retries
// ============================================================================

#[test]
fn test_retries_resubmit_timed_out_tasks() {
    let attempts = Arc::new(Mutex::new(HashMap::<u64, usize>::new()));
    let seen = Arc::clone(&attempts);
    let pool = WorkerPool::new(config(2, 50).with_retries(2), move |n: u64| {
        let attempt = {
            let mut seen = seen.lock().unwrap();
            let count = seen.entry(n).or_insert(0);
            *count += 1;
            *count
        };
        if n == 3 && attempt == 1 {
            std::thread::sleep(Duration::from_millis(250));
        }
        Ok::<_, String>(n * 10)
    })
    .with_retry_policy(RetryConfig::immediate());

    let results = pool.process_all_settled_with_retries((0..5).collect()).unwrap();

    assert_eq!(
        results,
        vec![Ok(0), Ok(10), Ok(20), Ok(30), Ok(40)]
    );
    assert_eq!(attempts.lock().unwrap().get(&3).copied(), Some(2));
    assert_eq!(attempts.lock().unwrap().get(&0).copied(), Some(1));
}

#[test]
fn test_handler_failures_are_not_retried() {
    let calls = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&calls);
    let pool = WorkerPool::new(config(1, 5_000).with_retries(3), move |_: u64| {
        *counter.lock().unwrap() += 1;
        Err::<u64, _>("deterministic".to_string())
    })
    .with_retry_policy(RetryConfig::immediate());

    let results = pool.process_all_settled_with_retries(vec![1]).unwrap();

    assert!(matches!(results[0], Err(TaskError::Failed { .. })));
    assert_eq!(*calls.lock().unwrap(), 1);
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn test_no_workers_survive_between_calls() {
    let pool = WorkerPool::new(config(4, 5_000), |n: u64| {
        if n == 7 {
            return Err("seven".to_string());
        }
        Ok(n)
    });

    for _ in 0..3 {
        let _ = pool.process_all((0..10).collect());
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.active_task_count(), 0);
        assert!(eventually(Duration::from_secs(2), || pool.running_threads() == 0));
    }

    let results = pool.process_batches((0..7).collect(), 3).unwrap();
    assert_eq!(results, (0..7).collect::<Vec<_>>());
    assert_eq!(pool.live_workers(), 0);
}
