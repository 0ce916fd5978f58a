//! Caller-driven resubmission of failed tasks.
//!
//! The pool itself never retries. These entry points run a settled session,
//! then resubmit the tasks whose failure was retryable (timeout, crash, no
//! live workers) in fresh sessions, up to `[pool] retries` rounds.
//! Progress counts each task once, when its first attempt settles.

use super::{CallProgress, WorkerPool};
use crate::batch::chunked;
use crate::errors::{PoolError, TaskError};
use tracing::{debug, info};

impl<T, R> WorkerPool<T, R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
{
    pub fn process_all_settled_with_retries(
        &self,
        tasks: Vec<T>,
    ) -> Result<Vec<Result<R, TaskError>>, PoolError> {
        let mut progress = self.call_progress(tasks.len());
        self.settle_with_retries(tasks, &mut progress)
    }

    /// Chunked variant of [`Self::process_all_settled_with_retries`].
    pub fn process_batches_settled_with_retries(
        &self,
        tasks: Vec<T>,
        batch_size: usize,
    ) -> Result<Vec<Result<R, TaskError>>, PoolError> {
        let mut progress = self.call_progress(tasks.len());
        let mut results = Vec::with_capacity(tasks.len());
        for (i, chunk) in chunked(tasks, batch_size).into_iter().enumerate() {
            if i > 0 {
                std::thread::sleep(self.config.batch_delay());
            }
            results.extend(self.settle_with_retries(chunk, &mut progress)?);
        }
        Ok(results)
    }

    fn settle_with_retries(
        &self,
        tasks: Vec<T>,
        progress: &mut CallProgress,
    ) -> Result<Vec<Result<R, TaskError>>, PoolError> {
        let inputs = tasks.clone();
        let mut results = self.run_session(tasks, false, progress)?;

        for attempt in 1..=self.config.retries {
            let pending: Vec<usize> = results
                .iter()
                .enumerate()
                .filter(|(_, r)| r.as_ref().is_err_and(TaskError::is_retryable))
                .map(|(i, _)| i)
                .collect();
            if pending.is_empty() {
                break;
            }

            let delay = self.retry.delay_for_attempt(attempt);
            info!(
                attempt,
                tasks = pending.len(),
                "resubmitting failed tasks after {:?}",
                delay
            );
            std::thread::sleep(delay);

            let resubmitted = pending.iter().map(|&i| inputs[i].clone()).collect();
            let retried = self.run_session(resubmitted, false, &mut CallProgress::silent())?;
            for (index, outcome) in pending.into_iter().zip(retried) {
                if let Err(err) = &outcome {
                    debug!(attempt, index, "retry failed: {err}");
                }
                results[index] = outcome;
            }
        }

        Ok(results)
    }

}

#[cfg(test)]
mod tests {
    use crate::config::{RetryConfig, WorkerPoolConfig};
    use crate::errors::TaskError;
    use crate::pool::WorkerPool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_crashed_task_succeeds_on_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let config = WorkerPoolConfig::default()
            .with_workers(2)
            .with_timeout(Duration::from_secs(5))
            .with_retries(2);
        let pool = WorkerPool::new(config, move |n: u32| {
            if n == 1 && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first attempt");
            }
            Ok::<_, String>(n * 10)
        })
        .with_retry_policy(RetryConfig::immediate());

        let results = pool.process_all_settled_with_retries(vec![0, 1, 2]).unwrap();
        assert_eq!(results, vec![Ok(0), Ok(10), Ok(20)]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_handler_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let config = WorkerPoolConfig::default().with_workers(1).with_retries(3);
        let pool = WorkerPool::new(config, move |_: u32| -> Result<u32, String> {
            seen.fetch_add(1, Ordering::SeqCst);
            Err("deterministic".into())
        })
        .with_retry_policy(RetryConfig::immediate());

        let results = pool.process_all_settled_with_retries(vec![5]).unwrap();
        assert!(matches!(results[0], Err(TaskError::Failed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_progress_counts_each_task_once_across_chunks_and_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let config = WorkerPoolConfig::default()
            .with_workers(2)
            .with_timeout(Duration::from_secs(5))
            .with_retries(2);
        let pool = WorkerPool::new(config, move |n: u32| {
            if n == 4 && seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first attempt");
            }
            Ok::<_, String>(n)
        })
        .with_retry_policy(RetryConfig::immediate())
        .with_progress(move |done, total| sink.lock().push((done, total)));

        let results = pool
            .process_batches_settled_with_retries((0..7).collect(), 3)
            .unwrap();
        assert_eq!(results, (0..7).map(Ok).collect::<Vec<_>>());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*events.lock(), (1..=7).map(|done| (done, 7)).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_retries_returns_first_outcome() {
        let config = WorkerPoolConfig::default().with_workers(1);
        let pool = WorkerPool::new(config, |_: u32| -> Result<u32, String> { panic!("x") });
        let results = pool.process_all_settled_with_retries(vec![1]).unwrap();
        assert!(matches!(results[0], Err(TaskError::WorkerCrashed { .. })));
    }
}
