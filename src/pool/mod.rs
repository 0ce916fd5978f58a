//! Worker pool with per-task timeouts.
//!
//! A [`WorkerPool`] runs a [`TaskHandler`] on a set of OS threads. Every
//! `process_*` call is a self-contained session: workers are started, the
//! submitted tasks are distributed through a FIFO backlog, and all workers
//! are terminated before the call returns, whether it succeeded or not.
//!
//! The control loop runs on the calling thread and is the only owner of the
//! active-task map, so no locking is involved in scheduling. Results are
//! returned in submission order, independent of completion order.
//!
//! ```no_run
//! use blockaudit::config::WorkerPoolConfig;
//! use blockaudit::pool::WorkerPool;
//!
//! let pool = WorkerPool::new(WorkerPoolConfig::default(), |n: u64| Ok::<_, String>(n * n));
//! let squares = pool.process_all(vec![1, 2, 3]).unwrap();
//! assert_eq!(squares, vec![1, 4, 9]);
//! ```

mod message;
mod retry;
mod task;
mod worker;

pub use message::{WorkerCommand, WorkerReply};
pub use task::{TaskId, TaskState};
pub use worker::TaskHandler;
pub(crate) use worker::panic_message;

use crate::batch::chunked;
use crate::config::{RetryConfig, WorkerPoolConfig};
use crate::errors::{PoolError, TaskError};
use crossbeam::channel::{self, RecvTimeoutError};
use message::WorkerEvent;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use task::{ActiveTasks, WorkerTask};
use tracing::{debug, trace, warn};
use worker::{spawn_worker, WorkerHandle, WorkerStatus};

/// Called with `(settled, total)` every time a task settles. Counts span
/// the whole call: every chunk of a batched call and the retry rounds.
pub type PoolProgress = Arc<dyn Fn(usize, usize) + Send + Sync>;

pub struct WorkerPool<T, R> {
    config: WorkerPoolConfig,
    retry: RetryConfig,
    handler: Arc<dyn TaskHandler<T, R>>,
    next_task_id: AtomicU64,
    live_workers: AtomicUsize,
    active_tasks: AtomicUsize,
    running_threads: Arc<AtomicUsize>,
    progress: Option<PoolProgress>,
}

impl<T, R> WorkerPool<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new(config: WorkerPoolConfig, handler: impl TaskHandler<T, R>) -> Self {
        Self {
            config,
            retry: RetryConfig::default(),
            handler: Arc::new(handler),
            next_task_id: AtomicU64::new(1),
            live_workers: AtomicUsize::new(0),
            active_tasks: AtomicUsize::new(0),
            running_threads: Arc::new(AtomicUsize::new(0)),
            progress: None,
        }
    }

    /// Delay policy used by the retrying entry points.
    pub fn with_retry_policy(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Run a single task.
    pub fn process_task(&self, task: T) -> Result<R, PoolError> {
        let mut results = self.process_all(vec![task])?;
        Ok(results.swap_remove(0))
    }

    /// Run all tasks, returning results in input order. The first task to
    /// fail (in completion order) fails the call.
    pub fn process_all(&self, tasks: Vec<T>) -> Result<Vec<R>, PoolError> {
        let mut progress = self.call_progress(tasks.len());
        self.run_session(tasks, true, &mut progress)?
            .into_iter()
            .map(|result| result.map_err(PoolError::from))
            .collect()
    }

    /// Run all tasks and settle each one individually. A timeout or crash
    /// affects only the tasks it owns.
    pub fn process_all_settled(&self, tasks: Vec<T>) -> Result<Vec<Result<R, TaskError>>, PoolError> {
        let mut progress = self.call_progress(tasks.len());
        self.run_session(tasks, false, &mut progress)
    }

    /// Run `tasks` in sequential chunks of `batch_size`, one session per
    /// chunk, pausing briefly between chunks.
    pub fn process_batches(&self, tasks: Vec<T>, batch_size: usize) -> Result<Vec<R>, PoolError> {
        let mut progress = self.call_progress(tasks.len());
        let mut results = Vec::with_capacity(tasks.len());
        for (i, chunk) in chunked(tasks, batch_size).into_iter().enumerate() {
            if i > 0 {
                std::thread::sleep(self.config.batch_delay());
            }
            for outcome in self.run_session(chunk, true, &mut progress)? {
                results.push(outcome?);
            }
        }
        Ok(results)
    }

    /// Settled variant of [`Self::process_batches`].
    pub fn process_batches_settled(
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
            results.extend(self.run_session(chunk, false, &mut progress)?);
        }
        Ok(results)
    }

    /// Workers alive in the current session; zero between calls.
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    /// Tasks registered and not yet settled; zero between calls.
    pub fn active_task_count(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Worker threads that have not exited yet. Can stay above zero for a
    /// while after a call that detached workers stuck in a timed-out task.
    pub fn running_threads(&self) -> usize {
        self.running_threads.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> TaskId {
        TaskId(self.next_task_id.fetch_add(1, Ordering::SeqCst))
    }

    fn call_progress(&self, total: usize) -> CallProgress {
        CallProgress {
            callback: self.progress.clone(),
            done: 0,
            total,
        }
    }

    fn run_session(
        &self,
        tasks: Vec<T>,
        fail_fast: bool,
        progress: &mut CallProgress,
    ) -> Result<Vec<Result<R, TaskError>>, PoolError> {
        let total = tasks.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        crate::time_span!("pool_session");

        // Declared before the session so it outlives the workers' shutdown.
        let (event_tx, event_rx) = channel::unbounded::<WorkerEvent<R>>();
        let mut session = Session::new(self);

        let worker_count = self.config.effective_workers().min(total);
        for index in 0..worker_count {
            let handle = spawn_worker(
                index,
                Arc::clone(&self.handler),
                event_tx.clone(),
                Arc::clone(&self.running_threads),
            )
            .map_err(|source| PoolError::Spawn { worker: index, source })?;
            session.workers.push(handle);
        }
        drop(event_tx);
        debug!(workers = worker_count, tasks = total, "pool session started");

        let timeout = self.config.task_timeout();
        let registered_at = Instant::now();
        for (index, payload) in tasks.into_iter().enumerate() {
            let id = self.next_id();
            session
                .active
                .register(WorkerTask::new(id, index, payload, registered_at + timeout));
            session.active.enqueue(id);
        }

        let mut settlement = Settlement::new(total, progress);
        session.dispatch(&mut settlement);
        session.sync_counters();

        while !settlement.is_complete() {
            for task in session.active.expire(Instant::now()) {
                debug!(task = %task.id, "task timed out");
                settlement.settle(
                    task.index,
                    Err(TaskError::Timeout {
                        task_id: task.id,
                        timeout,
                    }),
                );
            }
            if fail_fast {
                if let Some(err) = settlement.first_error.take() {
                    return Err(err.into());
                }
            }
            if settlement.is_complete() {
                break;
            }

            let event = match session.active.next_deadline() {
                Some(deadline) => event_rx.recv_deadline(deadline),
                None => event_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match event {
                Ok(WorkerEvent::Reply { worker, reply }) => {
                    session.on_reply(worker, reply, &mut settlement);
                }
                Ok(WorkerEvent::Crashed { worker, message }) => {
                    session.on_crash(worker, message, &mut settlement);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("all workers exited; rejecting remaining tasks");
                    for task in session.active.drain_all() {
                        settlement.settle(task.index, Err(TaskError::NoLiveWorkers { task_id: task.id }));
                    }
                }
            }

            if fail_fast {
                if let Some(err) = settlement.first_error.take() {
                    return Err(err.into());
                }
            }
            session.dispatch(&mut settlement);
            session.sync_counters();
        }

        Ok(settlement.into_results())
    }
}

/// Progress of one public call across its sessions.
struct CallProgress {
    callback: Option<PoolProgress>,
    done: usize,
    total: usize,
}

impl CallProgress {
    /// Retry rounds resubmit tasks that were already counted.
    fn silent() -> Self {
        Self {
            callback: None,
            done: 0,
            total: 0,
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        if let Some(callback) = &self.callback {
            callback(self.done, self.total);
        }
    }
}

/// Outcome slots of one session, indexed by submission order.
struct Settlement<'p, R> {
    slots: Vec<Option<Result<R, TaskError>>>,
    settled: usize,
    first_error: Option<TaskError>,
    progress: &'p mut CallProgress,
}

impl<'p, R> Settlement<'p, R> {
    fn new(total: usize, progress: &'p mut CallProgress) -> Self {
        Self {
            slots: (0..total).map(|_| None).collect(),
            settled: 0,
            first_error: None,
            progress,
        }
    }

    fn settle(&mut self, index: usize, outcome: Result<R, TaskError>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.is_some() {
            return;
        }
        if let Err(err) = &outcome {
            if self.first_error.is_none() {
                self.first_error = Some(err.clone());
            }
        }
        *slot = Some(outcome);
        self.settled += 1;
        self.progress.tick();
    }

    fn is_complete(&self) -> bool {
        self.settled == self.slots.len()
    }

    fn into_results(self) -> Vec<Result<R, TaskError>> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Workers and tasks of one `process_*` call. Dropping it terminates the
/// workers, so every exit path of the control loop cleans up.
struct Session<'p, T> {
    workers: Vec<WorkerHandle<T>>,
    active: ActiveTasks<T>,
    live_workers: &'p AtomicUsize,
    active_tasks: &'p AtomicUsize,
}

impl<'p, T> Session<'p, T> {
    fn new<R>(pool: &'p WorkerPool<T, R>) -> Self {
        Self {
            workers: Vec::new(),
            active: ActiveTasks::default(),
            live_workers: &pool.live_workers,
            active_tasks: &pool.active_tasks,
        }
    }

    fn live_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_alive()).count()
    }

    fn sync_counters(&self) {
        self.live_workers.store(self.live_count(), Ordering::SeqCst);
        self.active_tasks.store(self.active.len(), Ordering::SeqCst);
    }

    /// Hand backlog items to idle workers until either runs out.
    fn dispatch<R>(&mut self, settlement: &mut Settlement<'_, R>) {
        for worker in self.workers.iter_mut().filter(|w| w.is_idle()) {
            let Some(id) = self.active.next_queued() else {
                return;
            };
            let Some(payload) = self.active.assign(id, worker.index) else {
                continue;
            };
            trace!(worker = worker.index, task = %id, "task assigned");
            if worker.send(id, payload).is_err() {
                if let Some(task) = self.active.remove(id) {
                    settlement.settle(
                        task.index,
                        Err(TaskError::WorkerCrashed {
                            task_id: id,
                            worker: worker.index,
                            message: "worker inbox closed".to_string(),
                        }),
                    );
                }
            }
        }
    }

    fn on_reply<R>(&mut self, worker: usize, reply: WorkerReply<R>, settlement: &mut Settlement<'_, R>) {
        if let Some(handle) = self.workers.get_mut(worker) {
            handle.status = WorkerStatus::Idle;
        }

        let Some(task) = self.active.remove(reply.id()) else {
            debug!(worker, task = %reply.id(), "ignoring reply for settled task");
            return;
        };

        let outcome = match reply {
            WorkerReply::Result { result, .. } => Ok(result),
            WorkerReply::Error { id, error } => Err(TaskError::Failed {
                task_id: id,
                message: error,
            }),
        };
        settlement.settle(task.index, outcome);
    }

    fn on_crash<R>(&mut self, worker: usize, message: String, settlement: &mut Settlement<'_, R>) {
        let owned = match self.workers.get_mut(worker) {
            Some(handle) => {
                let owned = match handle.status {
                    WorkerStatus::Busy(id) => Some(id),
                    WorkerStatus::Idle | WorkerStatus::Dead => None,
                };
                handle.status = WorkerStatus::Dead;
                owned
            }
            None => None,
        };
        warn!(worker, "worker crashed: {message}");

        if let Some(task) = owned.and_then(|id| self.active.remove(id)) {
            settlement.settle(
                task.index,
                Err(TaskError::WorkerCrashed {
                    task_id: task.id,
                    worker,
                    message,
                }),
            );
        }

        if self.live_count() == 0 {
            for task in self.active.drain_queued() {
                settlement.settle(task.index, Err(TaskError::NoLiveWorkers { task_id: task.id }));
            }
        }
    }
}

impl<T> Drop for Session<'_, T> {
    fn drop(&mut self) {
        for worker in self.workers.drain(..) {
            worker.shutdown();
        }
        self.active.clear();
        self.live_workers.store(0, Ordering::SeqCst);
        self.active_tasks.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    fn pool<F>(workers: usize, timeout_ms: u64, handler: F) -> WorkerPool<u64, u64>
    where
        F: Fn(u64) -> Result<u64, String> + Send + Sync + 'static,
    {
        let config = WorkerPoolConfig::default()
            .with_workers(workers)
            .with_timeout(Duration::from_millis(timeout_ms));
        WorkerPool::new(config, handler)
    }

    #[test]
    fn test_empty_input() {
        let pool = pool(2, 1_000, Ok);
        assert_eq!(pool.process_all(Vec::new()).unwrap(), Vec::<u64>::new());
        assert_eq!(pool.running_threads(), 0);
    }

    #[test]
    fn test_results_follow_input_order() {
        // Later tasks finish first.
        let pool = pool(4, 5_000, |n| {
            std::thread::sleep(Duration::from_millis(40 - n * 10));
            Ok(n * 100)
        });
        assert_eq!(pool.process_all(vec![0, 1, 2, 3]).unwrap(), vec![0, 100, 200, 300]);
        assert_eq!(pool.live_workers(), 0);
        assert_eq!(pool.active_task_count(), 0);
    }

    #[test]
    fn test_more_tasks_than_workers() {
        let pool = pool(2, 5_000, |n| Ok(n + 1));
        let results = pool.process_all((0..25).collect()).unwrap();
        assert_eq!(results, (1..26).collect::<Vec<_>>());
    }

    #[test]
    fn test_handler_error_fails_fast() {
        let pool = pool(2, 5_000, |n| if n == 3 { Err("three".into()) } else { Ok(n) });
        let err = pool.process_all(vec![1, 2, 3, 4]).unwrap_err();
        match err {
            PoolError::Task(TaskError::Failed { message, .. }) => assert_eq!(message, "three"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_settled_isolates_failures() {
        let pool = pool(2, 5_000, |n| if n % 2 == 0 { Ok(n) } else { Err(format!("odd {n}")) });
        let results = pool.process_all_settled(vec![0, 1, 2]).unwrap();
        assert_eq!(results[0], Ok(0));
        assert!(matches!(results[1], Err(TaskError::Failed { .. })));
        assert_eq!(results[2], Ok(2));
    }

    #[test]
    fn test_crash_rejects_only_owned_task() {
        let pool = pool(2, 5_000, |n| {
            if n == 1 {
                panic!("bad task");
            }
            Ok(n)
        });
        let results = pool.process_all_settled(vec![0, 1, 2, 3]).unwrap();
        assert_eq!(results[0], Ok(0));
        match &results[1] {
            Err(TaskError::WorkerCrashed { message, .. }) => assert_eq!(message, "bad task"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(results[2], Ok(2));
        assert_eq!(results[3], Ok(3));
    }

    #[test]
    fn test_last_worker_crash_rejects_backlog() {
        let pool = pool(1, 5_000, |_| -> Result<u64, String> { panic!("always") });
        let results = pool.process_all_settled(vec![0, 1, 2]).unwrap();
        assert!(matches!(results[0], Err(TaskError::WorkerCrashed { .. })));
        assert!(matches!(results[1], Err(TaskError::NoLiveWorkers { .. })));
        assert!(matches!(results[2], Err(TaskError::NoLiveWorkers { .. })));
    }

    #[test]
    fn test_timeout_rejects_and_frees_session() {
        let release = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&release);
        let pool = pool(1, 50, move |n| {
            while !flag.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            Ok(n)
        });

        let started = Instant::now();
        let err = pool.process_task(7).unwrap_err();
        assert!(matches!(err, PoolError::Task(TaskError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(pool.active_task_count(), 0);
        assert_eq!(pool.live_workers(), 0);

        release.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_task_ids_are_not_reused() {
        let pool = pool(1, 5_000, |_| Err("x".into()));
        let first = pool.process_task(1).unwrap_err();
        let second = pool.process_task(1).unwrap_err();
        match (first, second) {
            (PoolError::Task(a), PoolError::Task(b)) => assert!(b.task_id() > a.task_id()),
            other => panic!("unexpected errors: {other:?}"),
        }
    }

    #[test]
    fn test_progress_reports_every_settlement() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let pool = pool(2, 5_000, Ok).with_progress(move |done, total| {
            assert!(done <= total);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pool.process_all(vec![1, 2, 3, 4, 5]).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_process_batches_concatenates() {
        let pool = pool(2, 5_000, |n| Ok(n * 2));
        let results = pool.process_batches((0..10).collect(), 3).unwrap();
        assert_eq!(results, (0..10).map(|n| n * 2).collect::<Vec<_>>());
    }
}
