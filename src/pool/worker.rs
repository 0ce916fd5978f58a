//! Worker threads.
//!
//! Each worker owns its inbox and runs one task at a time. Payloads and
//! results are moved across channels, never shared. A panicking handler
//! takes its worker down; the control loop learns about it through a
//! [`WorkerEvent::Crashed`] event.

use super::message::{WorkerCommand, WorkerEvent, WorkerReply};
use super::TaskId;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace};

/// The work a pool executes: the worker-side half of the message contract.
pub trait TaskHandler<T, R>: Send + Sync + 'static {
    fn handle(&self, task: T) -> Result<R, String>;
}

impl<T, R, F> TaskHandler<T, R> for F
where
    F: Fn(T) -> Result<R, String> + Send + Sync + 'static,
{
    fn handle(&self, task: T) -> Result<R, String> {
        self(task)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerStatus {
    Idle,
    /// Running this task. The task may already have timed out.
    Busy(TaskId),
    Dead,
}

pub(crate) struct WorkerHandle<T> {
    pub index: usize,
    pub status: WorkerStatus,
    inbox: Option<Sender<WorkerCommand<T>>>,
    thread: Option<JoinHandle<()>>,
}

/// Decrements the running-thread counter when a worker thread exits,
/// including by panic.
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub(crate) fn spawn_worker<T, R>(
    index: usize,
    handler: Arc<dyn TaskHandler<T, R>>,
    events: Sender<WorkerEvent<R>>,
    running: Arc<AtomicUsize>,
) -> std::io::Result<WorkerHandle<T>>
where
    T: Send + 'static,
    R: Send + 'static,
{
    // Capacity one: a worker never holds more than the task it runs.
    let (inbox, commands) = channel::bounded::<WorkerCommand<T>>(1);

    running.fetch_add(1, Ordering::SeqCst);
    let counter = Arc::clone(&running);
    let spawned = thread::Builder::new()
        .name(format!("blockaudit-worker-{index}"))
        .spawn(move || {
            let _running = RunningGuard(counter);
            worker_loop(index, commands, handler, events);
        });

    match spawned {
        Ok(thread) => Ok(WorkerHandle {
            index,
            status: WorkerStatus::Idle,
            inbox: Some(inbox),
            thread: Some(thread),
        }),
        Err(e) => {
            running.fetch_sub(1, Ordering::SeqCst);
            Err(e)
        }
    }
}

fn worker_loop<T: 'static, R: 'static>(
    index: usize,
    commands: Receiver<WorkerCommand<T>>,
    handler: Arc<dyn TaskHandler<T, R>>,
    events: Sender<WorkerEvent<R>>,
) {
    for command in commands.iter() {
        let (id, data) = match command {
            WorkerCommand::Task { id, data } => (id, data),
            WorkerCommand::Terminate => break,
        };

        trace!(worker = index, task = %id, "task started");
        let event = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(data))) {
            Ok(Ok(result)) => WorkerEvent::Reply {
                worker: index,
                reply: WorkerReply::Result { id, result },
            },
            Ok(Err(error)) => WorkerEvent::Reply {
                worker: index,
                reply: WorkerReply::Error { id, error },
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                debug!(worker = index, task = %id, "worker crashed: {message}");
                let _ = events.send(WorkerEvent::Crashed {
                    worker: index,
                    message,
                });
                return;
            }
        };

        // The session is gone; nobody is waiting for this reply.
        if events.send(event).is_err() {
            return;
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

impl<T> WorkerHandle<T> {
    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Idle
    }

    pub fn is_alive(&self) -> bool {
        self.status != WorkerStatus::Dead
    }

    /// Hand a task to this idle worker. On failure the worker is marked
    /// dead and the payload is returned.
    pub fn send(&mut self, id: TaskId, data: T) -> Result<(), T> {
        let Some(inbox) = self.inbox.as_ref() else {
            self.status = WorkerStatus::Dead;
            return Err(data);
        };
        match inbox.try_send(WorkerCommand::Task { id, data }) {
            Ok(()) => {
                self.status = WorkerStatus::Busy(id);
                Ok(())
            }
            Err(TrySendError::Full(command) | TrySendError::Disconnected(command)) => {
                self.status = WorkerStatus::Dead;
                match command {
                    WorkerCommand::Task { data, .. } => Err(data),
                    // Only tasks are sent through here.
                    WorkerCommand::Terminate => unreachable!("terminate is never re-sent"),
                }
            }
        }
    }

    /// Stop the worker. Idle and dead workers are joined; a worker still
    /// running a handler cannot be pre-empted, so it is detached and exits
    /// once the handler returns and it finds its inbox closed.
    pub fn shutdown(mut self) {
        if let Some(inbox) = self.inbox.take() {
            if self.status == WorkerStatus::Idle {
                let _ = inbox.try_send(WorkerCommand::Terminate);
            }
        }
        if let Some(thread) = self.thread.take() {
            match self.status {
                WorkerStatus::Busy(id) => {
                    debug!(worker = self.index, task = %id, "detaching busy worker");
                }
                WorkerStatus::Idle | WorkerStatus::Dead => {
                    let _ = thread.join();
                }
            }
        }
    }
}
