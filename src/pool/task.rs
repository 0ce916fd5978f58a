//! Task bookkeeping for the control loop.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Instant;

/// Identifier of a submitted task, unique for the lifetime of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Waiting in the backlog for an idle worker
    Queued,
    /// Sent to the worker with this index
    Assigned(usize),
}

/// A task registered in the active-task map.
#[derive(Debug)]
pub(crate) struct WorkerTask<T> {
    pub id: TaskId,
    /// Position in the submitted list; results are restored in this order.
    pub index: usize,
    /// Taken when the task is handed to a worker.
    pub payload: Option<T>,
    pub deadline: Instant,
    pub state: TaskState,
}

impl<T> WorkerTask<T> {
    pub fn new(id: TaskId, index: usize, payload: T, deadline: Instant) -> Self {
        Self {
            id,
            index,
            payload: Some(payload),
            deadline,
            state: TaskState::Queued,
        }
    }
}

/// The active-task map with its FIFO backlog and deadline index.
///
/// Only the control thread touches this, so it needs no locking. Backlog
/// and deadline entries for tasks that already settled are discarded
/// lazily when reached.
#[derive(Debug)]
pub(crate) struct ActiveTasks<T> {
    tasks: HashMap<TaskId, WorkerTask<T>>,
    backlog: VecDeque<TaskId>,
    deadlines: BinaryHeap<Reverse<(Instant, TaskId)>>,
}

impl<T> Default for ActiveTasks<T> {
    fn default() -> Self {
        Self {
            tasks: HashMap::new(),
            backlog: VecDeque::new(),
            deadlines: BinaryHeap::new(),
        }
    }
}

impl<T> ActiveTasks<T> {
    pub fn register(&mut self, task: WorkerTask<T>) {
        self.deadlines.push(Reverse((task.deadline, task.id)));
        self.tasks.insert(task.id, task);
    }

    pub fn enqueue(&mut self, id: TaskId) {
        self.backlog.push_back(id);
    }

    /// Next queued task that is still active.
    pub fn next_queued(&mut self) -> Option<TaskId> {
        while let Some(id) = self.backlog.pop_front() {
            if self
                .tasks
                .get(&id)
                .is_some_and(|t| t.state == TaskState::Queued)
            {
                return Some(id);
            }
        }
        None
    }

    /// Mark a task assigned and hand out its payload.
    pub fn assign(&mut self, id: TaskId, worker: usize) -> Option<T> {
        let task = self.tasks.get_mut(&id)?;
        task.state = TaskState::Assigned(worker);
        task.payload.take()
    }

    pub fn remove(&mut self, id: TaskId) -> Option<WorkerTask<T>> {
        self.tasks.remove(&id)
    }

    /// Earliest deadline among active tasks.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if self.tasks.contains_key(&id) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    /// Remove and return every task whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<WorkerTask<T>> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if let Some(task) = self.tasks.remove(&id) {
                expired.push(task);
            }
        }
        expired
    }

    /// Remove every task still waiting in the backlog.
    pub fn drain_queued(&mut self) -> Vec<WorkerTask<T>> {
        let mut drained = Vec::new();
        while let Some(id) = self.next_queued() {
            if let Some(task) = self.tasks.remove(&id) {
                drained.push(task);
            }
        }
        drained
    }

    /// Remove every remaining task.
    pub fn drain_all(&mut self) -> Vec<WorkerTask<T>> {
        self.backlog.clear();
        self.deadlines.clear();
        self.tasks.drain().map(|(_, task)| task).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.backlog.clear();
        self.deadlines.clear();
    }
}
