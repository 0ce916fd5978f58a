//! The in-process message contract between the control loop and workers.
//!
//! A worker receives [`WorkerCommand::Task`] and answers with exactly one
//! [`WorkerReply`] carrying the same id. Serialized, the shapes are
//! `{"type":"task","id":..,"data":..}`, `{"type":"result","id":..,"result":..}`
//! and `{"type":"error","id":..,"error":..}`.

use super::TaskId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerCommand<T> {
    Task { id: TaskId, data: T },
    Terminate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WorkerReply<R> {
    Result { id: TaskId, result: R },
    Error { id: TaskId, error: String },
}

impl<R> WorkerReply<R> {
    pub fn id(&self) -> TaskId {
        match self {
            WorkerReply::Result { id, .. } | WorkerReply::Error { id, .. } => *id,
        }
    }
}

/// What the control loop receives from its workers.
#[derive(Debug)]
pub(crate) enum WorkerEvent<R> {
    /// A reply from the worker with this index
    Reply { worker: usize, reply: WorkerReply<R> },
    /// The worker died; it will send nothing further
    Crashed { worker: usize, message: String },
}
