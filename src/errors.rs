//! Error types for blockaudit.
//!
//! Three layers, matching how far an error is allowed to travel:
//!
//! - [`AnalyzerError`]: raised inside one analyzer for one artifact. Never
//!   crosses the analyzer boundary; the registry turns it into an
//!   `analysis-error` issue.
//! - [`TaskError`] / [`PoolError`]: raised by the worker pool. Task errors
//!   are scoped to one task, pool errors to one `process_*` call.
//! - [`Error`]: the crate-level error returned by the orchestrator, carrying
//!   the stage that failed.

use crate::orchestrator::stage::AnalysisStage;
use crate::pool::TaskId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single analyzer on a single artifact.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    /// The artifact does not have the shape the analyzer requires
    #[error("malformed artifact '{artifact}': {message}")]
    MalformedArtifact { artifact: String, message: String },

    /// The analyzer panicked; the message is the panic payload
    #[error("analyzer '{analyzer}' panicked: {message}")]
    Panicked { analyzer: String, message: String },
}

impl AnalyzerError {
    pub fn malformed(artifact: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedArtifact {
            artifact: artifact.into(),
            message: message.into(),
        }
    }
}

/// Terminal failure of one task submitted to the worker pool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The task did not settle before its deadline
    #[error("task {task_id} timed out after {timeout:?}")]
    Timeout { task_id: TaskId, timeout: Duration },

    /// The worker executing the task crashed
    #[error("worker {worker} crashed while running task {task_id}: {message}")]
    WorkerCrashed {
        task_id: TaskId,
        worker: usize,
        message: String,
    },

    /// The handler returned an error reply
    #[error("task {task_id} failed: {message}")]
    Failed { task_id: TaskId, message: String },

    /// Every worker in the pool has crashed
    #[error("task {task_id} could not be scheduled: no live workers remain")]
    NoLiveWorkers { task_id: TaskId },
}

impl TaskError {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Timeout { task_id, .. }
            | Self::WorkerCrashed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::NoLiveWorkers { task_id } => *task_id,
        }
    }

    /// Whether resubmitting the task could succeed. Handler failures are
    /// deterministic and are not retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Failure of a whole pool call.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A worker thread could not be started
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: std::io::Error,
    },

    /// A task failed and the call was fail-fast
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    /// Input artifacts could not be loaded
    #[error("failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Worker pool errors outside of any stage
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A pipeline stage failed; completed stages are discarded
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: AnalysisStage,
        #[source]
        source: Box<Error>,
    },

    /// IO errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with the stage it occurred in. Already-staged errors
    /// keep their original stage.
    pub fn in_stage(self, stage: AnalysisStage) -> Self {
        match self {
            staged @ Self::Stage { .. } => staged,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<AnalysisStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_retryable() {
        let timeout = TaskError::Timeout {
            task_id: TaskId(1),
            timeout: Duration::from_millis(10),
        };
        let failed = TaskError::Failed {
            task_id: TaskId(2),
            message: "bad input".into(),
        };
        assert!(timeout.is_retryable());
        assert!(!failed.is_retryable());
        assert_eq!(failed.task_id(), TaskId(2));
    }

    #[test]
    fn test_in_stage_keeps_first_stage() {
        let err = Error::Config("x".into())
            .in_stage(AnalysisStage::Loading)
            .in_stage(AnalysisStage::GeneratingReport);
        assert_eq!(err.stage(), Some(AnalysisStage::Loading));
        assert!(err.to_string().contains("loading"));
    }

    #[test]
    fn test_pool_error_from_task_error() {
        let err: PoolError = TaskError::NoLiveWorkers { task_id: TaskId(7) }.into();
        assert!(err.to_string().contains("no live workers"));
    }
}
