//! Worker pool configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_batch_delay_ms() -> u64 {
    10
}

/// Configuration for [`crate::pool::WorkerPool`].
///
/// ```toml
/// [pool]
/// workers = 4
/// task_timeout_ms = 30000
/// retries = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerPoolConfig {
    /// Number of workers (default: one less than the CPU count, at least 1)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Per-task timeout, armed when the task is queued (default: 30s)
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// How many times a task that timed out or lost its worker is
    /// resubmitted by the retrying entry points (default: 0)
    #[serde(default)]
    pub retries: u32,

    /// Pause between chunks in `process_batches` (default: 10ms)
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            task_timeout_ms: default_task_timeout_ms(),
            retries: 0,
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Effective worker count, never zero.
    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.task_timeout(), Duration::from_secs(30));
        assert_eq!(config.retries, 0);
        assert!(config.effective_workers() >= 1);
    }

    #[test]
    fn test_zero_workers_clamped() {
        let config = WorkerPoolConfig::default().with_workers(0);
        assert_eq!(config.effective_workers(), 1);
    }

    #[test]
    fn test_toml_partial() {
        let config: WorkerPoolConfig = toml::from_str("workers = 3\nretries = 2").unwrap();
        assert_eq!(config.effective_workers(), 3);
        assert_eq!(config.retries, 2);
        assert_eq!(config.task_timeout_ms, 30_000);
    }
}
