//! Configuration for bounded batch and stream processing.
//!
//! Large artifact sets are neither parsed all at once (memory) nor fully
//! serialized (latency). These settings bound both.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_batch_size() -> usize {
    50
}

fn default_concurrency() -> usize {
    4
}

fn default_window_delay_ms() -> u64 {
    5
}

fn default_large_set_threshold() -> usize {
    200
}

fn default_buffer_size() -> usize {
    32
}

/// Configuration for [`crate::batch::BatchProcessor`] and for the
/// orchestrator's switch to chunked pool submission.
///
/// # Example
///
/// ```rust
/// use blockaudit::config::ParallelConfig;
///
/// let config = ParallelConfig {
///     batch_size: 25,
///     concurrency: 2,
///     ..Default::default()
/// };
/// assert_eq!(config.window_size(), 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelConfig {
    /// Items per batch (default: 50)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches processed simultaneously (default: 4)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause after each concurrency window (default: 5ms)
    #[serde(default = "default_window_delay_ms")]
    pub window_delay_ms: u64,

    /// Artifact count above which the orchestrator submits work to the pool
    /// in sequential chunks of `batch_size` (default: 200)
    #[serde(default = "default_large_set_threshold")]
    pub large_set_threshold: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            window_delay_ms: default_window_delay_ms(),
            large_set_threshold: default_large_set_threshold(),
        }
    }
}

impl ParallelConfig {
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Items covered by one concurrency window.
    pub fn window_size(&self) -> usize {
        self.effective_batch_size() * self.effective_concurrency()
    }

    pub fn window_delay(&self) -> Duration {
        Duration::from_millis(self.window_delay_ms)
    }
}

/// Configuration for [`crate::batch::StreamProcessor`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Items buffered before an automatic flush (default: 32)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

impl StreamConfig {
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }
}
