//! Backoff configuration for resubmitting failed pool tasks.
//!
//! The pool never retries on its own. Callers that opt in through
//! [`crate::pool::WorkerPool::process_all_settled_with_retries`] resubmit
//! tasks that timed out or lost their worker, waiting between attempts as
//! configured here. The attempt budget is `[pool] retries`.
//!
//! ```toml
//! [retry]
//! strategy = "exponential"
//! base_delay_ms = 100
//! max_delay_ms = 5000
//! jitter_factor = 0.1
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay policy between resubmission rounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Delay strategy (default: exponential)
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Base delay between rounds in milliseconds (default: 100)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on a single delay in milliseconds (default: 5000)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter factor: each delay is scaled by a random factor in
    /// `[1 - jitter_factor, 1 + jitter_factor]` (default: 0.1)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::default(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Resubmit immediately, without waiting.
    pub fn immediate() -> Self {
        Self {
            strategy: RetryStrategy::Constant,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
        }
    }

    /// Delay before resubmission round `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay_ms as f64;
        let attempt = attempt.max(1);

        let delay_ms = match self.strategy {
            RetryStrategy::Constant => base_ms,
            RetryStrategy::Linear => base_ms * f64::from(attempt),
            RetryStrategy::Exponential => base_ms * 2.0_f64.powi(attempt as i32 - 1),
            RetryStrategy::Fibonacci => base_ms * fibonacci(attempt) as f64,
        };

        let jittered_ms = if self.jitter_factor > 0.0 {
            apply_jitter(delay_ms, self.jitter_factor)
        } else {
            delay_ms
        };

        Duration::from_millis(jittered_ms.min(self.max_delay_ms as f64) as u64)
    }
}

/// How the delay grows between rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetryStrategy {
    /// Same delay every round.
    Constant,
    /// base * attempt.
    Linear,
    /// base * 2^(attempt-1).
    #[default]
    Exponential,
    /// base * fib(attempt).
    Fibonacci,
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

/// The nth fibonacci number (1-indexed).
fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Scale `delay_ms` by a random factor in `[1 - factor, 1 + factor]`.
fn apply_jitter(delay_ms: f64, factor: f64) -> f64 {
    let factor = factor.min(1.0);
    delay_ms * rand::thread_rng().gen_range(1.0 - factor..=1.0 + factor)
}
