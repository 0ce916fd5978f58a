//! Configuration loaded from `.blockaudit.toml`.

mod loader;
mod parallel;
mod pool;
pub mod retry;
mod scoring;

pub use loader::{
    directory_ancestors, load_config, load_config_from_path, parse_and_validate_config,
    CONFIG_FILE_NAME,
};
pub use parallel::{ParallelConfig, StreamConfig};
pub use pool::WorkerPoolConfig;
pub use retry::{RetryConfig, RetryStrategy};
pub use scoring::ScoringConfig;

use serde::{Deserialize, Serialize};

fn default_max_fields() -> usize {
    25
}

fn default_max_nesting_depth() -> usize {
    4
}

/// Thresholds and failure policy for the analyzers and the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisSettings {
    /// Field count above which a block is flagged as oversized (default: 25)
    #[serde(default = "default_max_fields")]
    pub max_fields: usize,

    /// Nesting depth above which a block is flagged (default: 4)
    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    /// Fail the stage when a pool task times out or crashes, instead of
    /// recording an analysis-error issue for the artifact (default: false)
    #[serde(default)]
    pub fail_on_task_error: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_fields: default_max_fields(),
            max_nesting_depth: default_max_nesting_depth(),
            fail_on_task_error: false,
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BlockauditConfig {
    #[serde(default)]
    pub pool: WorkerPoolConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
}

impl BlockauditConfig {
    /// Render as TOML, used by `blockaudit init`.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let config = BlockauditConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: BlockauditConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let parsed: BlockauditConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.analysis.max_fields, 25);
        assert!(!parsed.analysis.fail_on_task_error);
    }
}
