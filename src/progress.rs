//! Progress bars for the CLI, built on `indicatif`.
//!
//! # Progress Behavior
//!
//! - **Quiet Mode**: No progress output (respects `BLOCKAUDIT_QUIET` env var and `--quiet` flag)
//! - **Non-TTY**: Progress bars are hidden in CI and piped output
//! - **Verbosity Levels**:
//!   - Level 0 (default): one bar per stage
//!   - Level 1 (-v): stage timings are printed as stages complete
//!
//! ```rust,no_run
//! use blockaudit::progress::{ProgressConfig, ProgressManager, TEMPLATE_ARTIFACTS};
//!
//! let manager = ProgressManager::new(ProgressConfig::from_env(false, 0));
//! let bar = manager.create_bar(40, TEMPLATE_ARTIFACTS);
//! bar.set_message("Analyzing blocks");
//! bar.inc(40);
//! bar.finish_and_clear();
//! ```

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

pub const QUIET_ENV_VAR: &str = "BLOCKAUDIT_QUIET";

pub const TEMPLATE_ARTIFACTS: &str = "📦 {msg} {pos}/{len} artifacts ({percent}%) - {eta}";
pub const TEMPLATE_TASKS: &str = "⚙️  {msg} {pos}/{len} tasks - {per_sec}/sec";
pub const TEMPLATE_SPINNER: &str = "{spinner} {msg}";

#[derive(Debug, Clone, Default)]
pub struct ProgressConfig {
    /// Whether to suppress all progress output
    pub quiet_mode: bool,
    /// Verbosity level (0 = basic, 1 = detailed)
    pub verbosity: u8,
}

impl ProgressConfig {
    pub fn from_env(quiet: bool, verbosity: u8) -> Self {
        let env_quiet = std::env::var(QUIET_ENV_VAR).is_ok();
        Self {
            quiet_mode: quiet || env_quiet,
            verbosity,
        }
    }

    pub fn should_show_progress(&self) -> bool {
        if self.quiet_mode {
            return false;
        }
        use std::io::IsTerminal;
        std::io::stderr().is_terminal()
    }
}

/// Coordinates the bars of one run.
#[derive(Clone)]
pub struct ProgressManager {
    multi: Arc<MultiProgress>,
    config: ProgressConfig,
}

impl ProgressManager {
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            multi: Arc::new(MultiProgress::new()),
            config,
        }
    }

    /// A bar of length `len`; hidden when progress should not be shown.
    pub fn create_bar(&self, len: u64, template: &str) -> ProgressBar {
        if !self.config.should_show_progress() {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(style);
        pb
    }

    pub fn create_spinner(&self, msg: &str) -> ProgressBar {
        if !self.config.should_show_progress() {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::default_spinner()
            .template(TEMPLATE_SPINNER)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(style);
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Print a line above the bars, or to stderr when bars are hidden.
    pub fn println(&self, line: &str) {
        if self.config.quiet_mode {
            return;
        }
        if self.config.should_show_progress() {
            let _ = self.multi.println(line);
        } else {
            eprintln!("{line}");
        }
    }

    pub fn verbosity(&self) -> u8 {
        self.config.verbosity
    }

    /// Clear all bars before printing final output.
    pub fn clear(&self) -> std::io::Result<()> {
        self.multi.clear()
    }
}
