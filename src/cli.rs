use crate::config::{BlockauditConfig, CONFIG_FILE_NAME};
use crate::core::{AnalysisOptions, Scope, Severity};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "blockaudit")]
#[command(about = "Quality analyzer for CMS block schemas and their React components", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze block schemas, components and their integration
    Analyze(AnalyzeArgs),

    /// Write a default .blockaudit.toml in the current directory
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Directory of block schema JSON files
    #[arg(long)]
    pub blocks: PathBuf,

    /// Directory of component fact JSON files
    #[arg(long)]
    pub components: Option<PathBuf>,

    /// Directory of reference block schemas for pattern comparison
    #[arg(long)]
    pub references: Option<PathBuf>,

    /// Which artifacts to analyze
    #[arg(long, value_enum, default_value = "full")]
    pub scope: ScopeArg,

    /// Compare blocks against the reference schemas
    #[arg(long = "compare-patterns")]
    pub compare_patterns: bool,

    /// Generate test-suite outlines
    #[arg(long = "generate-tests")]
    pub generate_tests: bool,

    /// Drop issues below this severity (analysis errors are always kept)
    #[arg(long = "min-severity", value_enum, default_value = "low")]
    pub min_severity: SeverityArg,

    /// Number of pool workers (0 = use the configured value)
    #[arg(short = 'j', long = "jobs", default_value = "0", env = "BLOCKAUDIT_JOBS")]
    pub jobs: usize,

    /// Per-task timeout in milliseconds
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Resubmissions for tasks that timed out or lost their worker
    #[arg(long)]
    pub retries: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "summary")]
    pub format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print stage timings and memory usage after the run
    #[arg(long)]
    pub profile: bool,

    /// Configuration file (defaults to the nearest .blockaudit.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Exit with status 2 when critical issues are found
    #[arg(long = "fail-on-critical")]
    pub fail_on_critical: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Summary,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ScopeArg {
    Full,
    Blocks,
    Components,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Full => Scope::Full,
            ScopeArg::Blocks => Scope::Blocks,
            ScopeArg::Components => Scope::Components,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum SeverityArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<SeverityArg> for Severity {
    fn from(arg: SeverityArg) -> Self {
        match arg {
            SeverityArg::Low => Severity::Low,
            SeverityArg::Medium => Severity::Medium,
            SeverityArg::High => Severity::High,
            SeverityArg::Critical => Severity::Critical,
        }
    }
}

impl AnalyzeArgs {
    /// Options of the run. A components directory is required whenever the
    /// scope reaches components.
    pub fn to_options(&self) -> Result<AnalysisOptions> {
        let scope = Scope::from(self.scope);
        let components = match (&self.components, scope) {
            (Some(dir), _) => dir.clone(),
            (None, Scope::Blocks) => PathBuf::new(),
            (None, _) => bail!("--components is required unless --scope blocks"),
        };
        if self.compare_patterns && self.references.is_none() {
            bail!("--compare-patterns needs --references");
        }

        let mut options = AnalysisOptions::new(&self.blocks, components)
            .with_scope(scope)
            .with_tests(self.generate_tests)
            .with_pattern_comparison(self.compare_patterns)
            .with_min_severity(self.min_severity.into());
        if let Some(dir) = &self.references {
            options = options.with_references(dir);
        }
        Ok(options)
    }

    /// Command-line values take precedence over the configuration file.
    pub fn apply_overrides(&self, config: &mut BlockauditConfig) {
        if self.jobs > 0 {
            config.pool.workers = Some(self.jobs);
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.pool.task_timeout_ms = timeout_ms;
        }
        if let Some(retries) = self.retries {
            config.pool.retries = retries;
        }
    }
}

/// Write the default configuration into `dir`.
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        bail!("Configuration file already exists. Use --force to overwrite.");
    }

    let rendered = BlockauditConfig::default()
        .to_toml()
        .context("Failed to render default configuration")?;
    let contents = format!("# blockaudit configuration\n\n{rendered}");
    std::fs::write(&config_path, contents)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    Ok(config_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn analyze(args: &[&str]) -> AnalyzeArgs {
        let argv = ["blockaudit", "analyze"].iter().chain(args.iter());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Analyze(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_analyze_flags() {
        let args = analyze(&[
            "--blocks",
            "src/blocks",
            "--components",
            "src/components",
            "--scope",
            "components",
            "--min-severity",
            "high",
            "--timeout-ms",
            "500",
            "-vv",
        ]);
        assert_eq!(args.scope, ScopeArg::Components);
        assert_eq!(args.min_severity, SeverityArg::High);
        assert_eq!(args.timeout_ms, Some(500));
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.format, OutputFormat::Summary);
    }

    #[test]
    fn test_components_required_outside_block_scope() {
        let args = analyze(&["--blocks", "b"]);
        assert!(args.to_options().is_err());

        let args = analyze(&["--blocks", "b", "--scope", "blocks"]);
        let options = args.to_options().unwrap();
        assert_eq!(options.scope, Scope::Blocks);
    }

    #[test]
    fn test_pattern_comparison_needs_references() {
        let args = analyze(&["--blocks", "b", "--components", "c", "--compare-patterns"]);
        assert!(args.to_options().is_err());

        let args = analyze(&[
            "--blocks",
            "b",
            "--components",
            "c",
            "--compare-patterns",
            "--references",
            "refs",
        ]);
        let options = args.to_options().unwrap();
        assert!(options.compare_patterns);
        assert_eq!(options.references_dir, Some(PathBuf::from("refs")));
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let args = analyze(&["--blocks", "b", "-j", "3", "--retries", "2"]);
        let mut config = BlockauditConfig::default();
        args.apply_overrides(&mut config);
        assert_eq!(config.pool.workers, Some(3));
        assert_eq!(config.pool.retries, 2);
        assert_eq!(config.pool.task_timeout_ms, 30_000);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = init_config(dir.path(), false).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("[pool]"));

        assert!(init_config(dir.path(), false).is_err());
        assert!(init_config(dir.path(), true).is_ok());
    }
}
