use anyhow::{Context, Result};
use blockaudit::cli::{init_config, AnalyzeArgs, Cli, Commands, OutputFormat};
use blockaudit::config::{load_config, load_config_from_path, BlockauditConfig};
use blockaudit::core::AnalysisResult;
use blockaudit::io::JsonArtifactLoader;
use blockaudit::observability::{enable_profiling, get_profile_report};
use blockaudit::orchestrator::{Orchestrator, ProgressBarObserver};
use blockaudit::progress::{ProgressConfig, ProgressManager};
use clap::Parser;
use colored::Colorize;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit status when `--fail-on-critical` finds critical issues.
const CRITICAL_EXIT_CODE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Analyze(args) => handle_analyze(args),
        Commands::Init { force } => handle_init(force),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("blockaudit={default_level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_init(force: bool) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
    let path = init_config(&cwd, force)?;
    println!("Created {} configuration file", path.display());
    Ok(ExitCode::SUCCESS)
}

fn resolve_config(args: &AnalyzeArgs) -> Result<BlockauditConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path)?,
        None => load_config(&std::env::current_dir().unwrap_or_default()),
    };
    args.apply_overrides(&mut config);
    Ok(config)
}

fn handle_analyze(args: AnalyzeArgs) -> Result<ExitCode> {
    init_tracing(args.verbosity);

    let config = resolve_config(&args)?;
    let options = args.to_options()?;
    if args.profile {
        enable_profiling();
    }

    let manager = ProgressManager::new(ProgressConfig::from_env(args.quiet, args.verbosity));
    let loader = JsonArtifactLoader::new(config.parallel.clone(), config.stream.clone());
    let orchestrator = Orchestrator::new(config, loader)?
        .with_observer(Arc::new(ProgressBarObserver::new(manager.clone())));

    let result = orchestrator.run(&options)?;
    let _ = manager.clear();

    let rendered = match args.format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result).context("Failed to serialize result")?
        }
        OutputFormat::Summary => render_summary(&result),
    };
    write_output(&args, &rendered)?;

    if args.profile {
        eprintln!("{}", get_profile_report().to_summary());
    }

    if args.fail_on_critical && result.report.has_critical() {
        return Ok(ExitCode::from(CRITICAL_EXIT_CODE));
    }
    Ok(ExitCode::SUCCESS)
}

fn write_output(args: &AnalyzeArgs, rendered: &str) -> Result<()> {
    match &args.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{rendered}").context("Failed to write to stdout")
        }
    }
}

fn render_summary(result: &AnalysisResult) -> String {
    let report = &result.report;
    let summary = &report.summary;
    let counts = &summary.by_severity;
    let mut out = String::new();

    out.push_str(&format!("{}\n", "Block Audit".bold().underline()));
    out.push_str(&format!(
        "Scope: {}  Artifacts: {}  Failed: {}\n",
        result.scope, summary.artifacts_analyzed, summary.failed_artifacts
    ));

    let score = format!("{:.1}", summary.score);
    let score = if summary.score >= 80.0 {
        score.green()
    } else if summary.score >= 50.0 {
        score.yellow()
    } else {
        score.red()
    };
    out.push_str(&format!("Score: {score}/100\n"));
    out.push_str(&format!(
        "Issues: {} ({} critical, {} high, {} medium, {} low)\n",
        summary.total_issues,
        counts.critical.to_string().red().bold(),
        counts.high.to_string().red(),
        counts.medium.to_string().yellow(),
        counts.low,
    ));

    if result.integration.is_some() {
        out.push_str(&format!(
            "Integration: {} pairs, {} invalid\n",
            summary.integration_pairs, summary.invalid_integrations
        ));
    }
    if let Some(tests) = &result.tests {
        out.push_str(&format!(
            "Tests: {} suites, {} cases\n",
            tests.suites, tests.test_cases
        ));
    }
    if let Some(plan) = &report.migration {
        out.push_str(&format!(
            "Migration: {} breaking changes across {} blocks\n",
            plan.breaking_changes,
            plan.blocks.len()
        ));
    }

    if !report.top_issues.is_empty() {
        out.push_str(&format!("\n{}\n", "Top issues".bold()));
        for ranked in &report.top_issues {
            out.push_str(&format!(
                "  [{}] {}: {}\n",
                ranked.issue.severity.to_string().to_uppercase(),
                ranked.artifact.cyan(),
                ranked.issue.title
            ));
        }
    }

    if !report.guide.items.is_empty() {
        out.push_str(&format!(
            "\n{} (~{:.1}h)\n",
            "Implementation guide".bold(),
            report.guide.total_hours
        ));
        for item in &report.guide.items {
            out.push_str(&format!(
                "  {} [{} effort, {} issues]\n",
                item.title, item.effort, item.issue_count
            ));
        }
    }

    let skipped: Vec<_> = report.skipped_stages().collect();
    if !skipped.is_empty() {
        out.push_str(&format!("\n{}\n", "Skipped stages".dimmed()));
        for record in skipped {
            out.push_str(&format!(
                "  {}: {}\n",
                record.stage.label(),
                record.skip_reason().unwrap_or_default()
            ));
        }
    }

    out
}
