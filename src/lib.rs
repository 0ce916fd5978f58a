//! Quality analysis for CMS block schemas and the React components that
//! render them.
//!
//! Analysis runs as a staged pipeline driven by the [`Orchestrator`]:
//! artifacts are loaded, blocks and components are analyzed in a
//! [`WorkerPool`] of OS threads, matched block/component pairs are
//! cross-checked, and everything is reduced to a scored [`Report`].
//!
//! ```no_run
//! use blockaudit::{AnalysisOptions, BlockauditConfig, JsonArtifactLoader, Orchestrator};
//!
//! let config = BlockauditConfig::default();
//! let loader = JsonArtifactLoader::new(config.parallel.clone(), config.stream.clone());
//! let orchestrator = Orchestrator::new(config, loader)?;
//! let result = orchestrator.run(&AnalysisOptions::new("src/blocks", "src/components"))?;
//! println!("score: {:.1}", result.report.summary.score);
//! # Ok::<(), blockaudit::Error>(())
//! ```

pub mod analyzers;
pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod errors;
pub mod io;
pub mod observability;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod report;

// Re-export commonly used types
pub use crate::errors::{Error, PoolError, Result, TaskError};

pub use crate::config::BlockauditConfig;

pub use crate::core::{
    AnalysisOptions, AnalysisResult, Artifact, ArtifactAnalysisResult, ArtifactKind,
    BlockSchema, ComponentFacts, IntegrationResult, Issue, IssueCategory,
    PatternComparisonResult, Scope, Severity,
};

pub use crate::analyzers::{Analyzer, AnalyzerRegistry};

pub use crate::batch::{BatchProcessor, StreamProcessor};

pub use crate::io::{ArtifactSource, InMemorySource, JsonArtifactLoader};

pub use crate::orchestrator::{AnalysisStage, Orchestrator, ProgressObserver};

pub use crate::pool::WorkerPool;

pub use crate::report::Report;
