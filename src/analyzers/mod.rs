//! The five analyzers and the registry that dispatches to them.
//!
//! Analyzers are stateless apart from immutable settings. Each takes one
//! typed input and produces one typed output; nothing is shared between
//! calls, so any number of pool workers can run them at once.

pub mod block;
pub mod component;
pub mod integration;
pub mod pattern;
pub mod security;

pub use block::BlockAnalyzer;
pub use component::ComponentAnalyzer;
pub use integration::{match_pairs, IntegrationAnalyzer, IntegrationPair};
pub use pattern::{PatternAnalyzer, PatternPair};
pub use security::SecurityAnalyzer;

use crate::config::AnalysisSettings;
use crate::core::{Artifact, ArtifactAnalysisResult, IntegrationResult, PatternComparisonResult};
use crate::errors::AnalyzerError;
use crate::pool::panic_message;
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

pub trait Analyzer: Send + Sync {
    type Input;
    type Output;

    fn name(&self) -> &'static str;

    fn analyze(&self, input: &Self::Input) -> Result<Self::Output, AnalyzerError>;
}

/// Run an analyzer, turning a panic into [`AnalyzerError::Panicked`].
pub fn run_guarded<A: Analyzer>(analyzer: &A, input: &A::Input) -> Result<A::Output, AnalyzerError> {
    panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(input))).unwrap_or_else(|payload| {
        Err(AnalyzerError::Panicked {
            analyzer: analyzer.name().to_string(),
            message: panic_message(payload.as_ref()),
        })
    })
}

/// Closed dispatch table from artifact kind to analyzers.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerRegistry {
    block: BlockAnalyzer,
    component: ComponentAnalyzer,
    security: SecurityAnalyzer,
    integration: IntegrationAnalyzer,
    pattern: PatternAnalyzer,
}

impl AnalyzerRegistry {
    pub fn new(settings: &AnalysisSettings) -> Self {
        Self {
            block: BlockAnalyzer::new(settings.max_fields, settings.max_nesting_depth),
            ..Self::default()
        }
    }

    /// Analyze one artifact. Never fails: an analyzer error or panic yields
    /// a result carrying a single `analysis-failed` issue.
    pub fn analyze_artifact(&self, artifact: &Artifact) -> ArtifactAnalysisResult {
        let outcome = match artifact {
            Artifact::Block(block) => run_guarded(&self.block, block),
            Artifact::Component(component) => run_guarded(&self.component, component),
        }
        .and_then(|mut result| {
            let findings = run_guarded(&self.security, artifact)?;
            result.extend_issues(findings);
            Ok(result)
        });

        outcome.unwrap_or_else(|e| {
            warn!("{} '{}': {e}", artifact.kind(), artifact.id());
            ArtifactAnalysisResult::failed(artifact.id(), artifact.kind(), artifact.path(), e.to_string())
        })
    }

    /// Cross-check a block against its component. Never fails.
    pub fn validate_integration(&self, pair: &IntegrationPair) -> IntegrationResult {
        run_guarded(&self.integration, pair).unwrap_or_else(|e| {
            warn!("integration '{}' + '{}': {e}", pair.block.slug, pair.component.name);
            IntegrationResult::failed(
                pair.block.slug.clone(),
                pair.component.name.clone(),
                pair.component.path.clone(),
                e.to_string(),
            )
        })
    }

    pub fn compare_patterns(&self, pair: &PatternPair) -> Result<PatternComparisonResult, AnalyzerError> {
        run_guarded(&self.pattern, pair)
    }

    pub fn pattern(&self) -> &PatternAnalyzer {
        &self.pattern
    }
}
