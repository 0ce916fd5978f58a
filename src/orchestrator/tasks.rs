//! Payloads sent to pool workers and the handlers that run them.

use super::testgen;
use crate::analyzers::{AnalyzerRegistry, IntegrationPair, PatternPair};
use crate::core::{
    Artifact, ArtifactAnalysisResult, GeneratedTestSuite, IntegrationResult,
    PatternComparisonResult,
};
use std::sync::Arc;

/// Work of the cross-check stages. Integration and pattern tasks share one
/// pool call.
#[derive(Debug, Clone)]
pub enum CrossCheckTask {
    Integrate(IntegrationPair),
    Compare(PatternPair),
}

#[derive(Debug, Clone)]
pub enum CrossCheckOutcome {
    Integration(IntegrationResult),
    Pattern(PatternComparisonResult),
}

pub fn analyze_handler(
    registry: Arc<AnalyzerRegistry>,
) -> impl Fn(Artifact) -> Result<ArtifactAnalysisResult, String> + Send + Sync + 'static {
    move |artifact| Ok(registry.analyze_artifact(&artifact))
}

/// Integration never fails; a pattern comparison against a malformed
/// reference fails the task.
pub fn cross_check_handler(
    registry: Arc<AnalyzerRegistry>,
) -> impl Fn(CrossCheckTask) -> Result<CrossCheckOutcome, String> + Send + Sync + 'static {
    move |task| match task {
        CrossCheckTask::Integrate(pair) => Ok(CrossCheckOutcome::Integration(
            registry.validate_integration(&pair),
        )),
        CrossCheckTask::Compare(pair) => registry
            .compare_patterns(&pair)
            .map(CrossCheckOutcome::Pattern)
            .map_err(|e| e.to_string()),
    }
}

pub fn testgen_handler() -> impl Fn(Artifact) -> Result<GeneratedTestSuite, String> + Send + Sync + 'static {
    |artifact| Ok(testgen::generate_suite(&artifact))
}
