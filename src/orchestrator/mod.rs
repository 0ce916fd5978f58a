//! Analysis orchestration.
//!
//! The [`Orchestrator`] drives one invocation through the stages of
//! [`AnalysisStage::PIPELINE`] on the caller's thread. All analysis runs in
//! pool workers; the orchestrator only plans tasks, merges outcomes and
//! records what each stage did.
//!
//! A failing stage aborts the run with [`Error::Stage`]. Results of the
//! stages that completed before it are dropped, so a returned
//! [`AnalysisResult`] is always complete.
//!
//! # Task failures
//!
//! Analyzer errors never reach the orchestrator as errors: the registry
//! turns them into `analysis-failed` issues. Pool failures (timeout, crashed
//! worker) are recovered the same way per artifact unless
//! `[analysis] fail_on_task_error` is set, in which case they fail the stage.

pub mod observer;
pub mod stage;
pub mod tasks;
pub mod testgen;

pub use observer::{
    NoopObserver, ObserverEvent, ProgressBarObserver, ProgressObserver, RecordingObserver,
    TracingObserver,
};
pub use stage::{AnalysisStage, StageRecord, StageStatus};

use crate::analyzers::{match_pairs, AnalyzerRegistry, IntegrationPair, PatternPair};
use crate::config::BlockauditConfig;
use crate::core::{
    AnalysisOptions, AnalysisResult, AnalysisResultDraft, Artifact, ArtifactAnalysisResult,
    ArtifactKind, ArtifactSet, Issue, IssueCategory, IntegrationResult, PatternComparisonResult,
    Severity, TestGenerationSummary,
};
use crate::errors::{Error, PoolError, Result, TaskError};
use crate::io::ArtifactSource;
use crate::observability::profile_stage;
use crate::pool::{TaskHandler, WorkerPool};
use crate::report::ReportGenerator;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tasks::{CrossCheckOutcome, CrossCheckTask};
use tracing::{debug, info, warn};

pub struct Orchestrator {
    config: BlockauditConfig,
    source: Box<dyn ArtifactSource>,
    registry: Arc<AnalyzerRegistry>,
    observer: Arc<dyn ProgressObserver>,
    current: Mutex<AnalysisStage>,
}

impl Orchestrator {
    pub fn new(config: BlockauditConfig, source: impl ArtifactSource + 'static) -> Result<Self> {
        config.scoring.validate().map_err(Error::Config)?;
        let registry = Arc::new(AnalyzerRegistry::new(&config.analysis));
        Ok(Self {
            config,
            source: Box::new(source),
            registry,
            observer: Arc::new(NoopObserver),
            current: Mutex::new(AnalysisStage::Idle),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &BlockauditConfig {
        &self.config
    }

    /// The stage being executed, `Done` after a successful run, or the
    /// stage that failed.
    pub fn current_stage(&self) -> AnalysisStage {
        *self.current.lock()
    }

    pub fn run(&self, options: &AnalysisOptions) -> Result<AnalysisResult> {
        let scope = options.scope;
        let mut draft = AnalysisResultDraft::new(scope);
        let mut stages = Vec::with_capacity(AnalysisStage::PIPELINE.len());
        info!(%scope, "analysis started");

        let artifacts = self.execute(AnalysisStage::Loading, 0, &mut stages, || {
            self.load(options)
        })?;

        if scope.includes_blocks() {
            let tasks: Vec<Artifact> = artifacts.blocks.iter().cloned().map(Artifact::Block).collect();
            draft.blocks = self.execute(AnalysisStage::AnalyzingBlocks, tasks.len(), &mut stages, || {
                self.analyze(AnalysisStage::AnalyzingBlocks, tasks)
            })?;
        } else {
            self.skip(AnalysisStage::AnalyzingBlocks, format!("scope is {scope}"), &mut stages);
        }

        if scope.includes_components() {
            let tasks: Vec<Artifact> = artifacts
                .components
                .iter()
                .cloned()
                .map(Artifact::Component)
                .collect();
            draft.components =
                self.execute(AnalysisStage::AnalyzingComponents, tasks.len(), &mut stages, || {
                    self.analyze(AnalysisStage::AnalyzingComponents, tasks)
                })?;
        } else {
            self.skip(AnalysisStage::AnalyzingComponents, format!("scope is {scope}"), &mut stages);
        }

        // Integration needs both analysis stages finished; pattern
        // comparison rides along in the same pool call.
        let integration_plan = self.plan_integration(options, &artifacts);
        let pattern_plan = self.plan_patterns(options, &artifacts);
        match (integration_plan, pattern_plan) {
            (Err(integration_reason), Err(pattern_reason)) => {
                self.skip(AnalysisStage::ValidatingIntegration, integration_reason, &mut stages);
                self.skip(AnalysisStage::ComparingPatterns, pattern_reason, &mut stages);
            }
            (integration_plan, pattern_plan) => {
                let lead = if integration_plan.is_ok() {
                    AnalysisStage::ValidatingIntegration
                } else {
                    AnalysisStage::ComparingPatterns
                };
                if let Err(reason) = &integration_plan {
                    self.skip(AnalysisStage::ValidatingIntegration, reason.clone(), &mut stages);
                }

                let run_integration = integration_plan.is_ok();
                let run_patterns = pattern_plan.is_ok();
                let pattern_skip = pattern_plan.as_ref().err().cloned();

                let cross_tasks: Vec<CrossCheckTask> = integration_plan
                    .unwrap_or_default()
                    .into_iter()
                    .map(CrossCheckTask::Integrate)
                    .chain(
                        pattern_plan
                            .unwrap_or_default()
                            .into_iter()
                            .map(CrossCheckTask::Compare),
                    )
                    .collect();

                let blocks = &mut draft.blocks;
                let (integration, patterns) =
                    self.execute(lead, cross_tasks.len(), &mut stages, || {
                        self.cross_check(lead, cross_tasks, blocks)
                    })?;

                if run_integration {
                    draft.integration = Some(integration);
                }
                if run_patterns {
                    draft.patterns = Some(patterns);
                    if lead != AnalysisStage::ComparingPatterns {
                        self.piggyback(AnalysisStage::ComparingPatterns, &mut stages);
                    }
                } else if let Some(reason) = pattern_skip {
                    self.skip(AnalysisStage::ComparingPatterns, reason, &mut stages);
                }
            }
        }

        match self.plan_tests(options, &artifacts) {
            Ok(tasks) => {
                draft.tests = Some(self.execute(
                    AnalysisStage::GeneratingTests,
                    tasks.len(),
                    &mut stages,
                    || self.generate_tests(tasks),
                )?);
            }
            Err(reason) => self.skip(AnalysisStage::GeneratingTests, reason, &mut stages),
        }

        filter_by_severity(&mut draft, options.min_severity);

        draft.stages = stages.clone();
        let report = self.execute(AnalysisStage::GeneratingReport, 0, &mut stages, || {
            Ok(ReportGenerator::new(&self.config.scoring).generate(&draft))
        })?;
        draft.stages = stages;

        *self.current.lock() = AnalysisStage::Done;
        info!(
            issues = report.summary.total_issues,
            score = report.summary.score,
            "analysis finished"
        );
        Ok(draft.finish(report))
    }

    /// Run one stage: notify the observer, profile it, attribute any error
    /// to it and record its duration.
    fn execute<T>(
        &self,
        stage: AnalysisStage,
        total: usize,
        stages: &mut Vec<StageRecord>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        *self.current.lock() = stage;
        info!(stage = %stage, total, "stage started");
        self.observer.on_stage_started(stage, total);

        let start = Instant::now();
        let output = profile_stage(stage.as_str(), f).map_err(|e| e.in_stage(stage))?;
        let elapsed = start.elapsed();

        self.observer.on_stage_completed(stage, elapsed);
        stages.push(StageRecord::executed(stage, elapsed.as_millis() as u64));
        Ok(output)
    }

    fn skip(&self, stage: AnalysisStage, reason: impl Into<String>, stages: &mut Vec<StageRecord>) {
        let reason = reason.into();
        debug!(stage = %stage, "stage skipped: {reason}");
        self.observer.on_stage_skipped(stage, &reason);
        stages.push(StageRecord::skipped(stage, reason));
    }

    /// Record a stage whose work ran inside the previous stage's pool call.
    fn piggyback(&self, stage: AnalysisStage, stages: &mut Vec<StageRecord>) {
        let duration_ms = stages.last().map(|r| r.duration_ms).unwrap_or(0);
        self.observer
            .on_stage_completed(stage, std::time::Duration::from_millis(duration_ms));
        stages.push(StageRecord::executed(stage, duration_ms));
    }

    fn load(&self, options: &AnalysisOptions) -> Result<ArtifactSet> {
        let mut set = ArtifactSet::default();
        if options.scope.includes_blocks() {
            let blocks = self.source.load_blocks(&options.blocks_dir)?;
            set.blocks = dedupe(blocks, |b| &b.slug, ArtifactKind::Block);
        }
        if options.scope.includes_components() {
            let components = self.source.load_components(&options.components_dir)?;
            set.components = dedupe(components, |c| &c.name, ArtifactKind::Component);
        }
        if let (Some(dir), true) = (&options.references_dir, options.compare_patterns) {
            set.references = self.source.load_references(dir)?;
        }
        info!(
            blocks = set.blocks.len(),
            components = set.components.len(),
            references = set.references.len(),
            "artifacts loaded"
        );
        Ok(set)
    }

    /// Submit `tasks` to a fresh pool, reporting progress against `stage`.
    /// Large sets go through sequential chunks.
    fn run_pool<T, R>(
        &self,
        stage: AnalysisStage,
        tasks: Vec<T>,
        handler: impl TaskHandler<T, R>,
    ) -> Result<Vec<std::result::Result<R, TaskError>>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
    {
        let observer = Arc::clone(&self.observer);
        let pool = WorkerPool::new(self.config.pool.clone(), handler)
            .with_retry_policy(self.config.retry.clone())
            .with_progress(move |done, total| observer.on_progress(stage, done, total));

        let outcomes = if tasks.len() > self.config.parallel.large_set_threshold {
            let batch_size = self.config.parallel.effective_batch_size();
            debug!(stage = %stage, tasks = tasks.len(), batch_size, "large set, processing in batches");
            pool.process_batches_settled_with_retries(tasks, batch_size)?
        } else {
            pool.process_all_settled_with_retries(tasks)?
        };
        Ok(outcomes)
    }

    /// Unwrap a task outcome, substituting `fallback` for pool failures
    /// unless they are configured to be fatal. Handler errors are always
    /// recovered.
    fn recover<R>(
        &self,
        outcome: std::result::Result<R, TaskError>,
        fallback: impl FnOnce(&TaskError) -> R,
    ) -> Result<R> {
        match outcome {
            Ok(value) => Ok(value),
            Err(err) if err.is_retryable() && self.config.analysis.fail_on_task_error => {
                Err(PoolError::Task(err).into())
            }
            Err(err) => {
                warn!("recovering from task failure: {err}");
                Ok(fallback(&err))
            }
        }
    }

    fn analyze(&self, stage: AnalysisStage, tasks: Vec<Artifact>) -> Result<Vec<ArtifactAnalysisResult>> {
        let keys: Vec<(String, ArtifactKind, PathBuf)> = tasks
            .iter()
            .map(|a| (a.id().to_string(), a.kind(), a.path().to_path_buf()))
            .collect();
        let outcomes = self.run_pool(stage, tasks, tasks::analyze_handler(Arc::clone(&self.registry)))?;

        keys.into_iter()
            .zip(outcomes)
            .map(|((id, kind, path), outcome)| {
                self.recover(outcome, |err| {
                    ArtifactAnalysisResult::failed(id, kind, path, err.to_string())
                })
            })
            .collect()
    }

    fn plan_integration(
        &self,
        options: &AnalysisOptions,
        artifacts: &ArtifactSet,
    ) -> std::result::Result<Vec<IntegrationPair>, String> {
        if !options.scope.is_full() {
            return Err(format!("scope is {}", options.scope));
        }
        if artifacts.blocks.is_empty() {
            return Err("no blocks loaded".to_string());
        }
        if artifacts.components.is_empty() {
            return Err("no components loaded".to_string());
        }
        let pairs: Vec<IntegrationPair> = match_pairs(&artifacts.blocks, &artifacts.components)
            .into_iter()
            .map(|(b, c)| IntegrationPair {
                block: artifacts.blocks[b].clone(),
                component: artifacts.components[c].clone(),
            })
            .collect();
        if pairs.is_empty() {
            return Err("no block matched a component".to_string());
        }
        Ok(pairs)
    }

    fn plan_patterns(
        &self,
        options: &AnalysisOptions,
        artifacts: &ArtifactSet,
    ) -> std::result::Result<Vec<PatternPair>, String> {
        if !options.compare_patterns {
            return Err("not requested".to_string());
        }
        if !options.scope.is_full() {
            return Err(format!("scope is {}", options.scope));
        }
        if artifacts.blocks.is_empty() {
            return Err("no blocks loaded".to_string());
        }
        let patterns = self.registry.pattern();
        Ok(artifacts
            .blocks
            .iter()
            .map(|block| PatternPair {
                block: block.clone(),
                reference: patterns.reference_for(block, &artifacts.references),
            })
            .collect())
    }

    fn cross_check(
        &self,
        stage: AnalysisStage,
        tasks: Vec<CrossCheckTask>,
        blocks: &mut [ArtifactAnalysisResult],
    ) -> Result<(Vec<IntegrationResult>, Vec<PatternComparisonResult>)> {
        let keys = tasks.clone();
        let outcomes = self.run_pool(stage, tasks, tasks::cross_check_handler(Arc::clone(&self.registry)))?;

        let mut integration = Vec::new();
        let mut patterns = Vec::new();
        for (task, outcome) in keys.into_iter().zip(outcomes) {
            match self.recover(outcome.map(Ok), |err| Err(err.to_string()))? {
                Ok(CrossCheckOutcome::Integration(result)) => integration.push(result),
                Ok(CrossCheckOutcome::Pattern(result)) => patterns.push(result),
                Err(message) => match task {
                    CrossCheckTask::Integrate(pair) => integration.push(IntegrationResult::failed(
                        pair.block.slug,
                        pair.component.name,
                        pair.component.path,
                        message,
                    )),
                    CrossCheckTask::Compare(pair) => {
                        // Reported on the block itself; the comparison is omitted.
                        if let Some(block) = blocks.iter_mut().find(|b| b.artifact == pair.block.slug) {
                            block.push_issue(Issue::analysis_failed(
                                &pair.block.path,
                                format!(
                                    "pattern comparison against '{}' failed: {message}",
                                    pair.reference.slug
                                ),
                            ));
                        }
                    }
                },
            }
        }
        Ok((integration, patterns))
    }

    fn plan_tests(
        &self,
        options: &AnalysisOptions,
        artifacts: &ArtifactSet,
    ) -> std::result::Result<Vec<Artifact>, String> {
        if !options.generate_tests {
            return Err("not requested".to_string());
        }
        if !options.scope.is_full() {
            return Err(format!("scope is {}", options.scope));
        }
        if artifacts.is_empty() {
            return Err("no artifacts loaded".to_string());
        }
        Ok(artifacts
            .blocks
            .iter()
            .cloned()
            .map(Artifact::Block)
            .chain(artifacts.components.iter().cloned().map(Artifact::Component))
            .collect())
    }

    fn generate_tests(&self, tasks: Vec<Artifact>) -> Result<TestGenerationSummary> {
        let outcomes = self.run_pool(AnalysisStage::GeneratingTests, tasks, tasks::testgen_handler())?;
        let mut suites = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(suite) = self.recover(outcome.map(Some), |_| None)? {
                suites.push(suite);
            }
        }
        Ok(TestGenerationSummary::from_suites(suites))
    }
}

/// Keep the first artifact for every id.
fn dedupe<T>(items: Vec<T>, id: impl Fn(&T) -> &String, kind: ArtifactKind) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(id(item).clone());
            if !fresh {
                warn!("duplicate {kind} '{}' ignored", id(item));
            }
            fresh
        })
        .collect()
}

/// Drop issues below `min`. Analysis errors are always kept.
fn filter_by_severity(draft: &mut AnalysisResultDraft, min: Severity) {
    let keep = |issue: &Issue| issue.severity >= min || issue.category == IssueCategory::AnalysisError;
    for result in draft.blocks.iter_mut().chain(draft.components.iter_mut()) {
        result.issues.retain(keep);
    }
    if let Some(integration) = draft.integration.as_mut() {
        for result in integration {
            result.issues.retain(keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerPoolConfig;
    use crate::core::{BlockSchema, ComponentFacts, FieldSchema, PropFact, Scope};
    use crate::io::InMemorySource;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config() -> BlockauditConfig {
        BlockauditConfig {
            pool: WorkerPoolConfig::default()
                .with_workers(2)
                .with_timeout(Duration::from_secs(10)),
            ..BlockauditConfig::default()
        }
    }

    fn hero() -> BlockSchema {
        BlockSchema::new(
            "hero",
            vec![
                FieldSchema::new("heading", "text").required(),
                FieldSchema::new("subheading", "text"),
            ],
        )
    }

    fn hero_component() -> ComponentFacts {
        let mut component = ComponentFacts::new("HeroBlock", "components/HeroBlock.tsx");
        component.props = vec![PropFact {
            name: "heading".into(),
            type_name: Some("string".into()),
            optional: false,
        }];
        component.exports = vec!["default".into()];
        component
    }

    fn options(scope: Scope) -> AnalysisOptions {
        AnalysisOptions::new("blocks", "components").with_scope(scope)
    }

    fn statuses(result: &AnalysisResult) -> Vec<(AnalysisStage, bool)> {
        result.stages.iter().map(|r| (r.stage, r.was_executed())).collect()
    }

    #[test]
    fn test_full_scope_runs_integration() {
        let source = InMemorySource::default()
            .with_blocks(vec![hero()])
            .with_components(vec![hero_component()]);
        let orchestrator = Orchestrator::new(config(), source).unwrap();

        let result = orchestrator.run(&options(Scope::Full)).unwrap();

        assert_eq!(result.blocks.len(), 1);
        assert_eq!(result.components.len(), 1);
        let integration = result.integration.as_ref().unwrap();
        assert_eq!(integration.len(), 1);
        assert_eq!(integration[0].block_slug, "hero");
        assert!(result.patterns.is_none());
        assert!(result.tests.is_none());
        assert_eq!(orchestrator.current_stage(), AnalysisStage::Done);
        assert_eq!(
            statuses(&result),
            vec![
                (AnalysisStage::Loading, true),
                (AnalysisStage::AnalyzingBlocks, true),
                (AnalysisStage::AnalyzingComponents, true),
                (AnalysisStage::ValidatingIntegration, true),
                (AnalysisStage::ComparingPatterns, false),
                (AnalysisStage::GeneratingTests, false),
                (AnalysisStage::GeneratingReport, true),
            ]
        );
    }

    #[test]
    fn test_blocks_scope_skips_the_rest() {
        let source = InMemorySource::default()
            .with_blocks(vec![hero()])
            .with_components(vec![hero_component()]);
        let orchestrator = Orchestrator::new(config(), source).unwrap();

        let result = orchestrator
            .run(&options(Scope::Blocks).with_tests(true))
            .unwrap();

        assert_eq!(result.blocks.len(), 1);
        assert!(result.components.is_empty());
        assert!(result.integration.is_none());
        assert!(result.tests.is_none());
        let skipped: Vec<_> = result.report.skipped_stages().map(|r| r.stage).collect();
        assert!(skipped.contains(&AnalysisStage::AnalyzingComponents));
        assert!(skipped.contains(&AnalysisStage::GeneratingTests));
    }

    #[test]
    fn test_unmatched_pairs_leave_integration_absent() {
        let source = InMemorySource::default()
            .with_blocks(vec![hero()])
            .with_components(vec![ComponentFacts::new("Footer", "components/Footer.tsx")]);
        let orchestrator = Orchestrator::new(config(), source).unwrap();

        let result = orchestrator.run(&options(Scope::Full)).unwrap();
        assert!(result.integration.is_none());
        let record = result
            .stages
            .iter()
            .find(|r| r.stage == AnalysisStage::ValidatingIntegration)
            .unwrap();
        assert_eq!(
            record.status,
            StageStatus::Skipped {
                reason: "no block matched a component".into()
            }
        );
    }

    #[test]
    fn test_patterns_share_the_integration_call() {
        let source = InMemorySource::default()
            .with_blocks(vec![hero()])
            .with_components(vec![hero_component()]);
        let orchestrator = Orchestrator::new(config(), source).unwrap();

        let result = orchestrator
            .run(&options(Scope::Full).with_pattern_comparison(true).with_tests(true))
            .unwrap();

        assert_eq!(result.patterns.as_ref().unwrap().len(), 1);
        assert_eq!(result.patterns.as_ref().unwrap()[0].reference, "hero");
        let tests = result.tests.as_ref().unwrap();
        assert_eq!(tests.suites, 2);
        assert!(result.stages.iter().all(StageRecord::was_executed));
    }

    #[test]
    fn test_duplicate_ids_are_dropped() {
        let source = InMemorySource::default().with_blocks(vec![hero(), hero()]);
        let orchestrator = Orchestrator::new(config(), source).unwrap();

        let result = orchestrator.run(&options(Scope::Blocks)).unwrap();
        assert_eq!(result.blocks.len(), 1);
    }

    #[test]
    fn test_min_severity_keeps_analysis_errors() {
        let broken = BlockSchema::new("broken", vec![FieldSchema::new("", "text")]);
        let source = InMemorySource::default().with_blocks(vec![hero(), broken]);
        let orchestrator = Orchestrator::new(config(), source).unwrap();

        let result = orchestrator
            .run(&options(Scope::Blocks).with_min_severity(Severity::Critical))
            .unwrap();

        assert!(result.block("hero").unwrap().issues.is_empty());
        let broken = result.block("broken").unwrap();
        assert_eq!(broken.issues.len(), 1);
        assert!(broken.has_analysis_error());
    }

    #[test]
    fn test_invalid_scoring_is_rejected() {
        let mut config = config();
        config.scoring.softness = 0.0;
        assert!(matches!(
            Orchestrator::new(config, InMemorySource::default()),
            Err(Error::Config(_))
        ));
    }
}
