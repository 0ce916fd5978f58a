//! Reduces an analysis draft to a scored report.

pub mod guide;

pub use guide::{ImplementationGuide, ImprovementItem, MigrationPhase, MigrationPlan};

use crate::config::ScoringConfig;
use crate::core::{AnalysisResultDraft, ArtifactKind, Issue, IssueCategory, Severity};
use crate::orchestrator::stage::StageRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportSummary {
    pub total_issues: usize,
    pub by_severity: SeverityCounts,
    /// In (0, 100]; 100 means no issues.
    pub score: f64,
    pub artifacts_analyzed: usize,
    pub failed_artifacts: usize,
    pub integration_pairs: usize,
    pub invalid_integrations: usize,
    pub breaking_changes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactScore {
    pub artifact: String,
    pub kind: ArtifactKind,
    pub score: f64,
    pub issues: usize,
}

/// An issue together with the artifact (or block+component pair) it
/// belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedIssue {
    pub artifact: String,
    pub issue: Issue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Report {
    pub summary: ReportSummary,
    pub artifact_scores: Vec<ArtifactScore>,
    pub top_issues: Vec<RankedIssue>,
    pub guide: ImplementationGuide,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<MigrationPlan>,
    pub stages: Vec<StageRecord>,
}

impl Report {
    pub fn has_critical(&self) -> bool {
        self.summary.by_severity.critical > 0
    }

    /// Stages that were skipped, with their reasons.
    pub fn skipped_stages(&self) -> impl Iterator<Item = &StageRecord> {
        self.stages.iter().filter(|s| !s.was_executed())
    }
}

/// `100 * k / (k + w)` over the summed severity weights `w`.
pub fn score_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>, scoring: &ScoringConfig) -> f64 {
    let weighted: f64 = issues.into_iter().map(|i| scoring.weight(i.severity)).sum();
    100.0 * scoring.softness / (scoring.softness + weighted)
}

/// Severity descending, then category, then artifact id.
pub fn rank_issues(mut issues: Vec<RankedIssue>) -> Vec<RankedIssue> {
    issues.sort_by(|a, b| {
        b.issue
            .severity
            .cmp(&a.issue.severity)
            .then_with(|| a.issue.category.cmp(&b.issue.category))
            .then_with(|| a.artifact.cmp(&b.artifact))
    });
    issues
}

pub struct ReportGenerator<'a> {
    scoring: &'a ScoringConfig,
}

impl<'a> ReportGenerator<'a> {
    pub fn new(scoring: &'a ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn generate(&self, draft: &AnalysisResultDraft) -> Report {
        let mut all: Vec<RankedIssue> = Vec::new();
        for result in draft.artifacts() {
            all.extend(result.issues.iter().map(|issue| RankedIssue {
                artifact: result.artifact.clone(),
                issue: issue.clone(),
            }));
        }
        for result in draft.integration_results() {
            let owner = format!("{}+{}", result.block_slug, result.component_name);
            all.extend(result.issues.iter().map(|issue| RankedIssue {
                artifact: owner.clone(),
                issue: issue.clone(),
            }));
        }

        let mut by_severity = SeverityCounts::default();
        for entry in &all {
            by_severity.add(entry.issue.severity);
        }

        let artifact_scores = draft
            .artifacts()
            .map(|result| ArtifactScore {
                artifact: result.artifact.clone(),
                kind: result.kind,
                score: score_issues(&result.issues, self.scoring),
                issues: result.issues.len(),
            })
            .collect();

        let patterns = draft.pattern_results();
        let integration = draft.integration_results();

        let summary = ReportSummary {
            total_issues: all.len(),
            by_severity,
            score: score_issues(all.iter().map(|e| &e.issue), self.scoring),
            artifacts_analyzed: draft.artifacts().count(),
            failed_artifacts: draft.artifacts().filter(|r| r.has_analysis_error()).count(),
            integration_pairs: integration.len(),
            invalid_integrations: integration.iter().filter(|r| !r.valid).count(),
            breaking_changes: patterns
                .iter()
                .flat_map(|p| &p.differences)
                .filter(|d| d.breaking)
                .count(),
        };

        let ranked = rank_issues(all);
        let implementation_guide = guide::build_guide(&ranked);
        let top_issues = ranked.into_iter().take(self.scoring.top_issues).collect();

        Report {
            summary,
            artifact_scores,
            top_issues,
            guide: implementation_guide,
            migration: guide::build_migration_plan(patterns),
            stages: draft.stages.clone(),
        }
    }
}

/// Number of issues in `category`.
pub fn category_count(report: &Report, category: IssueCategory) -> usize {
    report
        .guide
        .items
        .iter()
        .find(|i| i.category == category)
        .map(|i| i.issue_count)
        .unwrap_or(0)
}
