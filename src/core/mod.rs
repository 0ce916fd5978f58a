//! Core data model shared by the analyzers, the orchestrator and the report.
//!
//! Everything here is plain data: serializable, free of handles, and
//! immutable once an analyzer has produced it.

pub mod artifact;
pub mod options;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use artifact::{
    AccessControl, Artifact, ArtifactSet, BlockLabels, BlockSchema, ComponentFacts,
    ComponentKind, FieldSchema, HookUsage, ImportFact, JsxAttribute, JsxElementFact, PropFact,
};
pub use options::{AnalysisOptions, Scope};

use crate::orchestrator::stage::StageRecord;
use crate::report::Report;

/// Severity of a finding. Ordered so that `Critical` is the greatest.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// Numeric rank used for sorting, higher is more severe.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Remediation theme of an issue. Also the grouping key of the
/// implementation guide.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum IssueCategory {
    Security,
    Accessibility,
    Integration,
    Structure,
    Pattern,
    Performance,
    Maintainability,
    AnalysisError,
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        static DISPLAY_STRINGS: &[(IssueCategory, &str)] = &[
            (IssueCategory::Security, "security"),
            (IssueCategory::Accessibility, "accessibility"),
            (IssueCategory::Integration, "integration"),
            (IssueCategory::Structure, "structure"),
            (IssueCategory::Pattern, "pattern"),
            (IssueCategory::Performance, "performance"),
            (IssueCategory::Maintainability, "maintainability"),
            (IssueCategory::AnalysisError, "analysis-error"),
        ];

        let display_str = DISPLAY_STRINGS
            .iter()
            .find(|(c, _)| c == self)
            .map(|(_, s)| *s)
            .unwrap_or("unknown");

        write!(f, "{display_str}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CodeExample {
    pub before: String,
    pub after: String,
}

/// A single finding produced by an analyzer.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    /// Stable identifier, `<artifact>/<issue_type>/<ordinal>`.
    pub id: String,
    pub issue_type: String,
    pub severity: Severity,
    pub category: IssueCategory,
    pub title: String,
    pub description: String,
    pub location: SourceLocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<CodeExample>,
}

impl Issue {
    /// Start a new issue. The id is assigned when the issue is attached to
    /// its owning result.
    pub fn new(
        issue_type: impl Into<String>,
        severity: Severity,
        category: IssueCategory,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            issue_type: issue_type.into(),
            severity,
            category,
            title: title.into(),
            description: String::new(),
            location: SourceLocation::default(),
            remediation: None,
            example: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn remediate(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn example(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.example = Some(CodeExample {
            before: before.into(),
            after: after.into(),
        });
        self
    }

    /// The synthetic issue recorded when analysis of an artifact fails.
    pub fn analysis_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        let message = message.into();
        Issue::new(
            "analysis-failed",
            Severity::High,
            IssueCategory::AnalysisError,
            "Analysis failed",
        )
        .describe(message)
        .at(SourceLocation::new(path, 0, 0))
        .remediate("Fix the artifact so it can be analyzed, then re-run the analysis")
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EffortTier {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for EffortTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffortTier::Low => write!(f, "low"),
            EffortTier::Medium => write!(f, "medium"),
            EffortTier::High => write!(f, "high"),
        }
    }
}

/// An improvement recommendation that is not a defect.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Suggestion {
    pub suggestion_type: String,
    pub title: String,
    pub description: String,
    pub benefit: String,
    pub effort: EffortTier,
}

impl Suggestion {
    pub fn new(
        suggestion_type: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        benefit: impl Into<String>,
        effort: EffortTier,
    ) -> Self {
        Self {
            suggestion_type: suggestion_type.into(),
            title: title.into(),
            description: description.into(),
            benefit: benefit.into(),
            effort,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Block,
    Component,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Block => write!(f, "block"),
            ArtifactKind::Component => write!(f, "component"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CapabilityFlags {
    pub has_access_control: bool,
    pub has_validation: bool,
    pub has_localization: bool,
    pub is_client_component: bool,
    pub uses_hooks: bool,
    pub has_typed_props: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ArtifactMetrics {
    pub field_count: usize,
    pub line_count: usize,
    pub nesting_depth: usize,
    pub complexity: f64,
    pub flags: CapabilityFlags,
}

/// Result of analyzing one block or one component.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ArtifactAnalysisResult {
    /// Block slug or component name.
    pub artifact: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub metrics: ArtifactMetrics,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<Suggestion>,
}

impl ArtifactAnalysisResult {
    pub fn new(artifact: impl Into<String>, kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            kind,
            path: path.into(),
            metrics: ArtifactMetrics::default(),
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Result for an artifact whose analysis could not complete.
    pub fn failed(
        artifact: impl Into<String>,
        kind: ArtifactKind,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let mut result = Self::new(artifact, kind, path.clone());
        result.push_issue(Issue::analysis_failed(path, message));
        result
    }

    /// Attach an issue, assigning its stable id.
    pub fn push_issue(&mut self, mut issue: Issue) {
        issue.id = issue_id(&self.artifact, &issue.issue_type, self.issues.len());
        self.issues.push(issue);
    }

    pub fn extend_issues(&mut self, issues: impl IntoIterator<Item = Issue>) {
        for issue in issues {
            self.push_issue(issue);
        }
    }

    pub fn has_analysis_error(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.category == IssueCategory::AnalysisError)
    }
}

pub(crate) fn issue_id(artifact: &str, issue_type: &str, ordinal: usize) -> String {
    format!("{artifact}/{issue_type}/{ordinal}")
}

/// Cross-check of a block schema against the component that renders it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntegrationResult {
    pub block_slug: String,
    pub component_name: String,
    pub component_path: PathBuf,
    pub valid: bool,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<Suggestion>,
}

impl IntegrationResult {
    pub fn new(
        block_slug: impl Into<String>,
        component_name: impl Into<String>,
        component_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            block_slug: block_slug.into(),
            component_name: component_name.into(),
            component_path: component_path.into(),
            valid: true,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// An invalid result carrying a single `analysis-failed` issue.
    pub fn failed(
        block_slug: impl Into<String>,
        component_name: impl Into<String>,
        component_path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        let mut result = Self::new(block_slug, component_name, component_path);
        result.valid = false;
        let issue = Issue::analysis_failed(result.component_path.clone(), message);
        result.push_issue(issue);
        result
    }

    pub fn push_issue(&mut self, mut issue: Issue) {
        let owner = format!("{}+{}", self.block_slug, self.component_name);
        issue.id = issue_id(&owner, &issue.issue_type, self.issues.len());
        self.issues.push(issue);
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceKind {
    Structural,
    Feature,
    Organization,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternDifference {
    pub kind: DifferenceKind,
    pub description: String,
    pub current_approach: String,
    pub reference_approach: String,
    /// Adopting the reference approach changes stored data shape.
    pub breaking: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternComparisonResult {
    pub block_slug: String,
    pub reference: String,
    pub differences: Vec<PatternDifference>,
}

impl PatternComparisonResult {
    pub fn has_breaking_changes(&self) -> bool {
        self.differences.iter().any(|d| d.breaking)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratedTestSuite {
    pub artifact: String,
    pub kind: ArtifactKind,
    pub file_name: String,
    pub cases: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TestGenerationSummary {
    pub suites: usize,
    pub test_cases: usize,
    pub per_artifact: Vec<GeneratedTestSuite>,
}

impl TestGenerationSummary {
    pub fn from_suites(per_artifact: Vec<GeneratedTestSuite>) -> Self {
        Self {
            suites: per_artifact.len(),
            test_cases: per_artifact.iter().map(|s| s.cases.len()).sum(),
            per_artifact,
        }
    }
}

/// The aggregate returned by the orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub timestamp: DateTime<Utc>,
    pub scope: Scope,
    pub blocks: Vec<ArtifactAnalysisResult>,
    pub components: Vec<ArtifactAnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integration: Option<Vec<IntegrationResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns: Option<Vec<PatternComparisonResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestGenerationSummary>,
    pub stages: Vec<StageRecord>,
    pub report: Report,
}

/// The aggregate while the pipeline is still filling it in. Consumed by
/// [`AnalysisResultDraft::finish`] once the report exists.
#[derive(Clone, Debug)]
pub struct AnalysisResultDraft {
    pub timestamp: DateTime<Utc>,
    pub scope: Scope,
    pub blocks: Vec<ArtifactAnalysisResult>,
    pub components: Vec<ArtifactAnalysisResult>,
    pub integration: Option<Vec<IntegrationResult>>,
    pub patterns: Option<Vec<PatternComparisonResult>>,
    pub tests: Option<TestGenerationSummary>,
    pub stages: Vec<StageRecord>,
}

impl AnalysisResultDraft {
    pub fn new(scope: Scope) -> Self {
        Self {
            timestamp: Utc::now(),
            scope,
            blocks: Vec::new(),
            components: Vec::new(),
            integration: None,
            patterns: None,
            tests: None,
            stages: Vec::new(),
        }
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactAnalysisResult> {
        self.blocks.iter().chain(self.components.iter())
    }

    pub fn integration_results(&self) -> &[IntegrationResult] {
        self.integration.as_deref().unwrap_or_default()
    }

    pub fn pattern_results(&self) -> &[PatternComparisonResult] {
        self.patterns.as_deref().unwrap_or_default()
    }

    pub fn finish(self, report: Report) -> AnalysisResult {
        AnalysisResult {
            timestamp: self.timestamp,
            scope: self.scope,
            blocks: self.blocks,
            components: self.components,
            integration: self.integration,
            patterns: self.patterns,
            tests: self.tests,
            stages: self.stages,
            report,
        }
    }
}

impl AnalysisResult {
    /// All artifact results, blocks first.
    pub fn artifacts(&self) -> impl Iterator<Item = &ArtifactAnalysisResult> {
        self.blocks.iter().chain(self.components.iter())
    }

    pub fn block(&self, slug: &str) -> Option<&ArtifactAnalysisResult> {
        self.blocks.iter().find(|b| b.artifact == slug)
    }

    pub fn component(&self, name: &str) -> Option<&ArtifactAnalysisResult> {
        self.components.iter().find(|c| c.artifact == name)
    }
}
