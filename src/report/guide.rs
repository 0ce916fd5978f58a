//! Implementation guide and migration plan.
//!
//! Issues are grouped by remediation theme (their category) into
//! improvement items. Each item carries an effort estimate derived from the
//! severities it covers and an ordered list of steps: the theme's standard
//! steps first, then the distinct remediation texts of its issues in ranked
//! order.

use super::RankedIssue;
use crate::core::{EffortTier, IssueCategory, PatternComparisonResult, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remediation texts taken from issues, per item.
const MAX_ISSUE_STEPS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImprovementItem {
    pub category: IssueCategory,
    pub title: String,
    pub issue_count: usize,
    pub highest_severity: Severity,
    pub effort: EffortTier,
    pub estimated_hours: f64,
    pub steps: Vec<String>,
    /// Artifact ids touched by this item, sorted.
    pub affected: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImplementationGuide {
    pub items: Vec<ImprovementItem>,
    pub total_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationPhase {
    pub name: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationPlan {
    pub breaking_changes: usize,
    /// Blocks with at least one breaking difference, in comparison order.
    pub blocks: Vec<String>,
    pub phases: Vec<MigrationPhase>,
}

pub fn hours_for(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 4.0,
        Severity::High => 2.0,
        Severity::Medium => 1.0,
        Severity::Low => 0.5,
    }
}

pub fn effort_for_hours(hours: f64) -> EffortTier {
    if hours < 2.0 {
        EffortTier::Low
    } else if hours < 8.0 {
        EffortTier::Medium
    } else {
        EffortTier::High
    }
}

fn theme(category: IssueCategory) -> (&'static str, &'static [&'static str]) {
    match category {
        IssueCategory::Security => (
            "Harden security",
            &[
                "Review every finding with the owner of the affected artifact",
                "Fix critical findings before the next release",
            ],
        ),
        IssueCategory::Accessibility => (
            "Improve accessibility",
            &["Audit interactive elements with a screen reader"],
        ),
        IssueCategory::Integration => (
            "Align blocks with their components",
            &["Regenerate block types after changing the schema"],
        ),
        IssueCategory::Structure => (
            "Restructure block schemas",
            &["Plan schema changes together with a content migration"],
        ),
        IssueCategory::Pattern => (
            "Adopt reference patterns",
            &["Compare the block with its reference before editing"],
        ),
        IssueCategory::Performance => (
            "Reduce rendering cost",
            &["Measure before and after each change"],
        ),
        IssueCategory::Maintainability => (
            "Improve maintainability",
            &["Address items opportunistically while touching the code"],
        ),
        IssueCategory::AnalysisError => (
            "Fix artifacts that could not be analyzed",
            &["Re-run the analysis with RUST_LOG=debug to see the failure"],
        ),
    }
}

/// Build the guide from issues already in ranked order.
pub fn build_guide(ranked: &[RankedIssue]) -> ImplementationGuide {
    let mut groups: BTreeMap<IssueCategory, Vec<&RankedIssue>> = BTreeMap::new();
    for entry in ranked {
        groups.entry(entry.issue.category).or_default().push(entry);
    }

    let mut items: Vec<ImprovementItem> = groups
        .into_iter()
        .map(|(category, entries)| {
            let (title, base_steps) = theme(category);
            let estimated_hours: f64 = entries.iter().map(|e| hours_for(e.issue.severity)).sum();
            let highest_severity = entries
                .iter()
                .map(|e| e.issue.severity)
                .max()
                .unwrap_or_default();

            let mut steps: Vec<String> = base_steps.iter().map(|s| s.to_string()).collect();
            let mut taken = 0;
            for remediation in entries.iter().filter_map(|e| e.issue.remediation.as_ref()) {
                if taken == MAX_ISSUE_STEPS {
                    break;
                }
                if !steps.contains(remediation) {
                    steps.push(remediation.clone());
                    taken += 1;
                }
            }

            let mut affected: Vec<String> = entries.iter().map(|e| e.artifact.clone()).collect();
            affected.sort();
            affected.dedup();

            ImprovementItem {
                category,
                title: title.to_string(),
                issue_count: entries.len(),
                highest_severity,
                effort: effort_for_hours(estimated_hours),
                estimated_hours,
                steps,
                affected,
            }
        })
        .collect();

    items.sort_by(|a, b| {
        b.highest_severity
            .cmp(&a.highest_severity)
            .then_with(|| a.category.cmp(&b.category))
    });

    ImplementationGuide {
        total_hours: items.iter().map(|i| i.estimated_hours).sum(),
        items,
    }
}

/// A three-phase plan, present only when some pattern difference would
/// change the stored data shape.
pub fn build_migration_plan(patterns: &[PatternComparisonResult]) -> Option<MigrationPlan> {
    let breaking: Vec<&PatternComparisonResult> =
        patterns.iter().filter(|p| p.has_breaking_changes()).collect();
    if breaking.is_empty() {
        return None;
    }

    let blocks: Vec<String> = breaking.iter().map(|p| p.block_slug.clone()).collect();

    let prepare = MigrationPhase {
        name: "Prepare".to_string(),
        steps: std::iter::once("Back up the content database".to_string())
            .chain(
                blocks
                    .iter()
                    .map(|slug| format!("Write a data migration for '{slug}'")),
            )
            .collect(),
    };

    let migrate = MigrationPhase {
        name: "Migrate".to_string(),
        steps: breaking
            .iter()
            .flat_map(|p| {
                p.differences.iter().filter(|d| d.breaking).map(move |d| {
                    format!(
                        "{}: {} ({} -> {})",
                        p.block_slug, d.description, d.current_approach, d.reference_approach
                    )
                })
            })
            .collect(),
    };

    let cleanup = MigrationPhase {
        name: "Cleanup".to_string(),
        steps: vec![
            "Run the generated test suites against migrated content".to_string(),
            "Remove fields left unused by the migration".to_string(),
            "Regenerate block types".to_string(),
        ],
    };

    Some(MigrationPlan {
        breaking_changes: migrate.steps.len(),
        blocks,
        phases: vec![prepare, migrate, cleanup],
    })
}
