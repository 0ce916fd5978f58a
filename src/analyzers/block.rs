//! Structural checks on block schemas.

use super::Analyzer;
use crate::core::{
    ArtifactAnalysisResult, ArtifactKind, ArtifactMetrics, BlockSchema, CapabilityFlags,
    EffortTier, FieldSchema, Issue, IssueCategory, Severity, SourceLocation, Suggestion,
};
use crate::errors::AnalyzerError;
use std::collections::HashSet;

/// Layout containers hold no data and need no name.
const LAYOUT_TYPES: &[&str] = &["row", "collapsible", "tabs"];

#[derive(Debug, Clone)]
pub struct BlockAnalyzer {
    max_fields: usize,
    max_nesting_depth: usize,
}

impl Default for BlockAnalyzer {
    fn default() -> Self {
        Self::new(25, 4)
    }
}

impl BlockAnalyzer {
    pub fn new(max_fields: usize, max_nesting_depth: usize) -> Self {
        Self {
            max_fields,
            max_nesting_depth,
        }
    }

    fn validate_names(&self, block: &BlockSchema) -> Result<(), AnalyzerError> {
        if block.slug.trim().is_empty() {
            return Err(AnalyzerError::malformed("<unnamed>", "block has no slug"));
        }
        for field in block.all_fields() {
            if field.name.trim().is_empty() && !is_layout(field) {
                return Err(AnalyzerError::malformed(
                    &block.slug,
                    format!("a '{}' field has no name", field.field_type),
                ));
            }
        }
        Ok(())
    }

    fn location(block: &BlockSchema, field: Option<&FieldSchema>) -> SourceLocation {
        let line = field.and_then(|f| f.line).unwrap_or(0);
        SourceLocation::new(&block.path, line, 0)
    }

    fn check_duplicates(block: &BlockSchema, fields: &[FieldSchema], out: &mut Vec<Issue>) {
        let mut seen = HashSet::new();
        for field in data_children(fields) {
            if !seen.insert(field.name.as_str()) {
                out.push(
                    Issue::new(
                        "duplicate-field",
                        Severity::High,
                        IssueCategory::Structure,
                        format!("Duplicate field '{}'", field.name),
                    )
                    .describe(format!(
                        "Field name '{}' is used more than once at the same level; only one value is stored",
                        field.name
                    ))
                    .at(Self::location(block, Some(field)))
                    .remediate("Rename one of the fields so every sibling has a unique name"),
                );
            }
            Self::check_duplicates(block, &field.fields, out);
        }
    }

    fn metrics(block: &BlockSchema) -> ArtifactMetrics {
        let fields = block.all_fields();
        let field_count = block.field_count();
        let nesting_depth = block.nesting_depth();
        let line_count = fields.iter().filter_map(|f| f.line).max().unwrap_or(0);
        let required = fields.iter().filter(|f| f.required).count();

        ArtifactMetrics {
            field_count,
            line_count,
            nesting_depth,
            complexity: field_count as f64 + 2.0 * nesting_depth as f64 + 0.5 * required as f64,
            flags: CapabilityFlags {
                has_access_control: block.has_access_control(),
                has_validation: fields.iter().any(|f| f.validate),
                has_localization: fields.iter().any(|f| f.localized),
                ..CapabilityFlags::default()
            },
        }
    }

    fn suggestions(&self, block: &BlockSchema, metrics: &ArtifactMetrics) -> Vec<Suggestion> {
        let mut suggestions = Vec::new();
        let has_text = block
            .all_fields()
            .iter()
            .any(|f| matches!(f.field_type.as_str(), "text" | "textarea" | "richText"));

        if has_text && !metrics.flags.has_localization {
            suggestions.push(Suggestion::new(
                "localization",
                "Localize text fields",
                "Mark user-facing text fields as localized",
                "Content can be translated without schema changes later",
                EffortTier::Low,
            ));
        }

        let uses_tabs = block.all_fields().iter().any(|f| f.field_type == "tabs");
        if metrics.field_count > self.max_fields / 2 && !uses_tabs {
            suggestions.push(Suggestion::new(
                "organize-with-tabs",
                "Group fields into tabs",
                "Split the editing form into tabs by concern (content, media, settings)",
                "Editors find fields faster in large blocks",
                EffortTier::Medium,
            ));
        }
        suggestions
    }
}

fn is_layout(field: &FieldSchema) -> bool {
    LAYOUT_TYPES.contains(&field.field_type.as_str())
}

/// Data fields at one level, with layout containers flattened.
fn data_children(fields: &[FieldSchema]) -> Vec<&FieldSchema> {
    let mut out = Vec::new();
    for field in fields {
        if is_layout(field) {
            out.extend(data_children(&field.fields));
        } else {
            out.push(field);
        }
    }
    out
}

impl Analyzer for BlockAnalyzer {
    type Input = BlockSchema;
    type Output = ArtifactAnalysisResult;

    fn name(&self) -> &'static str {
        "block"
    }

    fn analyze(&self, block: &BlockSchema) -> Result<ArtifactAnalysisResult, AnalyzerError> {
        self.validate_names(block)?;

        let mut result = ArtifactAnalysisResult::new(&block.slug, ArtifactKind::Block, &block.path);
        result.metrics = Self::metrics(block);
        let mut issues = Vec::new();

        if block.fields.is_empty() {
            issues.push(
                Issue::new(
                    "empty-schema",
                    Severity::Medium,
                    IssueCategory::Structure,
                    "Block has no fields",
                )
                .describe("A block without fields cannot hold content")
                .at(Self::location(block, None))
                .remediate("Add the fields the block renders, or remove the block"),
            );
        }

        Self::check_duplicates(block, &block.fields, &mut issues);

        if result.metrics.field_count > self.max_fields {
            issues.push(
                Issue::new(
                    "excessive-fields",
                    Severity::Medium,
                    IssueCategory::Maintainability,
                    format!("Block defines {} fields", result.metrics.field_count),
                )
                .describe(format!(
                    "More than {} fields makes the block hard to edit and to render",
                    self.max_fields
                ))
                .at(Self::location(block, None))
                .remediate("Split the block into smaller blocks or move optional settings into a group"),
            );
        }

        if result.metrics.nesting_depth > self.max_nesting_depth {
            issues.push(
                Issue::new(
                    "deep-nesting",
                    Severity::Medium,
                    IssueCategory::Maintainability,
                    format!("Fields nest {} levels deep", result.metrics.nesting_depth),
                )
                .describe(format!(
                    "Nesting beyond {} levels complicates both the admin form and the data shape",
                    self.max_nesting_depth
                ))
                .at(Self::location(block, None))
                .remediate("Flatten nested groups or extract a reusable field set"),
            );
        }

        if block.labels.is_none() {
            issues.push(
                Issue::new(
                    "missing-labels",
                    Severity::Low,
                    IssueCategory::Maintainability,
                    "Block has no labels",
                )
                .describe("Editors see the raw slug in the block picker")
                .at(Self::location(block, None))
                .remediate("Add singular and plural labels")
                .example(
                    format!("{{ slug: '{}', fields }}", block.slug),
                    format!(
                        "{{ slug: '{}', labels: {{ singular: '...', plural: '...' }}, fields }}",
                        block.slug
                    ),
                ),
            );
        }

        for field in block.all_fields() {
            if field.required && !field.validate {
                issues.push(
                    Issue::new(
                        "missing-validation",
                        Severity::Low,
                        IssueCategory::Structure,
                        format!("Required field '{}' has no validation", field.name),
                    )
                    .describe("Required alone only rejects empty values")
                    .at(Self::location(block, Some(field)))
                    .remediate("Add a validate function that checks the value's format"),
                );
            }
        }

        if block.interface_name.is_none() {
            issues.push(
                Issue::new(
                    "missing-interface-name",
                    Severity::Low,
                    IssueCategory::Integration,
                    "Block has no interface name",
                )
                .describe("Generated types get an unstable name, so components cannot import them reliably")
                .at(Self::location(block, None))
                .remediate("Set interfaceName to the PascalCase block name"),
            );
        }

        result.extend_issues(issues);
        result.suggestions = self.suggestions(block, &result.metrics);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BlockLabels;

    fn types(result: &ArtifactAnalysisResult) -> Vec<&str> {
        result.issues.iter().map(|i| i.issue_type.as_str()).collect()
    }

    fn tidy(slug: &str, fields: Vec<FieldSchema>) -> BlockSchema {
        let mut block = BlockSchema::new(slug, fields);
        block.interface_name = Some("HeroBlock".into());
        block.labels = Some(BlockLabels {
            singular: "Hero".into(),
            plural: "Heroes".into(),
        });
        block
    }

    #[test]
    fn test_clean_block_has_no_issues() {
        let block = tidy("hero", vec![FieldSchema::new("title", "text")]);
        let result = BlockAnalyzer::default().analyze(&block).unwrap();
        assert!(result.issues.is_empty(), "{:?}", types(&result));
        assert_eq!(result.metrics.field_count, 1);
    }

    #[test]
    fn test_empty_schema() {
        let result = BlockAnalyzer::default().analyze(&tidy("empty", vec![])).unwrap();
        assert_eq!(types(&result), vec!["empty-schema"]);
    }

    #[test]
    fn test_duplicates_found_through_layout_containers() {
        let block = tidy(
            "hero",
            vec![
                FieldSchema::new("title", "text"),
                FieldSchema::new("", "row").with_fields(vec![FieldSchema::new("title", "text")]),
            ],
        );
        let result = BlockAnalyzer::default().analyze(&block).unwrap();
        assert_eq!(types(&result), vec!["duplicate-field"]);
    }

    #[test]
    fn test_same_name_in_different_groups_is_fine() {
        let block = tidy(
            "cards",
            vec![
                FieldSchema::new("left", "group").with_fields(vec![FieldSchema::new("title", "text")]),
                FieldSchema::new("right", "group").with_fields(vec![FieldSchema::new("title", "text")]),
            ],
        );
        let result = BlockAnalyzer::default().analyze(&block).unwrap();
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_unnamed_data_field_is_malformed() {
        let block = tidy("hero", vec![FieldSchema::new("  ", "text")]);
        let err = BlockAnalyzer::default().analyze(&block).unwrap_err();
        assert!(matches!(err, AnalyzerError::MalformedArtifact { .. }));
    }

    #[test]
    fn test_thresholds() {
        let fields = (0..4).map(|i| FieldSchema::new(format!("f{i}"), "text")).collect();
        let nested = FieldSchema::new("a", "group").with_fields(vec![FieldSchema::new("b", "group")
            .with_fields(vec![FieldSchema::new("c", "text")])]);
        let mut block = tidy("big", fields);
        block.fields.push(nested);

        let result = BlockAnalyzer::new(3, 2).analyze(&block).unwrap();
        let found = types(&result);
        assert!(found.contains(&"excessive-fields"));
        assert!(found.contains(&"deep-nesting"));
        assert_eq!(result.metrics.nesting_depth, 3);
    }

    #[test]
    fn test_required_without_validation_and_missing_metadata() {
        let block = BlockSchema::new("cta", vec![FieldSchema::new("link", "text").required()]);
        let result = BlockAnalyzer::default().analyze(&block).unwrap();
        assert_eq!(
            types(&result),
            vec!["missing-labels", "missing-validation", "missing-interface-name"]
        );
        assert_eq!(result.issues[1].id, "cta/missing-validation/1");
    }

    #[test]
    fn test_localization_suggestion() {
        let block = tidy("hero", vec![FieldSchema::new("title", "text")]);
        let result = BlockAnalyzer::default().analyze(&block).unwrap();
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.suggestion_type == "localization"));
    }
}
