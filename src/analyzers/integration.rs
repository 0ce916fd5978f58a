//! Block schema / component prop cross-checks.

use super::Analyzer;
use crate::core::{
    BlockSchema, ComponentFacts, EffortTier, IntegrationResult, Issue, IssueCategory, Severity,
    SourceLocation, Suggestion,
};
use crate::errors::AnalyzerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Props every block component may receive without a matching field.
const FRAMEWORK_PROPS: &[&str] = &[
    "id",
    "key",
    "className",
    "children",
    "style",
    "blockType",
    "blockName",
    "disableInnerContainer",
];

/// A block and the component that renders it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntegrationPair {
    pub block: BlockSchema,
    pub component: ComponentFacts,
}

/// Pair each block with the components that render it, as
/// `(block index, component index)`, in block order.
///
/// A component declaring `block_slug` matches that block only. Otherwise
/// names are compared after lowercasing, dropping non-alphanumerics and a
/// trailing `block`, so `CallToActionBlock` matches `call-to-action`.
pub fn match_pairs(blocks: &[BlockSchema], components: &[ComponentFacts]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (b, block) in blocks.iter().enumerate() {
        let slug = normalize(&block.slug);
        for (c, component) in components.iter().enumerate() {
            let matches = match component.block_slug.as_deref() {
                Some(declared) => declared == block.slug,
                None => normalize(&component.name) == slug,
            };
            if matches {
                pairs.push((b, c));
            }
        }
    }
    pairs
}

fn normalize(name: &str) -> String {
    let flat: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match flat.strip_suffix("block") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => flat,
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntegrationAnalyzer;

impl IntegrationAnalyzer {
    fn has_type_guard(block: &BlockSchema, component: &ComponentFacts) -> bool {
        let checks_block_type = component
            .source
            .as_deref()
            .is_some_and(|s| s.contains("blockType"));
        let uses_interface = block.interface_name.as_deref().is_some_and(|iface| {
            component
                .imports
                .iter()
                .any(|i| i.specifiers.iter().any(|s| s == iface))
                || component
                    .props
                    .iter()
                    .any(|p| p.type_name.as_deref() == Some(iface))
        });
        checks_block_type || uses_interface
    }
}

impl Analyzer for IntegrationAnalyzer {
    type Input = IntegrationPair;
    type Output = IntegrationResult;

    fn name(&self) -> &'static str {
        "integration"
    }

    fn analyze(&self, pair: &IntegrationPair) -> Result<IntegrationResult, AnalyzerError> {
        let IntegrationPair { block, component } = pair;
        let mut result = IntegrationResult::new(&block.slug, &component.name, &component.path);

        let fields: Vec<&str> = block.top_level_data_fields();
        let field_set: HashSet<&str> = fields.iter().copied().collect();
        let props: Vec<&str> = component
            .prop_names()
            .into_iter()
            .filter(|p| !FRAMEWORK_PROPS.contains(p))
            .collect();
        let prop_set: HashSet<&str> = props.iter().copied().collect();

        let unconsumed: Vec<&str> = fields.iter().copied().filter(|f| !prop_set.contains(f)).collect();
        for field in &unconsumed {
            result.push_issue(
                Issue::new(
                    "unconsumed-field",
                    Severity::Low,
                    IssueCategory::Integration,
                    format!("Field '{field}' is never rendered"),
                )
                .describe(format!(
                    "Block '{}' defines '{field}' but {} does not accept it",
                    block.slug, component.name
                ))
                .at(SourceLocation::new(&block.path, 0, 0))
                .remediate("Render the field, or remove it from the schema"),
            );
        }

        for prop in props.iter().filter(|p| !field_set.contains(*p)) {
            result.push_issue(
                Issue::new(
                    "unknown-prop",
                    Severity::Medium,
                    IssueCategory::Integration,
                    format!("Prop '{prop}' has no schema field"),
                )
                .describe(format!(
                    "{} reads '{prop}', which block '{}' never stores; it is always undefined",
                    component.name, block.slug
                ))
                .at(SourceLocation::new(&component.path, 1, 0))
                .remediate(format!("Add a '{prop}' field to the block, or drop the prop")),
            );
        }

        if !Self::has_type_guard(block, component) {
            let iface = block.interface_name.as_deref().unwrap_or("the generated block type");
            result.push_issue(
                Issue::new(
                    "missing-type-guard",
                    Severity::Low,
                    IssueCategory::Integration,
                    "Component props are not tied to the block type",
                )
                .describe("Schema changes will not surface as type errors in the component")
                .at(SourceLocation::new(&component.path, 1, 0))
                .remediate(format!("Type the props as {iface}")),
            );
        }

        result.valid = result.issues.iter().all(|i| i.severity < Severity::Medium);

        if !unconsumed.is_empty() {
            result.suggestions.push(Suggestion::new(
                "remove-unused-fields",
                "Remove unrendered fields",
                format!("Fields never rendered: {}", unconsumed.join(", ")),
                "Editors stop filling in content nobody sees",
                EffortTier::Low,
            ));
        }

        Ok(result)
    }
}
