//! Comparison of block schemas against reference implementations.
//!
//! A difference is `breaking` when adopting the reference approach changes
//! the shape of stored content and therefore needs a data migration.

use super::Analyzer;
use crate::core::{
    AccessControl, BlockLabels, BlockSchema, DifferenceKind, FieldSchema, PatternComparisonResult,
    PatternDifference,
};
use crate::errors::AnalyzerError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A block and the reference it is compared against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternPair {
    pub block: BlockSchema,
    pub reference: BlockSchema,
}

#[derive(Debug, Clone)]
pub struct PatternAnalyzer {
    catalog: Vec<BlockSchema>,
}

impl Default for PatternAnalyzer {
    fn default() -> Self {
        Self {
            catalog: builtin_references(),
        }
    }
}

impl PatternAnalyzer {
    /// The reference for `block`: a loaded reference with the same slug,
    /// then a built-in one, then the generic baseline.
    pub fn reference_for(&self, block: &BlockSchema, loaded: &[BlockSchema]) -> BlockSchema {
        loaded
            .iter()
            .chain(self.catalog.iter())
            .find(|r| r.slug == block.slug)
            .or_else(|| self.catalog.iter().find(|r| r.slug == BASELINE))
            .cloned()
            .unwrap_or_else(baseline)
    }

    pub fn catalog(&self) -> &[BlockSchema] {
        &self.catalog
    }
}

fn difference(
    kind: DifferenceKind,
    description: impl Into<String>,
    current: impl Into<String>,
    reference: impl Into<String>,
    breaking: bool,
) -> PatternDifference {
    PatternDifference {
        kind,
        description: description.into(),
        current_approach: current.into(),
        reference_approach: reference.into(),
        breaking,
    }
}

fn has_type(block: &BlockSchema, types: &[&str]) -> bool {
    block
        .all_fields()
        .iter()
        .any(|f| types.contains(&f.field_type.as_str()))
}

fn structural(block: &BlockSchema, reference: &BlockSchema, out: &mut Vec<PatternDifference>) {
    let (depth, ref_depth) = (block.nesting_depth(), reference.nesting_depth());
    if depth.abs_diff(ref_depth) >= 2 {
        out.push(difference(
            DifferenceKind::Structural,
            "Nesting depth differs from the reference",
            format!("{depth} levels"),
            format!("{ref_depth} levels"),
            true,
        ));
    }

    let (count, ref_count) = (block.field_count(), reference.field_count());
    if ref_count > 0 && count > ref_count * 2 {
        out.push(difference(
            DifferenceKind::Structural,
            "Field count is far above the reference",
            format!("{count} fields"),
            format!("{ref_count} fields"),
            false,
        ));
    }

    let containers: HashSet<&str> = block
        .all_fields()
        .into_iter()
        .filter(|f| matches!(f.field_type.as_str(), "group" | "array"))
        .map(|f| f.name.as_str())
        .collect();
    for field in reference
        .all_fields()
        .into_iter()
        .filter(|f| matches!(f.field_type.as_str(), "group" | "array"))
        .filter(|f| !containers.contains(f.name.as_str()))
    {
        out.push(difference(
            DifferenceKind::Structural,
            format!("Reference stores '{}' as a {}", field.name, field.field_type),
            format!("no '{}' {}", field.name, field.field_type),
            format!("'{}' {} with {} fields", field.name, field.field_type, field.fields.len()),
            true,
        ));
    }
}

fn features(block: &BlockSchema, reference: &BlockSchema, out: &mut Vec<PatternDifference>) {
    if reference.has_access_control() && !block.has_access_control() {
        out.push(difference(
            DifferenceKind::Feature,
            "Reference restricts access",
            "open access",
            "access functions on the block",
            false,
        ));
    }

    let localized = |b: &BlockSchema| b.all_fields().iter().any(|f| f.localized);
    if localized(reference) && !localized(block) {
        out.push(difference(
            DifferenceKind::Feature,
            "Reference localizes content",
            "single-locale fields",
            "localized fields",
            true,
        ));
    }

    let validated = |b: &BlockSchema| b.all_fields().iter().any(|f| f.validate);
    if validated(reference) && !validated(block) {
        out.push(difference(
            DifferenceKind::Feature,
            "Reference validates input",
            "no validate functions",
            "validate functions on required fields",
            false,
        ));
    }
}

fn organization(block: &BlockSchema, reference: &BlockSchema, out: &mut Vec<PatternDifference>) {
    const LAYOUT: &[&str] = &["tabs", "collapsible", "row"];
    if has_type(reference, LAYOUT) && !has_type(block, LAYOUT) && block.field_count() > 3 {
        out.push(difference(
            DifferenceKind::Organization,
            "Reference organizes the form with layout containers",
            "flat field list",
            "tabs or collapsible sections",
            false,
        ));
    }
    if has_type(reference, &["group"]) && !has_type(block, &["group"]) && block.fields.len() > 6 {
        out.push(difference(
            DifferenceKind::Organization,
            "Reference groups related settings",
            "settings at the top level",
            "settings in named groups",
            true,
        ));
    }
}

impl Analyzer for PatternAnalyzer {
    type Input = PatternPair;
    type Output = PatternComparisonResult;

    fn name(&self) -> &'static str {
        "pattern"
    }

    fn analyze(&self, pair: &PatternPair) -> Result<PatternComparisonResult, AnalyzerError> {
        let PatternPair { block, reference } = pair;
        if reference.fields.is_empty() {
            return Err(AnalyzerError::malformed(
                &reference.slug,
                "reference block defines no fields",
            ));
        }

        let mut differences = Vec::new();
        structural(block, reference, &mut differences);
        features(block, reference, &mut differences);
        organization(block, reference, &mut differences);

        Ok(PatternComparisonResult {
            block_slug: block.slug.clone(),
            reference: reference.slug.clone(),
            differences,
        })
    }
}

const BASELINE: &str = "standard";

fn text(name: &str) -> FieldSchema {
    let mut field = FieldSchema::new(name, "text");
    field.localized = true;
    field
}

fn validated(mut field: FieldSchema) -> FieldSchema {
    field.required = true;
    field.validate = true;
    field
}

fn reference(slug: &str, singular: &str, plural: &str, fields: Vec<FieldSchema>) -> BlockSchema {
    let mut block = BlockSchema::new(slug, fields);
    block.path = format!("references/{slug}.json").into();
    block.labels = Some(BlockLabels {
        singular: singular.into(),
        plural: plural.into(),
    });
    block.access = Some(AccessControl {
        read: false,
        create: true,
        update: true,
        delete: true,
    });
    block
}

fn baseline() -> BlockSchema {
    reference(
        BASELINE,
        "Block",
        "Blocks",
        vec![
            FieldSchema::new("", "tabs").with_fields(vec![
                validated(text("heading")),
                FieldSchema::new("settings", "group")
                    .with_fields(vec![FieldSchema::new("theme", "select")]),
            ]),
        ],
    )
}

/// The reference blocks shipped with the tool.
pub fn builtin_references() -> Vec<BlockSchema> {
    vec![
        baseline(),
        reference(
            "hero",
            "Hero",
            "Heroes",
            vec![
                validated(text("title")),
                text("subtitle"),
                FieldSchema::new("media", "upload"),
                FieldSchema::new("links", "array")
                    .with_fields(vec![text("label"), FieldSchema::new("url", "text")]),
            ],
        ),
        reference(
            "content",
            "Content",
            "Content Blocks",
            vec![FieldSchema::new("columns", "array").with_fields(vec![
                FieldSchema::new("size", "select"),
                FieldSchema::new("richText", "richText"),
            ])],
        ),
        reference(
            "call-to-action",
            "Call to Action",
            "Calls to Action",
            vec![
                validated(text("heading")),
                FieldSchema::new("links", "array")
                    .with_fields(vec![text("label"), validated(FieldSchema::new("url", "text"))]),
            ],
        ),
    ]
}
