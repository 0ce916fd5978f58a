//! Test-suite outlines for analyzed artifacts.
//!
//! Only names and counts are produced; writing the test files belongs to
//! the formatters.

use crate::core::{Artifact, ArtifactKind, BlockSchema, ComponentFacts, GeneratedTestSuite};

pub fn generate_suite(artifact: &Artifact) -> GeneratedTestSuite {
    match artifact {
        Artifact::Block(block) => block_suite(block),
        Artifact::Component(component) => component_suite(component),
    }
}

fn block_suite(block: &BlockSchema) -> GeneratedTestSuite {
    let mut cases = vec![format!("{} renders with required fields", block.slug)];
    cases.extend(
        block
            .all_fields()
            .into_iter()
            .filter(|f| f.required && !f.name.is_empty())
            .map(|f| format!("rejects missing required field '{}'", f.name)),
    );
    cases.push("matches the stored schema snapshot".to_string());
    if block.has_access_control() {
        cases.push("enforces access control".to_string());
    }

    GeneratedTestSuite {
        artifact: block.slug.clone(),
        kind: ArtifactKind::Block,
        file_name: format!("{}.config.test.ts", block.slug),
        cases,
    }
}

fn component_suite(component: &ComponentFacts) -> GeneratedTestSuite {
    let mut cases = vec![format!("{} renders without crashing", component.name)];
    cases.extend(
        component
            .props
            .iter()
            .map(|p| format!("renders prop '{}'", p.name)),
    );
    if component.jsx_elements.iter().any(|e| e.name == "img") {
        cases.push("images have alt text".to_string());
    }
    if !component.hooks.is_empty() {
        cases.push("updates on interaction".to_string());
    }

    GeneratedTestSuite {
        artifact: component.name.clone(),
        kind: ArtifactKind::Component,
        file_name: format!("{}.test.tsx", component.name),
        cases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FieldSchema, HookUsage, JsxElementFact, PropFact};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_block_suite_covers_required_fields() {
        let block = BlockSchema::new(
            "hero",
            vec![
                FieldSchema::new("heading", "text").required(),
                FieldSchema::new("media", "upload"),
                FieldSchema::new("links", "array")
                    .with_fields(vec![FieldSchema::new("url", "text").required()]),
            ],
        );

        let suite = generate_suite(&Artifact::Block(block));
        assert_eq!(suite.file_name, "hero.config.test.ts");
        assert_eq!(
            suite.cases,
            vec![
                "hero renders with required fields".to_string(),
                "rejects missing required field 'heading'".to_string(),
                "rejects missing required field 'url'".to_string(),
                "matches the stored schema snapshot".to_string(),
            ]
        );
    }

    #[test]
    fn test_component_suite() {
        let mut component = ComponentFacts::new("HeroBlock", "components/HeroBlock.tsx");
        component.props = vec![PropFact {
            name: "heading".into(),
            type_name: Some("string".into()),
            optional: false,
        }];
        component.jsx_elements = vec![JsxElementFact {
            name: "img".into(),
            attributes: vec![],
            line: 3,
            column: 1,
        }];
        component.hooks = vec![HookUsage {
            name: "useState".into(),
            line: 2,
        }];

        let suite = generate_suite(&Artifact::Component(component));
        assert_eq!(suite.kind, ArtifactKind::Component);
        assert_eq!(suite.file_name, "HeroBlock.test.tsx");
        assert_eq!(suite.cases.len(), 4);
    }
}
