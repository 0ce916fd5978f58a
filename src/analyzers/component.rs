//! Accessibility and structure checks on parsed component facts.

use super::Analyzer;
use crate::core::{
    ArtifactAnalysisResult, ArtifactKind, ArtifactMetrics, CapabilityFlags, ComponentFacts,
    ComponentKind, EffortTier, Issue, IssueCategory, JsxElementFact, Severity, SourceLocation,
    Suggestion,
};
use crate::errors::AnalyzerError;

/// Elements that receive focus and keyboard events natively.
const INTERACTIVE_ELEMENTS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "option", "summary", "details", "label",
];

#[derive(Debug, Clone, Default)]
pub struct ComponentAnalyzer;

impl ComponentAnalyzer {
    fn location(component: &ComponentFacts, element: &JsxElementFact) -> SourceLocation {
        let location = SourceLocation::new(&component.path, element.line, element.column);
        match component.snippet(element.line) {
            Some(snippet) => location.with_snippet(snippet),
            None => location,
        }
    }

    fn metrics(component: &ComponentFacts) -> ArtifactMetrics {
        let typed = !component.props.is_empty() && component.props.iter().all(|p| p.type_name.is_some());
        let attributes: usize = component.jsx_elements.iter().map(|e| e.attributes.len()).sum();
        ArtifactMetrics {
            field_count: component.props.len(),
            line_count: component.line_count(),
            nesting_depth: 0,
            complexity: component.jsx_elements.len() as f64
                + 0.25 * attributes as f64
                + 2.0 * component.hooks.len() as f64,
            flags: CapabilityFlags {
                is_client_component: component.kind == ComponentKind::Client,
                uses_hooks: !component.hooks.is_empty(),
                has_typed_props: typed,
                ..CapabilityFlags::default()
            },
        }
    }

    fn check_elements(component: &ComponentFacts, issues: &mut Vec<Issue>) {
        for element in &component.jsx_elements {
            match element.name.as_str() {
                "img" if !element.has_attribute("alt") => issues.push(
                    Issue::new(
                        "img-missing-alt",
                        Severity::High,
                        IssueCategory::Accessibility,
                        "Image without alt text",
                    )
                    .describe("Screen readers cannot describe this image")
                    .at(Self::location(component, element))
                    .remediate("Add an alt attribute; use alt=\"\" for decorative images")
                    .example("<img src={src} />", "<img src={src} alt={image.alt} />"),
                ),
                "a" if !element.has_attribute("href") => issues.push(
                    Issue::new(
                        "anchor-missing-href",
                        Severity::Medium,
                        IssueCategory::Accessibility,
                        "Link without href",
                    )
                    .describe("An anchor without href is not focusable and is not announced as a link")
                    .at(Self::location(component, element))
                    .remediate("Add an href, or use a button for actions"),
                ),
                name if element.has_attribute("onClick")
                    && is_intrinsic(name)
                    && !INTERACTIVE_ELEMENTS.contains(&name)
                    && !element.has_attribute("role") =>
                {
                    issues.push(
                        Issue::new(
                            "non-interactive-click",
                            Severity::Medium,
                            IssueCategory::Accessibility,
                            format!("Click handler on <{name}>"),
                        )
                        .describe("Keyboard users cannot trigger click handlers on non-interactive elements")
                        .at(Self::location(component, element))
                        .remediate("Use a <button>, or add role and keyboard handlers")
                        .example(
                            format!("<{name} onClick={{open}}>"),
                            "<button type=\"button\" onClick={open}>",
                        ),
                    )
                }
                _ => {}
            }
        }
    }
}

/// Lowercase JSX names are DOM elements; capitalized ones are components.
fn is_intrinsic(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
}

impl Analyzer for ComponentAnalyzer {
    type Input = ComponentFacts;
    type Output = ArtifactAnalysisResult;

    fn name(&self) -> &'static str {
        "component"
    }

    fn analyze(&self, component: &ComponentFacts) -> Result<ArtifactAnalysisResult, AnalyzerError> {
        if component.name.trim().is_empty() {
            return Err(AnalyzerError::malformed(
                component.path.display().to_string(),
                "component has no name",
            ));
        }

        let mut result =
            ArtifactAnalysisResult::new(&component.name, ArtifactKind::Component, &component.path);
        result.metrics = Self::metrics(component);
        let file_location = SourceLocation::new(&component.path, 1, 0);
        let mut issues = Vec::new();

        let untyped: Vec<&str> = component
            .props
            .iter()
            .filter(|p| p.type_name.is_none())
            .map(|p| p.name.as_str())
            .collect();
        if !untyped.is_empty() {
            issues.push(
                Issue::new(
                    "untyped-props",
                    Severity::Medium,
                    IssueCategory::Maintainability,
                    "Props without types",
                )
                .describe(format!("Untyped props: {}", untyped.join(", ")))
                .at(file_location.clone())
                .remediate("Type the props with the block's generated interface"),
            );
        }

        Self::check_elements(component, &mut issues);

        match component.kind {
            ComponentKind::Client if component.hooks.is_empty() => issues.push(
                Issue::new(
                    "unnecessary-client-directive",
                    Severity::Low,
                    IssueCategory::Performance,
                    "Client component without hooks",
                )
                .describe("\"use client\" ships this component's code to the browser without need")
                .at(file_location.clone())
                .remediate("Remove the \"use client\" directive"),
            ),
            ComponentKind::Server | ComponentKind::Unknown if !component.hooks.is_empty() => {
                let first = &component.hooks[0];
                let names: Vec<&str> = component.hooks.iter().map(|h| h.name.as_str()).collect();
                issues.push(
                    Issue::new(
                        "hooks-in-server-component",
                        Severity::High,
                        IssueCategory::Structure,
                        "Hooks used in a server component",
                    )
                    .describe(format!("Hooks {} only run on the client", names.join(", ")))
                    .at(SourceLocation::new(&component.path, first.line, 0))
                    .remediate("Add \"use client\" or move the stateful part into a client child component"),
                )
            }
            _ => {}
        }

        if !component.exports.iter().any(|e| e == "default") {
            issues.push(
                Issue::new(
                    "missing-default-export",
                    Severity::Medium,
                    IssueCategory::Integration,
                    "No default export",
                )
                .describe("The block renderer imports block components by default export")
                .at(file_location)
                .remediate(format!("Add `export default {}`", component.name)),
            );
        }

        result.extend_issues(issues);

        if component.props.len() > 8 {
            result.suggestions.push(Suggestion::new(
                "split-component",
                "Split the component",
                "Extract sub-components for repeated or optional sections",
                "Smaller components are easier to test and reuse",
                EffortTier::Medium,
            ));
        }
        if component.kind == ComponentKind::Client && component.hooks.len() > 3 {
            result.suggestions.push(Suggestion::new(
                "extract-hook",
                "Extract a custom hook",
                "Move the component's state logic into a custom hook",
                "State logic becomes testable on its own",
                EffortTier::Low,
            ));
        }

        Ok(result)
    }
}
