//! Security checks for both artifact kinds.

use super::Analyzer;
use crate::core::{Artifact, BlockSchema, ComponentFacts, Issue, IssueCategory, Severity, SourceLocation};
use crate::errors::AnalyzerError;
use once_cell::sync::Lazy;
use regex::Regex;

static EVAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\beval\s*\(|\bnew\s+Function\s*\(").expect("valid eval pattern")
});

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r#"(?i)(api[_-]?key|apikey)\s*[:=]\s*['"][\w\-]{20,}['"]"#, "API key"),
        (r#"(?i)(secret|password|passwd|pwd)\s*[:=]\s*['"][^'"]{8,}['"]"#, "password or secret"),
        (r#"(?i)(token|bearer)\s*[:=]\s*['"][\w\-\.]{20,}['"]"#, "authentication token"),
        (r#"(?i)aws[_-]?access[_-]?key[_-]?id\s*[:=]\s*['"][A-Z0-9]{20}['"]"#, "AWS access key"),
        (r"sk[_-]live[_-][0-9a-zA-Z]{24,}", "Stripe API key"),
        (r#"(?i)private[_-]?key\s*[:=]\s*['"]-----BEGIN"#, "private key"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid secret pattern"), label))
    .collect()
});

/// Import sources that sanitize HTML before it is injected.
const SANITIZERS: &[&str] = &["dompurify", "isomorphic-dompurify", "sanitize-html", "xss"];

/// Field names that suggest credentials.
const SENSITIVE_NAMES: &[&str] = &["password", "secret", "token", "apikey", "api_key", "privatekey"];

#[derive(Debug, Clone, Default)]
pub struct SecurityAnalyzer;

impl SecurityAnalyzer {
    fn check_block(block: &BlockSchema) -> Vec<Issue> {
        let mut issues = Vec::new();
        if !block.has_access_control() {
            issues.push(
                Issue::new(
                    "missing-access-control",
                    Severity::Medium,
                    IssueCategory::Security,
                    "Block has no access control",
                )
                .describe("Anyone with admin access can create, change and read this block's content")
                .at(SourceLocation::new(&block.path, 0, 0))
                .remediate("Define access functions for create, update and delete"),
            );
        }

        for field in block.all_fields() {
            let normalized = field.name.to_lowercase().replace(['-', ' '], "");
            let sensitive = SENSITIVE_NAMES.iter().any(|s| normalized.contains(s));
            let guarded = field.access.as_ref().is_some_and(|a| a.read);
            if sensitive && !guarded {
                issues.push(
                    Issue::new(
                        "sensitive-field-exposed",
                        Severity::High,
                        IssueCategory::Security,
                        format!("Field '{}' may hold a credential", field.name),
                    )
                    .describe("The field is readable through the public API")
                    .at(SourceLocation::new(&block.path, field.line.unwrap_or(0), 0))
                    .remediate("Restrict read access to the field, or keep the value out of content"),
                );
            }
        }
        issues
    }

    fn check_component(component: &ComponentFacts) -> Vec<Issue> {
        let mut issues = Vec::new();
        let at = |line: usize, column: usize| {
            let location = SourceLocation::new(&component.path, line, column);
            match component.snippet(line) {
                Some(snippet) => location.with_snippet(snippet),
                None => location,
            }
        };

        let sanitized = component
            .imports
            .iter()
            .any(|i| SANITIZERS.contains(&i.source.to_lowercase().as_str()));
        let mut injects_html = false;

        for element in &component.jsx_elements {
            if element.has_attribute("dangerouslySetInnerHTML") {
                injects_html = true;
                issues.push(
                    Issue::new(
                        "dangerous-inner-html",
                        Severity::High,
                        IssueCategory::Security,
                        "dangerouslySetInnerHTML in use",
                    )
                    .describe("Raw HTML bypasses React's escaping")
                    .at(at(element.line, element.column))
                    .remediate("Render rich text through a serializer instead of raw HTML"),
                );
            }

            for attr in ["href", "src", "action"] {
                let is_js_url = element
                    .attribute(attr)
                    .and_then(|a| a.value.as_deref())
                    .is_some_and(|v| v.trim().to_lowercase().starts_with("javascript:"));
                if is_js_url {
                    issues.push(
                        Issue::new(
                            "javascript-url",
                            Severity::High,
                            IssueCategory::Security,
                            format!("javascript: URL in {attr}"),
                        )
                        .describe("javascript: URLs execute code when followed")
                        .at(at(element.line, element.column))
                        .remediate("Use an event handler instead"),
                    );
                }
            }

            let blank_target = element
                .attribute("target")
                .and_then(|a| a.value.as_deref())
                .is_some_and(|v| v == "_blank");
            let has_noopener = element
                .attribute("rel")
                .and_then(|a| a.value.as_deref())
                .is_some_and(|v| v.contains("noopener") || v.contains("noreferrer"));
            if blank_target && !has_noopener {
                issues.push(
                    Issue::new(
                        "unsafe-target-blank",
                        Severity::Low,
                        IssueCategory::Security,
                        "target=\"_blank\" without rel=\"noopener\"",
                    )
                    .describe("The opened page can navigate this one through window.opener")
                    .at(at(element.line, element.column))
                    .remediate("Add rel=\"noopener noreferrer\"")
                    .example(
                        "<a href={url} target=\"_blank\">",
                        "<a href={url} target=\"_blank\" rel=\"noopener noreferrer\">",
                    ),
                );
            }
        }

        if injects_html && !sanitized {
            issues.push(
                Issue::new(
                    "unsanitized-rich-text",
                    Severity::Critical,
                    IssueCategory::Security,
                    "Rich text rendered without sanitization",
                )
                .describe("Content is injected as HTML and no sanitizer is imported")
                .at(SourceLocation::new(&component.path, 1, 0))
                .remediate("Sanitize the HTML (for example with DOMPurify) before rendering it"),
            );
        }

        if let Some(source) = component.source.as_deref() {
            for (index, line) in source.lines().enumerate() {
                let line_no = index + 1;
                if let Some(m) = EVAL.find(line) {
                    issues.push(
                        Issue::new(
                            "eval-usage",
                            Severity::Critical,
                            IssueCategory::Security,
                            "Dynamic code evaluation",
                        )
                        .describe("eval and new Function execute arbitrary strings as code")
                        .at(at(line_no, m.start()))
                        .remediate("Replace dynamic evaluation with explicit logic or JSON.parse"),
                    );
                }
                if let Some((_, label)) = SECRET_PATTERNS.iter().find(|(re, _)| re.is_match(line)) {
                    issues.push(
                        Issue::new(
                            "hardcoded-secret",
                            Severity::Critical,
                            IssueCategory::Security,
                            format!("Hard-coded {label}"),
                        )
                        .describe("Secrets in component source end up in the client bundle and in version control")
                        .at(SourceLocation::new(&component.path, line_no, 0))
                        .remediate("Move the value to an environment variable read on the server"),
                    );
                }
            }
        }

        issues
    }
}

impl Analyzer for SecurityAnalyzer {
    type Input = Artifact;
    type Output = Vec<Issue>;

    fn name(&self) -> &'static str {
        "security"
    }

    fn analyze(&self, artifact: &Artifact) -> Result<Vec<Issue>, AnalyzerError> {
        Ok(match artifact {
            Artifact::Block(block) => Self::check_block(block),
            Artifact::Component(component) => Self::check_component(component),
        })
    }
}
