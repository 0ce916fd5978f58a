use super::Severity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which analyzer stages an invocation executes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Blocks,
    Components,
    #[default]
    Full,
}

impl Scope {
    pub fn includes_blocks(self) -> bool {
        matches!(self, Scope::Blocks | Scope::Full)
    }

    pub fn includes_components(self) -> bool {
        matches!(self, Scope::Components | Scope::Full)
    }

    pub fn is_full(self) -> bool {
        self == Scope::Full
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Blocks => write!(f, "blocks"),
            Scope::Components => write!(f, "components"),
            Scope::Full => write!(f, "full"),
        }
    }
}

/// Input of one analysis invocation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnalysisOptions {
    pub blocks_dir: PathBuf,
    pub components_dir: PathBuf,
    #[serde(default)]
    pub references_dir: Option<PathBuf>,
    #[serde(default)]
    pub scope: Scope,
    #[serde(default)]
    pub generate_tests: bool,
    #[serde(default)]
    pub compare_patterns: bool,
    #[serde(default)]
    pub min_severity: Severity,
}

impl AnalysisOptions {
    pub fn new(blocks_dir: impl Into<PathBuf>, components_dir: impl Into<PathBuf>) -> Self {
        Self {
            blocks_dir: blocks_dir.into(),
            components_dir: components_dir.into(),
            references_dir: None,
            scope: Scope::Full,
            generate_tests: false,
            compare_patterns: false,
            min_severity: Severity::Low,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tests(mut self, generate: bool) -> Self {
        self.generate_tests = generate;
        self
    }

    pub fn with_pattern_comparison(mut self, compare: bool) -> Self {
        self.compare_patterns = compare;
        self
    }

    pub fn with_references(mut self, dir: impl Into<PathBuf>) -> Self {
        self.references_dir = Some(dir.into());
        self
    }

    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_inclusion() {
        assert!(Scope::Full.includes_blocks() && Scope::Full.includes_components());
        assert!(Scope::Blocks.includes_blocks() && !Scope::Blocks.includes_components());
        assert!(!Scope::Components.includes_blocks() && Scope::Components.includes_components());
    }

    #[test]
    fn test_options_builder() {
        let options = AnalysisOptions::new("src/blocks", "src/components")
            .with_scope(Scope::Blocks)
            .with_tests(true)
            .with_min_severity(Severity::High);
        assert_eq!(options.scope, Scope::Blocks);
        assert!(options.generate_tests);
        assert!(!options.compare_patterns);
        assert_eq!(options.min_severity, Severity::High);
    }
}
