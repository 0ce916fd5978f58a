//! Input artifacts: block schemas and parsed component facts.
//!
//! Both arrive already parsed (schema objects from the CMS config, component
//! facts from an external AST parser) and are deserialized from JSON.

use super::ArtifactKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Field types that hold nested fields.
const CONTAINER_TYPES: &[&str] = &["group", "array", "row", "collapsible", "tabs", "blocks"];

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AccessControl {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

impl AccessControl {
    pub fn is_configured(&self) -> bool {
        self.read || self.create || self.update || self.delete
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockLabels {
    pub singular: String,
    pub plural: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldSchema {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub localized: bool,
    /// The field declares a custom `validate` function.
    #[serde(default)]
    pub validate: bool,
    #[serde(default)]
    pub access: Option<AccessControl>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub line: Option<usize>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            required: false,
            label: None,
            localized: false,
            validate: false,
            access: None,
            fields: Vec::new(),
            line: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_fields(mut self, fields: Vec<FieldSchema>) -> Self {
        self.fields = fields;
        self
    }

    pub fn is_container(&self) -> bool {
        CONTAINER_TYPES.contains(&self.field_type.as_str())
    }

    /// Depth of this field, counting itself as one level.
    pub fn depth(&self) -> usize {
        1 + self.fields.iter().map(FieldSchema::depth).max().unwrap_or(0)
    }

    /// Number of fields in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.fields.iter().map(FieldSchema::count).sum::<usize>()
    }
}

/// A CMS block configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockSchema {
    pub slug: String,
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default, rename = "interfaceName")]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub labels: Option<BlockLabels>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub access: Option<AccessControl>,
}

impl BlockSchema {
    pub fn new(slug: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        let slug = slug.into();
        Self {
            path: PathBuf::from(format!("blocks/{slug}/config.ts")),
            slug,
            interface_name: None,
            labels: None,
            fields,
            access: None,
        }
    }

    pub fn field_count(&self) -> usize {
        self.fields.iter().map(FieldSchema::count).sum()
    }

    pub fn nesting_depth(&self) -> usize {
        self.fields.iter().map(FieldSchema::depth).max().unwrap_or(0)
    }

    /// Every field in depth-first order.
    pub fn all_fields(&self) -> Vec<&FieldSchema> {
        fn walk<'a>(fields: &'a [FieldSchema], out: &mut Vec<&'a FieldSchema>) {
            for field in fields {
                out.push(field);
                walk(&field.fields, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.fields, &mut out);
        out
    }

    /// Names of top-level data fields. Layout containers (`row`,
    /// `collapsible`, `tabs`) do not hold data themselves, so their children
    /// are lifted to the top level.
    pub fn top_level_data_fields(&self) -> Vec<&str> {
        fn lift<'a>(fields: &'a [FieldSchema], out: &mut Vec<&'a str>) {
            for field in fields {
                match field.field_type.as_str() {
                    "row" | "collapsible" | "tabs" => lift(&field.fields, out),
                    _ if !field.name.is_empty() => out.push(field.name.as_str()),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        lift(&self.fields, &mut out);
        out
    }

    pub fn has_access_control(&self) -> bool {
        self.access.as_ref().is_some_and(AccessControl::is_configured)
            || self
                .all_fields()
                .iter()
                .any(|f| f.access.as_ref().is_some_and(AccessControl::is_configured))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Server,
    Client,
    #[default]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropFact {
    pub name: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportFact {
    pub source: String,
    #[serde(default)]
    pub specifiers: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsxAttribute {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsxElementFact {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<JsxAttribute>,
    #[serde(default)]
    pub line: usize,
    #[serde(default)]
    pub column: usize,
}

impl JsxElementFact {
    pub fn attribute(&self, name: &str) -> Option<&JsxAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HookUsage {
    pub name: String,
    #[serde(default)]
    pub line: usize,
}

/// Facts extracted from one parsed UI component.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ComponentFacts {
    pub path: PathBuf,
    pub name: String,
    #[serde(default)]
    pub kind: ComponentKind,
    #[serde(default)]
    pub props: Vec<PropFact>,
    #[serde(default)]
    pub imports: Vec<ImportFact>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub jsx_elements: Vec<JsxElementFact>,
    #[serde(default)]
    pub hooks: Vec<HookUsage>,
    /// Source text, when the parser kept it; used for snippets and
    /// pattern-based security checks.
    #[serde(default)]
    pub source: Option<String>,
    /// Explicit link to the block this component renders.
    #[serde(default)]
    pub block_slug: Option<String>,
    /// Underlying AST, opaque to the core.
    #[serde(default)]
    pub ast: Option<serde_json::Value>,
}

impl ComponentFacts {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: ComponentKind::Unknown,
            props: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            jsx_elements: Vec::new(),
            hooks: Vec::new(),
            source: None,
            block_slug: None,
            ast: None,
        }
    }

    pub fn line_count(&self) -> usize {
        self.source.as_deref().map(|s| s.lines().count()).unwrap_or(0)
    }

    /// The source line at `line` (1-based), trimmed.
    pub fn snippet(&self, line: usize) -> Option<String> {
        let source = self.source.as_deref()?;
        line.checked_sub(1)
            .and_then(|idx| source.lines().nth(idx))
            .map(|l| l.trim().to_string())
    }

    pub fn prop_names(&self) -> Vec<&str> {
        self.props.iter().map(|p| p.name.as_str()).collect()
    }
}

/// One unit of analysis input.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Artifact {
    Block(BlockSchema),
    Component(ComponentFacts),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Block(_) => ArtifactKind::Block,
            Artifact::Component(_) => ArtifactKind::Component,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Artifact::Block(b) => &b.slug,
            Artifact::Component(c) => &c.name,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Artifact::Block(b) => &b.path,
            Artifact::Component(c) => &c.path,
        }
    }
}

/// Everything loaded for one invocation.
#[derive(Clone, Debug, Default)]
pub struct ArtifactSet {
    pub blocks: Vec<BlockSchema>,
    pub components: Vec<ComponentFacts>,
    pub references: Vec<BlockSchema>,
}

impl ArtifactSet {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.components.is_empty()
    }
}
