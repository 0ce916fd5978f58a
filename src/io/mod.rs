//! Where artifacts come from.

mod loader;

pub use loader::JsonArtifactLoader;

use crate::core::{ArtifactSet, BlockSchema, ComponentFacts};
use crate::errors::Result;
use std::path::Path;

/// Supplies parsed artifacts to the orchestrator. Loading happens on the
/// caller's thread; implementations may parallelize internally.
pub trait ArtifactSource {
    fn load_blocks(&self, dir: &Path) -> Result<Vec<BlockSchema>>;

    fn load_components(&self, dir: &Path) -> Result<Vec<ComponentFacts>>;

    /// Reference blocks for pattern comparison.
    fn load_references(&self, dir: &Path) -> Result<Vec<BlockSchema>>;
}

/// Serves a fixed artifact set, ignoring the directories it is asked for.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    set: ArtifactSet,
}

impl InMemorySource {
    pub fn new(set: ArtifactSet) -> Self {
        Self { set }
    }

    pub fn with_blocks(mut self, blocks: Vec<BlockSchema>) -> Self {
        self.set.blocks = blocks;
        self
    }

    pub fn with_components(mut self, components: Vec<ComponentFacts>) -> Self {
        self.set.components = components;
        self
    }

    pub fn with_references(mut self, references: Vec<BlockSchema>) -> Self {
        self.set.references = references;
        self
    }
}

impl ArtifactSource for InMemorySource {
    fn load_blocks(&self, _dir: &Path) -> Result<Vec<BlockSchema>> {
        Ok(self.set.blocks.clone())
    }

    fn load_components(&self, _dir: &Path) -> Result<Vec<ComponentFacts>> {
        Ok(self.set.components.clone())
    }

    fn load_references(&self, _dir: &Path) -> Result<Vec<BlockSchema>> {
        Ok(self.set.references.clone())
    }
}
