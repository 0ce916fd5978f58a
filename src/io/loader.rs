//! JSON artifact loading.
//!
//! Files are discovered with `walkdir`, read through a [`StreamProcessor`]
//! so only `[stream] buffer_size` files are held in flight per flush, and
//! decoded in parallel windows by a [`BatchProcessor`].

use super::ArtifactSource;
use crate::batch::{BatchProcessor, StreamProcessor};
use crate::config::{ParallelConfig, StreamConfig};
use crate::core::{BlockSchema, ComponentFacts};
use crate::errors::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// A file may hold one artifact or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

struct SourceFile {
    path: PathBuf,
    contents: String,
}

#[derive(Debug, Clone, Default)]
pub struct JsonArtifactLoader {
    parallel: ParallelConfig,
    stream: StreamConfig,
}

impl JsonArtifactLoader {
    pub fn new(parallel: ParallelConfig, stream: StreamConfig) -> Self {
        Self { parallel, stream }
    }

    /// `.json` files under `dir`, sorted by path.
    pub fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(Error::load(dir, "not a directory"));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| Error::load(dir, e.to_string()))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        debug!(dir = %dir.display(), files = files.len(), "discovered artifact files");
        Ok(files)
    }

    fn load<T>(&self, dir: &Path) -> Result<Vec<(PathBuf, T)>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let files = self.discover(dir)?;

        let reader = StreamProcessor::new(&self.stream, |paths: Vec<PathBuf>| {
            paths
                .into_iter()
                .map(|path| {
                    std::fs::read_to_string(&path)
                        .map(|contents| SourceFile {
                            path: path.clone(),
                            contents,
                        })
                        .map_err(|e| Error::load(&path, e.to_string()))
                })
                .collect::<Result<Vec<_>>>()
        });
        for file in files {
            reader.add(file)?;
        }
        let sources = reader.finish()?;

        let decoder = BatchProcessor::new(
            self.parallel.clone(),
            |batch: Vec<SourceFile>| -> Result<Vec<(PathBuf, T)>> {
                let mut decoded = Vec::new();
                for file in batch {
                    let parsed: OneOrMany<T> = serde_json::from_str(&file.contents)
                        .map_err(|e| Error::load(&file.path, e.to_string()))?;
                    decoded.extend(
                        parsed
                            .into_vec()
                            .into_iter()
                            .map(|item| (file.path.clone(), item)),
                    );
                }
                Ok(decoded)
            },
        )?;
        let decoded = decoder.process(sources)?;

        info!(dir = %dir.display(), artifacts = decoded.len(), "artifacts loaded");
        Ok(decoded)
    }

    fn load_schemas(&self, dir: &Path) -> Result<Vec<BlockSchema>> {
        Ok(self
            .load::<BlockSchema>(dir)?
            .into_iter()
            .map(|(path, mut block)| {
                if block.path.as_os_str().is_empty() {
                    block.path = path;
                }
                block
            })
            .collect())
    }
}

impl ArtifactSource for JsonArtifactLoader {
    fn load_blocks(&self, dir: &Path) -> Result<Vec<BlockSchema>> {
        self.load_schemas(dir)
    }

    fn load_components(&self, dir: &Path) -> Result<Vec<ComponentFacts>> {
        Ok(self
            .load::<ComponentFacts>(dir)?
            .into_iter()
            .map(|(_, component)| component)
            .collect())
    }

    fn load_references(&self, dir: &Path) -> Result<Vec<BlockSchema>> {
        self.load_schemas(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::fs;
    use tempfile::TempDir;

    fn loader() -> JsonArtifactLoader {
        JsonArtifactLoader::new(
            ParallelConfig {
                batch_size: 2,
                concurrency: 2,
                window_delay_ms: 0,
                ..ParallelConfig::default()
            },
            StreamConfig { buffer_size: 2 },
        )
    }

    #[test]
    fn test_loads_single_and_list_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("hero.json"),
            indoc! {r#"
                { "slug": "hero", "fields": [{ "name": "heading", "type": "text" }] }
            "#},
        )
        .unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(
            dir.path().join("nested/more.json"),
            r#"[{ "slug": "cta" }, { "slug": "content" }]"#,
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let blocks = loader().load_blocks(dir.path()).unwrap();
        let slugs: Vec<_> = blocks.iter().map(|b| b.slug.as_str()).collect();
        assert_eq!(slugs, vec!["hero", "cta", "content"]);
        assert_eq!(blocks[0].path, dir.path().join("hero.json"));
    }

    #[test]
    fn test_invalid_json_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        let err = loader().load_blocks(dir.path()).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_missing_directory() {
        let err = loader()
            .load_components(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }
}
