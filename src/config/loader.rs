use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use super::BlockauditConfig;

pub const CONFIG_FILE_NAME: &str = ".blockaudit.toml";

const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Parse TOML and validate the parts that have invariants.
pub fn parse_and_validate_config(contents: &str) -> anyhow::Result<BlockauditConfig> {
    let config = toml::from_str::<BlockauditConfig>(contents)
        .with_context(|| format!("Failed to parse {CONFIG_FILE_NAME}"))?;

    config
        .scoring
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid [scoring] section: {e}"))?;

    Ok(config)
}

/// Load an explicitly named config file. Errors are reported, not swallowed.
pub fn load_config_from_path(path: &Path) -> anyhow::Result<BlockauditConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config = parse_and_validate_config(&contents)?;
    debug!("Loaded config from {}", path.display());
    Ok(config)
}

fn try_load_config(path: &Path) -> Option<BlockauditConfig> {
    match fs::read_to_string(path) {
        Ok(contents) => match parse_and_validate_config(&contents) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                warn!("{e:#}. Using defaults.");
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            None
        }
    }
}

/// `start` and its ancestors, nearest first, at most `max_depth` entries.
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Find the nearest `.blockaudit.toml` from `start` upwards, or defaults.
pub fn load_config(start: &Path) -> BlockauditConfig {
    directory_ancestors(start.to_path_buf(), MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config(&path))
        .unwrap_or_else(|| {
            debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            BlockauditConfig::default()
        })
}
