use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tagtidy_taxonomy::UndesiredTags;

pub(crate) const CONFIG_FILE: &str = "config.toml";
pub(crate) const UNDESIRED_FILE: &str = "undesired_tags.json";
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:7860";

/// Optional `config.toml` in the config dir. CLI flags win over these values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub dataset_root: Option<PathBuf>,
    #[serde(default)]
    pub bind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UndesiredDocument {
    #[serde(default)]
    tags: Vec<String>,
}

impl FileConfig {
    pub(crate) fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("No {} in {}", CONFIG_FILE, config_dir.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Dataset root from the flag, then the config file, then the working directory.
pub(crate) fn resolve_dataset_root(flag: Option<PathBuf>, file: &FileConfig) -> PathBuf {
    flag.or_else(|| file.dataset_root.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

pub(crate) fn resolve_bind(flag: Option<String>, file: &FileConfig) -> String {
    flag.or_else(|| file.bind.clone())
        .unwrap_or_else(|| DEFAULT_BIND.to_string())
}

/// Read `undesired_tags.json`. Missing or malformed files yield an empty set.
pub(crate) fn load_undesired(config_dir: &Path) -> UndesiredTags {
    let path = config_dir.join(UNDESIRED_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("{} not found; no tags will be flagged", path.display());
            return UndesiredTags::default();
        }
        Err(e) => {
            log::warn!("Failed to read {}: {e}", path.display());
            return UndesiredTags::default();
        }
    };
    match serde_json::from_str::<UndesiredDocument>(&raw) {
        Ok(doc) => {
            let tags = UndesiredTags::new(doc.tags);
            log::info!("Loaded {} undesired tags", tags.len());
            tags
        }
        Err(e) => {
            log::warn!("Ignoring malformed {}: {e}", path.display());
            UndesiredTags::default()
        }
    }
}
