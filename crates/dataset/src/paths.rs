use crate::error::{DatasetError, Result};
use std::path::{Component, Path, PathBuf};

/// Maps a dataset-root-relative path to an absolute one.
///
/// Implementations enforce containment under the dataset root; the dataset
/// layer trusts whatever they return.
pub trait PathResolver: Send + Sync {
    fn resolve(&self, rel: &str) -> Result<PathBuf>;
}

/// Resolver confined to a single canonical root directory.
#[derive(Debug, Clone)]
pub struct RootedResolver {
    root: PathBuf,
}

impl RootedResolver {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| {
            DatasetError::InvalidPath(format!("dataset root {}: {e}", root.display()))
        })?;
        if !canonical.is_dir() {
            return Err(DatasetError::InvalidPath(format!(
                "dataset root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root: canonical })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PathResolver for RootedResolver {
    fn resolve(&self, rel: &str) -> Result<PathBuf> {
        let rel = rel.trim().replace('\\', "/");
        let mut joined = self.root.clone();
        for component in Path::new(&rel).components() {
            match component {
                Component::Normal(part) => joined.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(DatasetError::InvalidPath(format!(
                        "'{rel}' must not contain '..'"
                    )))
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(DatasetError::InvalidPath(format!(
                        "'{rel}' must be relative to the dataset root"
                    )))
                }
            }
        }

        if !joined.exists() {
            return Ok(joined);
        }
        // Symlinks may still point outside the root.
        let canonical = joined.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(DatasetError::InvalidPath(format!(
                "'{rel}' escapes the dataset root"
            )));
        }
        Ok(canonical)
    }
}
