use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Image extensions eligible for tagging, compared case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// A discovered image, relative path in `/` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedImage {
    pub abs_path: PathBuf,
    pub rel_path: String,
}

/// Recursive scanner for image files under a dataset folder.
pub struct ImageScanner {
    root: PathBuf,
}

impl ImageScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Every supported image under the root, sorted by lowercased relative path.
    ///
    /// Symlinks are not followed and hidden entries (dot-prefixed) are skipped,
    /// so tool caches living inside a dataset never count as images.
    pub fn scan(&self) -> Vec<ScannedImage> {
        let mut images = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Failed to read entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !Self::is_image_file(path) {
                continue;
            }

            let Ok(relative) = path.strip_prefix(&self.root) else {
                log::debug!("Skipping entry outside scan root: {}", path.display());
                continue;
            };
            images.push(ScannedImage {
                abs_path: path.to_path_buf(),
                rel_path: to_slash(relative),
            });
        }

        images.sort_by_cached_key(|image| image.rel_path.to_lowercase());
        log::debug!("Found {} images under {}", images.len(), self.root.display());
        images
    }

    pub fn is_image_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|candidate| ext.eq_ignore_ascii_case(candidate))
            })
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|name| name.starts_with('.'))
}

pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn finds_supported_images_recursively_in_stable_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(".cache")).unwrap();
        for name in [
            "b.PNG",
            "A.jpg",
            "sub/c.webp",
            "notes.txt",
            "a.txt",
            "clip.gif",
            ".cache/thumb.jpg",
        ] {
            fs::write(root.join(name), b"x").unwrap();
        }

        let rels: Vec<String> = ImageScanner::new(root)
            .scan()
            .into_iter()
            .map(|image| image.rel_path)
            .collect();
        assert_eq!(rels, vec!["A.jpg", "b.PNG", "sub/c.webp"]);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(ImageScanner::is_image_file(Path::new("x/photo.JPEG")));
        assert!(ImageScanner::is_image_file(Path::new("photo.WebP")));
        assert!(!ImageScanner::is_image_file(Path::new("photo.bmp")));
        assert!(!ImageScanner::is_image_file(Path::new("png")));
    }
}
