use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Raw text access to sidecar files, keyed by absolute path.
pub trait SidecarStore: Send + Sync {
    /// `Ok(None)` when the sidecar does not exist yet.
    fn read(&self, path: &Path) -> io::Result<Option<String>>;

    /// Replace the sidecar contents. A failure must never leave a partial file.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Sidecar path for an image: same stem, `.txt` extension.
pub fn sidecar_path(image: &Path) -> PathBuf {
    image.with_extension("txt")
}

/// Filesystem store writing through a temp file and rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSidecarStore;

impl SidecarStore for FsSidecarStore {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("txt.tmp");
        fs::write(&tmp, contents.as_bytes())?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_sidecar_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FsSidecarStore;
        assert_eq!(store.read(&dir.path().join("a.txt")).unwrap(), None);
    }

    #[test]
    fn write_creates_file_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let store = FsSidecarStore;
        let path = dir.path().join("img.txt");

        store.write(&path, "1girl, solo").unwrap();
        store.write(&path, "1girl").unwrap();

        assert_eq!(store.read(&path).unwrap().as_deref(), Some("1girl"));
        assert!(!dir.path().join("img.txt.tmp").exists());
    }

    #[test]
    fn sidecar_replaces_image_extension() {
        assert_eq!(
            sidecar_path(Path::new("/data/set/img.v2.PNG")),
            PathBuf::from("/data/set/img.v2.txt")
        );
    }
}
