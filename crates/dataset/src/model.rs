use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Opaque image id derived from the dataset-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn from_rel_path(rel_path: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(rel_path.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..32].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ImageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One image in the working set.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub(crate) id: ImageId,
    pub(crate) rel_path: String,
    pub(crate) sidecar_path: PathBuf,
    pub(crate) original: Vec<String>,
    pub(crate) current: Vec<String>,
    pub(crate) complete: bool,
}

impl ImageRecord {
    pub fn new(rel_path: impl Into<String>, sidecar_path: PathBuf, tags: Vec<String>) -> Self {
        let rel_path = rel_path.into();
        Self {
            id: ImageId::from_rel_path(&rel_path),
            rel_path,
            sidecar_path,
            current: tags.clone(),
            original: tags,
            complete: false,
        }
    }

    pub fn id(&self) -> &ImageId {
        &self.id
    }

    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    pub fn filename(&self) -> &str {
        self.rel_path
            .rsplit('/')
            .next()
            .unwrap_or(self.rel_path.as_str())
    }

    pub fn sidecar_path(&self) -> &Path {
        &self.sidecar_path
    }

    pub fn tags(&self) -> &[String] {
        &self.current
    }

    pub fn original_tags(&self) -> &[String] {
        &self.original
    }

    pub fn is_dirty(&self) -> bool {
        self.current != self.original
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn diff(&self) -> ImageDiff {
        let original: HashSet<&str> = self.original.iter().map(String::as_str).collect();
        let current: HashSet<&str> = self.current.iter().map(String::as_str).collect();

        let added = unique_where(&self.current, |tag| !original.contains(tag));
        let removed = unique_where(&self.original, |tag| !current.contains(tag));

        // Kept tags keep their multiplicity so moving a duplicate still counts.
        let kept_before = self.original.iter().filter(|tag| current.contains(tag.as_str()));
        let kept_after = self.current.iter().filter(|tag| original.contains(tag.as_str()));
        let reordered = !kept_before.eq(kept_after);

        ImageDiff {
            image_id: self.id.clone(),
            rel_path: self.rel_path.clone(),
            added,
            removed,
            reordered,
        }
    }
}

fn unique_where(tags: &[String], keep: impl Fn(&str) -> bool) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .filter(|tag| keep(tag) && seen.insert(tag.as_str()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDiff {
    pub image_id: ImageId,
    pub rel_path: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub reordered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub dirty_count: usize,
    pub changes: Vec<ImageDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsView {
    pub image_id: ImageId,
    pub rel_path: String,
    pub tags: Vec<String>,
    pub is_dirty: bool,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub image_id: ImageId,
    pub tags: Vec<String>,
    pub is_dirty: bool,
    /// False when the operation was a no-op.
    pub changed: bool,
}

/// Per-image counts; an image is counted once per kind of change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub affected_images: usize,
    pub added: usize,
    pub removed: usize,
    pub replaced: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub image_id: ImageId,
    pub rel_path: String,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub written_files: usize,
    pub failures: Vec<ApplyFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbors {
    pub previous: Option<ImageId>,
    pub next: Option<ImageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
    pub is_undesired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(original: &[&str], current: &[&str]) -> ImageRecord {
        let mut record = ImageRecord::new(
            "set/img.png",
            PathBuf::from("/d/set/img.txt"),
            original.iter().map(|t| t.to_string()).collect(),
        );
        record.current = current.iter().map(|t| t.to_string()).collect();
        record
    }

    #[test]
    fn ids_are_deterministic_and_path_sensitive() {
        assert_eq!(ImageId::from_rel_path("a/b.png"), ImageId::from_rel_path("a/b.png"));
        assert_ne!(ImageId::from_rel_path("a/b.png"), ImageId::from_rel_path("a/B.png"));
        assert_eq!(ImageId::from_rel_path("x.png").as_str().len(), 32);
    }

    #[test]
    fn diff_reports_add_remove_and_reorder_independently() {
        let diff = record(&["a", "b", "c"], &["c", "b", "d"]).diff();
        assert_eq!(diff.added, vec!["d"]);
        assert_eq!(diff.removed, vec!["a"]);
        assert!(diff.reordered);

        let pure_reorder = record(&["a", "b"], &["b", "a"]).diff();
        assert!(pure_reorder.added.is_empty());
        assert!(pure_reorder.removed.is_empty());
        assert!(pure_reorder.reordered);

        let append = record(&["a", "b"], &["a", "b", "c"]).diff();
        assert_eq!(append.added, vec!["c"]);
        assert!(!append.reordered);
    }

    #[test]
    fn moving_a_duplicate_tag_is_a_reorder() {
        let record = record(&["a", "b", "a"], &["a", "a", "b"]);
        let diff = record.diff();
        assert!(record.is_dirty());
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.reordered);
        assert_eq!(record.original_tags(), ["a", "b", "a"]);
    }

    #[test]
    fn filename_is_last_path_segment() {
        let record = record(&[], &[]);
        assert_eq!(record.filename(), "img.png");
        assert!(!record.is_dirty());
    }
}
