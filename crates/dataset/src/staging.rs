//! The in-memory working set for one loaded dataset.
//!
//! Every edit touches only the `current` layer of an [`ImageRecord`]; the
//! `original` layer changes only when `apply` writes a sidecar successfully.

use crate::error::{DatasetError, Result};
use crate::filter::{BulkOp, BulkScope, FilterCriteria, ScopeContext, StageOp};
use crate::model::{
    ApplyFailure, ApplyReport, BulkSummary, ChangeSummary, ImageId, ImageRecord, Neighbors,
    StageOutcome, TagCount, TagsView,
};
use crate::normalizer::{clean_tag, serialize};
use crate::sidecar::SidecarStore;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tagtidy_taxonomy::ImageHints;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub image_id: ImageId,
    pub filename: String,
    pub rel_path: String,
    pub tag_count: usize,
    pub has_undesired: bool,
    pub is_dirty: bool,
    pub is_complete: bool,
    pub hints: ImageHints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset_rel: String,
    pub image_count: usize,
    pub tags: Vec<TagCount>,
    pub images: Vec<ImageSummary>,
}

#[derive(Debug, Clone)]
pub struct DatasetSnapshot {
    dataset_rel: String,
    images: Vec<ImageRecord>,
    index: HashMap<ImageId, usize>,
}

impl DatasetSnapshot {
    /// Images keep the given order; it is the navigation order.
    pub fn new(dataset_rel: impl Into<String>, images: Vec<ImageRecord>) -> Self {
        let index = images
            .iter()
            .enumerate()
            .map(|(position, image)| (image.id.clone(), position))
            .collect();
        Self {
            dataset_rel: dataset_rel.into(),
            images,
            index,
        }
    }

    pub fn dataset_rel(&self) -> &str {
        &self.dataset_rel
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRecord> {
        self.images.iter()
    }

    pub fn image(&self, id: &ImageId) -> Result<&ImageRecord> {
        self.index
            .get(id)
            .map(|&position| &self.images[position])
            .ok_or_else(|| DatasetError::ImageNotFound(id.to_string()))
    }

    fn image_mut(&mut self, id: &ImageId) -> Result<&mut ImageRecord> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| DatasetError::ImageNotFound(id.to_string()))?;
        Ok(&mut self.images[position])
    }

    pub fn dirty_count(&self) -> usize {
        self.images.iter().filter(|image| image.is_dirty()).count()
    }

    pub fn get_tags(&self, id: &ImageId) -> Result<TagsView> {
        let image = self.image(id)?;
        Ok(TagsView {
            image_id: image.id.clone(),
            rel_path: image.rel_path.clone(),
            tags: image.current.clone(),
            is_dirty: image.is_dirty(),
            is_complete: image.complete,
        })
    }

    /// Apply one edit to one image. Failed operations leave the image untouched.
    pub fn stage(&mut self, id: &ImageId, op: &StageOp) -> Result<StageOutcome> {
        let image = self.image_mut(id)?;
        let changed = match op {
            StageOp::Add { tag } => add_tag(&mut image.current, &required_tag(tag)?),
            StageOp::Delete { tag } => delete_tag(&mut image.current, tag.trim()) > 0,
            StageOp::Edit {
                index,
                old_tag,
                new_tag,
            } => edit_tag(&mut image.current, *index, old_tag, &required_tag(new_tag)?)?,
            StageOp::Reorder { tags } => reorder_tags(&mut image.current, tags)?,
        };
        if changed {
            log::debug!("Staged {:?} on {}", op, image.rel_path);
        }
        Ok(StageOutcome {
            image_id: image.id.clone(),
            tags: image.current.clone(),
            is_dirty: image.is_dirty(),
            changed,
        })
    }

    pub fn stage_add(&mut self, id: &ImageId, tag: &str) -> Result<StageOutcome> {
        self.stage(id, &StageOp::Add { tag: tag.into() })
    }

    pub fn stage_delete(&mut self, id: &ImageId, tag: &str) -> Result<StageOutcome> {
        self.stage(id, &StageOp::Delete { tag: tag.into() })
    }

    pub fn stage_edit(
        &mut self,
        id: &ImageId,
        index: usize,
        old_tag: &str,
        new_tag: &str,
    ) -> Result<StageOutcome> {
        self.stage(
            id,
            &StageOp::Edit {
                index,
                old_tag: old_tag.into(),
                new_tag: new_tag.into(),
            },
        )
    }

    pub fn stage_reorder(&mut self, id: &ImageId, new_order: Vec<String>) -> Result<StageOutcome> {
        self.stage(id, &StageOp::Reorder { tags: new_order })
    }

    /// Apply one op to every image in scope; only images that changed are counted.
    pub fn stage_bulk(
        &mut self,
        scope: &BulkScope,
        op: &BulkOp,
        ctx: &ScopeContext<'_>,
    ) -> Result<BulkSummary> {
        let op = match op {
            BulkOp::Add { tag } => BulkOp::Add {
                tag: required_tag(tag)?,
            },
            BulkOp::Delete { tag } => BulkOp::Delete {
                tag: tag.trim().to_string(),
            },
            BulkOp::Replace { old_tag, new_tag } => BulkOp::Replace {
                old_tag: old_tag.trim().to_string(),
                new_tag: required_tag(new_tag)?,
            },
        };

        let targets = self.scope_positions(scope, ctx);
        let mut summary = BulkSummary::default();
        for position in targets {
            let tags = &mut self.images[position].current;
            let changed = match &op {
                BulkOp::Add { tag } => {
                    let added = add_tag(tags, tag);
                    summary.added += usize::from(added);
                    added
                }
                BulkOp::Delete { tag } => {
                    let removed = delete_tag(tags, tag) > 0;
                    summary.removed += usize::from(removed);
                    removed
                }
                BulkOp::Replace { old_tag, new_tag } => {
                    let replaced = replace_tag(tags, old_tag, new_tag);
                    summary.replaced += usize::from(replaced);
                    replaced
                }
            };
            summary.affected_images += usize::from(changed);
        }

        log::info!(
            "Bulk {:?}: {} images affected ({} added, {} removed, {} replaced)",
            op,
            summary.affected_images,
            summary.added,
            summary.removed,
            summary.replaced
        );
        Ok(summary)
    }

    fn scope_positions(&self, scope: &BulkScope, ctx: &ScopeContext<'_>) -> Vec<usize> {
        match scope {
            BulkScope::All => (0..self.images.len()).collect(),
            BulkScope::Filtered { filter } => self
                .images
                .iter()
                .enumerate()
                .filter(|(_, image)| filter.matches(image, ctx))
                .map(|(position, _)| position)
                .collect(),
            BulkScope::Selected { image_ids } => {
                let mut positions: Vec<usize> = image_ids
                    .iter()
                    .filter_map(|id| {
                        let position = self.index.get(id).copied();
                        if position.is_none() {
                            log::debug!("Skipping unknown image id {id} in bulk selection");
                        }
                        position
                    })
                    .collect();
                positions.sort_unstable();
                positions.dedup();
                positions
            }
        }
    }

    pub fn changes_summary(&self) -> ChangeSummary {
        let changes: Vec<_> = self
            .images
            .iter()
            .filter(|image| image.is_dirty())
            .map(ImageRecord::diff)
            .collect();
        ChangeSummary {
            dirty_count: changes.len(),
            changes,
        }
    }

    /// Write every dirty image. Failures are per image and never stop the loop.
    pub fn apply(&mut self, store: &dyn SidecarStore) -> ApplyReport {
        let mut report = ApplyReport::default();
        for image in self.images.iter_mut().filter(|image| image.is_dirty()) {
            let contents = serialize(&image.current);
            match store.write(&image.sidecar_path, &contents) {
                Ok(()) => {
                    image.original = image.current.clone();
                    report.written_files += 1;
                }
                Err(e) => {
                    let message = format!("Failed to write {}: {e}", image.sidecar_path.display());
                    log::warn!("{message}");
                    report.failures.push(ApplyFailure {
                        image_id: image.id.clone(),
                        rel_path: image.rel_path.clone(),
                        code: DatasetError::IoError(e).kind().as_str().to_string(),
                        message,
                    });
                }
            }
        }
        log::info!(
            "Applied changes: {} sidecars written, {} failures",
            report.written_files,
            report.failures.len()
        );
        report
    }

    /// Reset every image to its loaded tags. Returns how many were dirty.
    pub fn discard(&mut self) -> usize {
        let mut reset = 0;
        for image in &mut self.images {
            if image.is_dirty() {
                image.current = image.original.clone();
                reset += 1;
            }
        }
        log::info!("Discarded staged changes on {reset} images");
        reset
    }

    pub fn set_complete(&mut self, id: &ImageId, complete: bool) -> Result<TagsView> {
        self.image_mut(id)?.complete = complete;
        self.get_tags(id)
    }

    pub fn neighbors(&self, id: &ImageId) -> Result<Neighbors> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| DatasetError::ImageNotFound(id.to_string()))?;
        let previous = position
            .checked_sub(1)
            .map(|prev| self.images[prev].id.clone());
        let next = self.images.get(position + 1).map(|image| image.id.clone());
        Ok(Neighbors { previous, next })
    }

    pub fn hints(&self, id: &ImageId, ctx: &ScopeContext<'_>) -> Result<ImageHints> {
        let image = self.image(id)?;
        Ok(ctx.evaluator.evaluate(&image.current, ctx.undesired))
    }

    /// Distinct current tags with image counts, sorted by tag.
    pub fn tag_counts(&self, ctx: &ScopeContext<'_>) -> Vec<TagCount> {
        count_tags(self.images.iter(), ctx)
    }

    pub fn summary(&self, filter: &FilterCriteria, ctx: &ScopeContext<'_>) -> DatasetSummary {
        let selected: Vec<&ImageRecord> = self
            .images
            .iter()
            .filter(|image| filter.matches(image, ctx))
            .collect();

        let images = selected
            .iter()
            .map(|image| ImageSummary {
                image_id: image.id.clone(),
                filename: image.filename().to_string(),
                rel_path: image.rel_path.clone(),
                tag_count: image.current.len(),
                has_undesired: ctx.undesired.matches_any(&image.current),
                is_dirty: image.is_dirty(),
                is_complete: image.complete,
                hints: ctx.evaluator.evaluate(&image.current, ctx.undesired),
            })
            .collect();

        DatasetSummary {
            dataset_rel: self.dataset_rel.clone(),
            image_count: selected.len(),
            tags: count_tags(selected.iter().copied(), ctx),
            images,
        }
    }
}

fn count_tags<'a>(
    images: impl Iterator<Item = &'a ImageRecord>,
    ctx: &ScopeContext<'_>,
) -> Vec<TagCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for image in images {
        let mut seen = std::collections::HashSet::new();
        for tag in &image.current {
            if seen.insert(tag.as_str()) {
                *counts.entry(tag.as_str()).or_default() += 1;
            }
        }
    }
    counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
            is_undesired: ctx.undesired.contains(tag),
        })
        .collect()
}

fn required_tag(raw: &str) -> Result<String> {
    clean_tag(raw).ok_or_else(|| DatasetError::Validation("tag must not be empty".to_string()))
}

fn add_tag(tags: &mut Vec<String>, tag: &str) -> bool {
    if tags.iter().any(|present| present == tag) {
        return false;
    }
    tags.push(tag.to_string());
    true
}

fn delete_tag(tags: &mut Vec<String>, tag: &str) -> usize {
    let before = tags.len();
    tags.retain(|present| present != tag);
    before - tags.len()
}

fn replace_tag(tags: &mut [String], old_tag: &str, new_tag: &str) -> bool {
    if old_tag == new_tag {
        return false;
    }
    let mut replaced = false;
    for tag in tags.iter_mut().filter(|tag| tag.as_str() == old_tag) {
        *tag = new_tag.to_string();
        replaced = true;
    }
    replaced
}

fn edit_tag(tags: &mut [String], index: usize, old_tag: &str, new_tag: &str) -> Result<bool> {
    let found = tags.get(index);
    if found.map(String::as_str) != Some(old_tag.trim()) {
        return Err(DatasetError::Conflict {
            index,
            expected: old_tag.trim().to_string(),
            found: found.cloned(),
        });
    }
    if tags[index] == new_tag {
        return Ok(false);
    }
    tags[index] = new_tag.to_string();
    Ok(true)
}

fn reorder_tags(tags: &mut Vec<String>, proposed: &[String]) -> Result<bool> {
    let proposed: Vec<String> = proposed.iter().filter_map(|tag| clean_tag(tag)).collect();

    let mut expected = tags.clone();
    let mut candidate = proposed.clone();
    expected.sort_unstable();
    candidate.sort_unstable();
    if expected != candidate {
        return Err(DatasetError::Validation(
            "reorder must contain exactly the current tags".to_string(),
        ));
    }

    if *tags == proposed {
        return Ok(false);
    }
    *tags = proposed;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tagtidy_taxonomy::{HintEvaluator, Taxonomy, UndesiredTags};

    fn record(rel: &str, tags: &[&str]) -> ImageRecord {
        ImageRecord::new(
            rel,
            PathBuf::from("/dataset").join(rel).with_extension("txt"),
            tags.iter().map(|t| t.to_string()).collect(),
        )
    }

    fn snapshot(images: &[(&str, &[&str])]) -> DatasetSnapshot {
        DatasetSnapshot::new(
            "set",
            images.iter().map(|(rel, tags)| record(rel, tags)).collect(),
        )
    }

    fn id(rel: &str) -> ImageId {
        ImageId::from_rel_path(rel)
    }

    fn evaluator() -> HintEvaluator {
        HintEvaluator::new(Arc::new(Taxonomy::bundled().unwrap()))
    }

    /// Records writes; fails for paths containing `fail_on`.
    #[derive(Default)]
    struct MemoryStore {
        fail_on: Option<String>,
        written: Mutex<Vec<(PathBuf, String)>>,
    }

    impl SidecarStore for MemoryStore {
        fn read(&self, _path: &Path) -> io::Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
            if let Some(needle) = &self.fail_on {
                if path.to_string_lossy().contains(needle.as_str()) {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
                }
            }
            self.written
                .lock()
                .unwrap()
                .push((path.to_path_buf(), contents.to_string()));
            Ok(())
        }
    }

    #[test]
    fn add_is_idempotent_and_keeps_clean_state() {
        let mut snap = snapshot(&[("a.png", &["1girl", "solo"])]);
        let outcome = snap.stage_add(&id("a.png"), "solo").unwrap();
        assert!(!outcome.changed);
        assert!(!outcome.is_dirty);

        let outcome = snap.stage_add(&id("a.png"), "  smile ").unwrap();
        assert!(outcome.changed);
        assert!(outcome.is_dirty);
        assert_eq!(outcome.tags, vec!["1girl", "solo", "smile"]);
    }

    #[test]
    fn delete_removes_every_occurrence_and_ignores_absent() {
        let mut snap = snapshot(&[("a.png", &["smile", "1girl", "smile"])]);
        assert!(!snap.stage_delete(&id("a.png"), "frown").unwrap().changed);
        let outcome = snap.stage_delete(&id("a.png"), "smile").unwrap();
        assert_eq!(outcome.tags, vec!["1girl"]);
    }

    #[test]
    fn edit_detects_stale_position() {
        let mut snap = snapshot(&[("a.png", &["1girl", "smile"])]);
        let outcome = snap.stage_edit(&id("a.png"), 1, "smile", "grin").unwrap();
        assert_eq!(outcome.tags, vec!["1girl", "grin"]);

        let err = snap
            .stage_edit(&id("a.png"), 1, "smile", "frown")
            .unwrap_err();
        assert!(matches!(err, DatasetError::Conflict { index: 1, .. }));
        let err = snap.stage_edit(&id("a.png"), 5, "grin", "frown").unwrap_err();
        assert!(matches!(err, DatasetError::Conflict { found: None, .. }));
        assert_eq!(snap.get_tags(&id("a.png")).unwrap().tags, vec!["1girl", "grin"]);
    }

    #[test]
    fn empty_tags_are_rejected() {
        let mut snap = snapshot(&[("a.png", &["1girl"])]);
        let err = snap.stage_add(&id("a.png"), "   ").unwrap_err();
        assert!(matches!(err, DatasetError::Validation(_)));
        let err = snap.stage_edit(&id("a.png"), 0, "1girl", "").unwrap_err();
        assert!(matches!(err, DatasetError::Validation(_)));
    }

    #[test]
    fn reorder_requires_the_same_multiset() {
        let mut snap = snapshot(&[("a.png", &["a", "b", "b"])]);
        let outcome = snap
            .stage_reorder(&id("a.png"), vec!["b".into(), "a".into(), "b".into()])
            .unwrap();
        assert_eq!(outcome.tags, vec!["b", "a", "b"]);

        for bad in [vec!["a", "b"], vec!["a", "b", "c"], vec!["a", "a", "b"], vec!["b", "a", "B"]] {
            let err = snap
                .stage_reorder(&id("a.png"), bad.iter().map(|t| t.to_string()).collect())
                .unwrap_err();
            assert!(matches!(err, DatasetError::Validation(_)), "{bad:?}");
        }
        assert_eq!(snap.get_tags(&id("a.png")).unwrap().tags, vec!["b", "a", "b"]);
    }

    #[test]
    fn unknown_image_is_not_found() {
        let mut snap = snapshot(&[("a.png", &[])]);
        let err = snap.stage_add(&ImageId::from("nope"), "x").unwrap_err();
        assert!(matches!(err, DatasetError::ImageNotFound(_)));
    }

    #[test]
    fn bulk_replace_matches_whole_tags_only() {
        let mut snap = snapshot(&[
            ("a.png", &["1girl", "solo"]),
            ("b.png", &["1girls"]),
            ("c.png", &["1girl,solo"]),
            ("d.png", &["1Girl"]),
        ]);
        let evaluator = evaluator();
        let undesired = UndesiredTags::default();
        let ctx = ScopeContext {
            evaluator: &evaluator,
            undesired: &undesired,
        };

        let summary = snap
            .stage_bulk(
                &BulkScope::All,
                &BulkOp::Replace {
                    old_tag: "1girl".into(),
                    new_tag: "female_subject".into(),
                },
                &ctx,
            )
            .unwrap();
        assert_eq!(
            summary,
            BulkSummary {
                affected_images: 1,
                replaced: 1,
                ..Default::default()
            }
        );
        assert_eq!(
            snap.get_tags(&id("a.png")).unwrap().tags,
            vec!["female_subject", "solo"]
        );
        for untouched in ["b.png", "c.png", "d.png"] {
            assert!(!snap.get_tags(&id(untouched)).unwrap().is_dirty);
        }
    }

    #[test]
    fn bulk_counts_only_changed_images_in_scope() {
        let mut snap = snapshot(&[
            ("a.png", &["watermark"]),
            ("b.png", &[]),
            ("c.png", &["watermark", "smile"]),
        ]);
        let evaluator = evaluator();
        let undesired = UndesiredTags::new(["watermark"]);
        let ctx = ScopeContext {
            evaluator: &evaluator,
            undesired: &undesired,
        };

        let add = snap
            .stage_bulk(
                &BulkScope::Selected {
                    image_ids: vec![id("a.png"), id("b.png"), ImageId::from("ghost")],
                },
                &BulkOp::Add {
                    tag: "watermark".into(),
                },
                &ctx,
            )
            .unwrap();
        assert_eq!(add.affected_images, 1);
        assert_eq!(add.added, 1);

        let delete = snap
            .stage_bulk(
                &BulkScope::Filtered {
                    filter: FilterCriteria {
                        has_undesired: Some(true),
                        ..Default::default()
                    },
                },
                &BulkOp::Delete {
                    tag: "watermark".into(),
                },
                &ctx,
            )
            .unwrap();
        assert_eq!(delete.affected_images, 3);
        assert_eq!(snap.dirty_count(), 2);
    }

    #[test]
    fn changes_summary_lists_only_dirty_images() {
        let mut snap = snapshot(&[("a.png", &["a", "b"]), ("b.png", &["c"])]);
        snap.stage_reorder(&id("a.png"), vec!["b".into(), "a".into()])
            .unwrap();
        snap.stage_add(&id("a.png"), "d").unwrap();

        let summary = snap.changes_summary();
        assert_eq!(summary.dirty_count, 1);
        let diff = &summary.changes[0];
        assert_eq!(diff.rel_path, "a.png");
        assert_eq!(diff.added, vec!["d"]);
        assert!(diff.removed.is_empty());
        assert!(diff.reordered);
    }

    #[test]
    fn changes_summary_reports_moved_duplicates() {
        let mut snap = snapshot(&[("a.png", &["a", "b", "a"])]);
        snap.stage_reorder(&id("a.png"), vec!["a".into(), "a".into(), "b".into()])
            .unwrap();

        let summary = snap.changes_summary();
        assert_eq!(summary.dirty_count, 1);
        let diff = &summary.changes[0];
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert!(diff.reordered);
    }

    #[test]
    fn apply_writes_dirty_images_and_marks_them_clean() {
        let mut snap = snapshot(&[("a.png", &["a"]), ("b.png", &["b"]), ("c.png", &[])]);
        snap.stage_add(&id("a.png"), "x").unwrap();
        snap.stage_add(&id("c.png"), "y").unwrap();

        let store = MemoryStore::default();
        let report = snap.apply(&store);
        assert_eq!(report.written_files, 2);
        assert!(report.failures.is_empty());
        assert_eq!(snap.dirty_count(), 0);
        assert_eq!(
            *store.written.lock().unwrap(),
            vec![
                (PathBuf::from("/dataset/a.txt"), "a, x".to_string()),
                (PathBuf::from("/dataset/c.txt"), "y".to_string()),
            ]
        );
    }

    #[test]
    fn apply_reports_failures_per_image_and_keeps_them_dirty() {
        let mut snap = snapshot(&[("a.png", &[]), ("locked.png", &[]), ("z.png", &[])]);
        for rel in ["a.png", "locked.png", "z.png"] {
            snap.stage_add(&id(rel), "tag").unwrap();
        }

        let store = MemoryStore {
            fail_on: Some("locked".into()),
            ..Default::default()
        };
        let report = snap.apply(&store);
        assert_eq!(report.written_files, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].rel_path, "locked.png");
        assert_eq!(report.failures[0].code, "io_error");
        assert!(snap.get_tags(&id("locked.png")).unwrap().is_dirty);
        assert!(!snap.get_tags(&id("z.png")).unwrap().is_dirty);
    }

    #[test]
    fn apply_to_disk_survives_a_failed_rename() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        // A directory where the sidecar should go makes the rename fail.
        std::fs::create_dir_all(dir.path().join("b.txt/inner")).unwrap();
        let images = ["a", "b", "c"]
            .into_iter()
            .map(|stem| {
                ImageRecord::new(
                    format!("{stem}.png"),
                    dir.path().join(format!("{stem}.txt")),
                    vec!["old".to_string()],
                )
            })
            .collect();
        let mut snap = DatasetSnapshot::new("", images);
        for rel in ["a.png", "b.png", "c.png"] {
            snap.stage_add(&id(rel), "new").unwrap();
        }

        let report = snap.apply(&crate::sidecar::FsSidecarStore);
        assert_eq!(report.written_files, 2);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.rel_path, "b.png");
        assert_eq!(failure.code, "io_error");
        assert!(failure.message.starts_with("Failed to write "));
        assert!(failure.message.contains("b.txt: "));

        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "old, new"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("c.txt")).unwrap(),
            "old, new"
        );
        assert!(dir.path().join("b.txt/inner").is_dir());
        assert!(!dir.path().join("b.txt.tmp").exists());
        assert!(snap.get_tags(&id("b.png")).unwrap().is_dirty);
        assert!(!snap.get_tags(&id("a.png")).unwrap().is_dirty);
    }

    #[test]
    fn neighbors_follow_load_order() {
        let snap = snapshot(&[("a.png", &[]), ("b.png", &[]), ("c.png", &[])]);
        assert_eq!(
            snap.neighbors(&id("a.png")).unwrap(),
            Neighbors {
                previous: None,
                next: Some(id("b.png"))
            }
        );
        assert_eq!(
            snap.neighbors(&id("c.png")).unwrap(),
            Neighbors {
                previous: Some(id("b.png")),
                next: None
            }
        );
    }

    #[test]
    fn summary_filters_images_and_counts_tags() {
        let mut snap = snapshot(&[
            ("set/a.png", &["1girl", "watermark"]),
            ("set/b.png", &["1girl"]),
            ("other/c.png", &["1boy"]),
        ]);
        snap.set_complete(&id("set/b.png"), true).unwrap();
        let evaluator = evaluator();
        let undesired = UndesiredTags::new(["Watermark"]);
        let ctx = ScopeContext {
            evaluator: &evaluator,
            undesired: &undesired,
        };

        let summary = snap.summary(
            &FilterCriteria {
                filename_contains: Some("SET/".into()),
                ..Default::default()
            },
            &ctx,
        );
        assert_eq!(summary.image_count, 2);
        assert_eq!(
            summary.tags,
            vec![
                TagCount {
                    tag: "1girl".into(),
                    count: 2,
                    is_undesired: false
                },
                TagCount {
                    tag: "watermark".into(),
                    count: 1,
                    is_undesired: true
                },
            ]
        );
        assert!(summary.images[0].has_undesired);
        assert!(summary.images[1].is_complete);
        assert_eq!(summary.images[1].filename, "b.png");
    }

    fn tag_strategy() -> impl Strategy<Value = String> {
        proptest::sample::select(vec!["a", "b", "c", "smile", "1girl"]).prop_map(String::from)
    }

    fn op_strategy() -> impl Strategy<Value = StageOp> {
        prop_oneof![
            tag_strategy().prop_map(|tag| StageOp::Add { tag }),
            tag_strategy().prop_map(|tag| StageOp::Delete { tag }),
            (0usize..4, tag_strategy(), tag_strategy()).prop_map(|(index, old_tag, new_tag)| {
                StageOp::Edit {
                    index,
                    old_tag,
                    new_tag,
                }
            }),
            proptest::collection::vec(tag_strategy(), 0..4).prop_map(|tags| StageOp::Reorder { tags }),
        ]
    }

    proptest! {
        #[test]
        fn proptest_discard_restores_original(ops in proptest::collection::vec(op_strategy(), 0..24)) {
            let mut snap = snapshot(&[("a.png", &["1girl", "smile"]), ("b.png", &[])]);
            for (step, op) in ops.iter().enumerate() {
                let target = if step % 2 == 0 { id("a.png") } else { id("b.png") };
                let _ = snap.stage(&target, op);
            }
            snap.discard();
            prop_assert_eq!(snap.dirty_count(), 0);
            prop_assert_eq!(snap.get_tags(&id("a.png")).unwrap().tags, vec!["1girl", "smile"]);
            prop_assert!(snap.get_tags(&id("b.png")).unwrap().tags.is_empty());
        }

        #[test]
        fn proptest_failed_ops_leave_tags_untouched(op in op_strategy()) {
            let mut snap = snapshot(&[("a.png", &["a", "b"])]);
            if snap.stage(&id("a.png"), &op).is_err() {
                prop_assert_eq!(snap.get_tags(&id("a.png")).unwrap().tags, vec!["a", "b"]);
            }
        }
    }
}
