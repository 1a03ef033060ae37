use crate::error::{DatasetError, Result};
use crate::filter::{BulkOp, BulkScope, FilterCriteria, ScopeContext, StageOp};
use crate::model::{
    ApplyReport, BulkSummary, ChangeSummary, ImageId, ImageRecord, Neighbors, StageOutcome,
    TagCount, TagsView,
};
use crate::normalizer::parse;
use crate::paths::PathResolver;
use crate::scanner::ImageScanner;
use crate::sidecar::{sidecar_path, SidecarStore};
use crate::staging::{DatasetSnapshot, DatasetSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tagtidy_taxonomy::{HintEvaluator, HintOptions, ImageHints, UndesiredTags};

/// Upper bound on images per loaded dataset.
pub const MAX_DATASET_IMAGES: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub dataset_rel: String,
    pub image_count: usize,
    pub tag_total_unique: usize,
    pub tags_summary: Vec<TagCount>,
    pub warnings: Vec<String>,
}

/// Owns the single active [`DatasetSnapshot`] and its collaborators.
///
/// Construct one per process (or per test) and hand it to request handlers;
/// there is no ambient global dataset.
pub struct DatasetManager {
    resolver: Arc<dyn PathResolver>,
    store: Arc<dyn SidecarStore>,
    evaluator: HintEvaluator,
    undesired: UndesiredTags,
    snapshot: Option<DatasetSnapshot>,
}

impl DatasetManager {
    pub fn new(
        resolver: Arc<dyn PathResolver>,
        store: Arc<dyn SidecarStore>,
        evaluator: HintEvaluator,
    ) -> Self {
        Self {
            resolver,
            store,
            evaluator,
            undesired: UndesiredTags::default(),
            snapshot: None,
        }
    }

    pub fn with_undesired(mut self, undesired: UndesiredTags) -> Self {
        self.undesired = undesired;
        self
    }

    pub fn undesired(&self) -> &UndesiredTags {
        &self.undesired
    }

    pub fn evaluator(&self) -> &HintEvaluator {
        &self.evaluator
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Result<&DatasetSnapshot> {
        self.snapshot.as_ref().ok_or(DatasetError::NoDataset)
    }

    fn parts_mut(&mut self) -> Result<(&mut DatasetSnapshot, ScopeContext<'_>)> {
        let snapshot = self.snapshot.as_mut().ok_or(DatasetError::NoDataset)?;
        let ctx = ScopeContext {
            evaluator: &self.evaluator,
            undesired: &self.undesired,
        };
        Ok((snapshot, ctx))
    }

    fn context(&self) -> ScopeContext<'_> {
        ScopeContext {
            evaluator: &self.evaluator,
            undesired: &self.undesired,
        }
    }

    /// Replace the active snapshot with the dataset at `rel`.
    ///
    /// Any failure leaves the previous snapshot in place. Unsaved edits in the
    /// replaced snapshot are lost; the summary carries a warning when that
    /// happens.
    pub fn load_dataset(&mut self, rel: &str) -> Result<LoadSummary> {
        let snapshot = self.read_dataset(rel)?;
        let mut warnings = self.duplicate_sidecar_warnings(&snapshot);

        if let Some(previous) = &self.snapshot {
            let dirty = previous.dirty_count();
            if dirty > 0 {
                log::warn!(
                    "Replacing dataset '{}' with {dirty} unsaved images",
                    previous.dataset_rel()
                );
                warnings.push(format!(
                    "Discarded unsaved changes on {dirty} images from '{}'",
                    previous.dataset_rel()
                ));
            }
        }

        let tags_summary = snapshot.tag_counts(&self.context());
        let summary = LoadSummary {
            dataset_rel: snapshot.dataset_rel().to_string(),
            image_count: snapshot.len(),
            tag_total_unique: tags_summary.len(),
            tags_summary,
            warnings,
        };
        log::info!(
            "Loaded dataset '{}': {} images, {} unique tags",
            summary.dataset_rel,
            summary.image_count,
            summary.tag_total_unique
        );
        self.snapshot = Some(snapshot);
        Ok(summary)
    }

    /// Build a snapshot for `rel` without touching the active one.
    pub fn read_dataset(&self, rel: &str) -> Result<DatasetSnapshot> {
        let rel = normalize_rel(rel);
        let folder = self.resolver.resolve(&rel)?;
        if !folder.exists() {
            return Err(DatasetError::FolderNotFound(display_rel(&rel)));
        }
        if !folder.is_dir() {
            return Err(DatasetError::InvalidPath(format!(
                "'{}' is not a folder",
                display_rel(&rel)
            )));
        }

        let scanned = ImageScanner::new(&folder).scan();
        if scanned.is_empty() {
            return Err(DatasetError::EmptyDataset(display_rel(&rel)));
        }
        if scanned.len() > MAX_DATASET_IMAGES {
            return Err(DatasetError::DatasetTooLarge {
                count: scanned.len(),
                limit: MAX_DATASET_IMAGES,
            });
        }

        let mut images = Vec::with_capacity(scanned.len());
        for image in scanned {
            let sidecar = sidecar_path(&image.abs_path);
            let tags = match self.store.read(&sidecar)? {
                Some(raw) => parse(&raw),
                None => {
                    log::debug!("No sidecar for {}", image.rel_path);
                    Vec::new()
                }
            };
            images.push(ImageRecord::new(image.rel_path, sidecar, tags));
        }
        Ok(DatasetSnapshot::new(rel, images))
    }

    fn duplicate_sidecar_warnings(&self, snapshot: &DatasetSnapshot) -> Vec<String> {
        let mut owners: HashMap<&std::path::Path, Vec<&str>> = HashMap::new();
        for image in snapshot.images() {
            owners
                .entry(image.sidecar_path())
                .or_default()
                .push(image.rel_path());
        }
        let mut warnings: Vec<String> = owners
            .into_values()
            .filter(|images| images.len() > 1)
            .map(|images| format!("Images {} share one sidecar file", images.join(", ")))
            .collect();
        warnings.sort();
        warnings
    }

    /// Drop the active snapshot, returning it.
    pub fn unload(&mut self) -> Option<DatasetSnapshot> {
        let previous = self.snapshot.take();
        if let Some(snapshot) = &previous {
            log::info!("Unloaded dataset '{}'", snapshot.dataset_rel());
        }
        previous
    }

    pub fn get_tags(&self, id: &ImageId) -> Result<TagsView> {
        self.snapshot()?.get_tags(id)
    }

    pub fn stage_op(&mut self, id: &ImageId, op: &StageOp) -> Result<StageOutcome> {
        self.snapshot
            .as_mut()
            .ok_or(DatasetError::NoDataset)?
            .stage(id, op)
    }

    pub fn bulk_op(&mut self, scope: &BulkScope, op: &BulkOp) -> Result<BulkSummary> {
        let (snapshot, ctx) = self.parts_mut()?;
        snapshot.stage_bulk(scope, op, &ctx)
    }

    pub fn get_changes(&self) -> Result<ChangeSummary> {
        Ok(self.snapshot()?.changes_summary())
    }

    pub fn apply_changes(&mut self) -> Result<ApplyReport> {
        let store = Arc::clone(&self.store);
        let snapshot = self.snapshot.as_mut().ok_or(DatasetError::NoDataset)?;
        Ok(snapshot.apply(store.as_ref()))
    }

    /// Returns how many images were reset.
    pub fn discard_changes(&mut self) -> Result<usize> {
        Ok(self
            .snapshot
            .as_mut()
            .ok_or(DatasetError::NoDataset)?
            .discard())
    }

    pub fn get_hints(&self, id: &ImageId) -> Result<ImageHints> {
        self.snapshot()?.hints(id, &self.context())
    }

    pub fn set_complete(&mut self, id: &ImageId, complete: bool) -> Result<TagsView> {
        self.snapshot
            .as_mut()
            .ok_or(DatasetError::NoDataset)?
            .set_complete(id, complete)
    }

    pub fn neighbors(&self, id: &ImageId) -> Result<Neighbors> {
        self.snapshot()?.neighbors(id)
    }

    pub fn dataset_summary(&self, filter: &FilterCriteria) -> Result<DatasetSummary> {
        Ok(self.snapshot()?.summary(filter, &self.context()))
    }

    pub fn hint_options(&self, category: &str) -> HintOptions {
        self.evaluator.taxonomy().hint_options(category)
    }
}

// Only trailing separators go; a leading one stays for the resolver to reject.
fn normalize_rel(rel: &str) -> String {
    let rel = rel.trim().replace('\\', "/");
    let trimmed = rel.trim_end_matches('/');
    if trimmed.is_empty() {
        rel.clone()
    } else {
        trimmed.to_string()
    }
}

fn display_rel(rel: &str) -> String {
    if rel.is_empty() {
        ".".to_string()
    } else {
        rel.to_string()
    }
}
