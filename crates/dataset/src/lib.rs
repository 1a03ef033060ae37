//! Dataset loading and staged tag editing.
//!
//! A dataset is a folder of images, each paired with a `.txt` sidecar holding
//! comma-separated tags. Loading reads every sidecar into a
//! [`DatasetSnapshot`]; edits stay in memory until [`DatasetManager::apply_changes`]
//! writes them back.
//!
//! ```text
//! PathResolver ──> ImageScanner ──> SidecarStore::read ──> normalizer::parse
//!                                                              │
//!                                                              ▼
//!                          DatasetManager ──owns──> DatasetSnapshot
//!                                                   (original | current)
//!                                                              │
//!                 stage / bulk / discard ◄──────────────────────┤
//!                 apply ──> normalizer::serialize ──> SidecarStore::write
//! ```

pub mod coordinator;
pub mod error;
pub mod filter;
pub mod model;
pub mod normalizer;
pub mod paths;
pub mod scanner;
pub mod sidecar;
pub mod staging;

pub use coordinator::{DatasetManager, LoadSummary, MAX_DATASET_IMAGES};
pub use error::{DatasetError, ErrorKind, Result};
pub use filter::{BulkOp, BulkScope, FilterCriteria, ScopeContext, StageOp};
pub use model::{
    ApplyFailure, ApplyReport, BulkSummary, ChangeSummary, ImageDiff, ImageId, ImageRecord,
    Neighbors, StageOutcome, TagCount, TagsView,
};
pub use paths::{PathResolver, RootedResolver};
pub use scanner::{ImageScanner, ScannedImage, SUPPORTED_EXTENSIONS};
pub use sidecar::{sidecar_path, FsSidecarStore, SidecarStore};
pub use staging::{DatasetSnapshot, DatasetSummary, ImageSummary};
