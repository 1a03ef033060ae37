use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DatasetError>;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Invalid operation: {0}")]
    Validation(String),

    #[error("Tag at position {index} is no longer '{expected}' (found {found:?}); reload and retry")]
    Conflict {
        index: usize,
        expected: String,
        found: Option<String>,
    },

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    #[error("No dataset loaded")]
    NoDataset,

    #[error("No images found in '{0}'")]
    EmptyDataset(String),

    #[error("Dataset has {count} images, exceeding the {limit} image limit")]
    DatasetTooLarge { count: usize, limit: usize },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Taxonomy(#[from] tagtidy_taxonomy::TaxonomyError),
}

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    Conflict,
    NotFound,
    NoDataset,
    EmptyDataset,
    DatasetTooLarge,
    InvalidPath,
    IoError,
    TaxonomyError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::NoDataset => "no_dataset",
            Self::EmptyDataset => "empty_dataset",
            Self::DatasetTooLarge => "dataset_too_large",
            Self::InvalidPath => "invalid_path",
            Self::IoError => "io_error",
            Self::TaxonomyError => "taxonomy_error",
        }
    }
}

impl DatasetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::ImageNotFound(_) | Self::FolderNotFound(_) => ErrorKind::NotFound,
            Self::NoDataset => ErrorKind::NoDataset,
            Self::EmptyDataset(_) => ErrorKind::EmptyDataset,
            Self::DatasetTooLarge { .. } => ErrorKind::DatasetTooLarge,
            Self::InvalidPath(_) => ErrorKind::InvalidPath,
            Self::IoError(_) => ErrorKind::IoError,
            Self::Taxonomy(_) => ErrorKind::TaxonomyError,
        }
    }
}
