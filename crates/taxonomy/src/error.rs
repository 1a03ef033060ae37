use thiserror::Error;

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Failed to parse {document} document: {source}")]
    Parse {
        document: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Category '{category}' has unknown tier '{tier}' (expected hard, soft or ungoverned)")]
    InvalidTier { category: String, tier: String },

    #[error("Hard category '{0}' must list at least one allowed value")]
    EmptyAllowedValues(String),

    #[error("Category '{0}' is defined more than once")]
    DuplicateCategory(String),

    #[error("Value '{value}' is claimed by both '{first}' and '{second}'")]
    DuplicateValue {
        value: String,
        first: String,
        second: String,
    },

    #[error("Category '{category}' has cardinality min {min} greater than max {max}")]
    InvalidCardinality { category: String, min: u32, max: u32 },

    #[error("{context} references unknown category '{category}'")]
    UnknownCategory { context: String, category: String },

    #[error("{context} references unknown signal '{signal}'")]
    UnknownSignal { context: String, signal: String },

    #[error("Signal definitions form a cycle through '{0}'")]
    CyclicSignals(String),

    #[error("Unknown consistency rule '{0}'")]
    UnknownRule(String),

    #[error("Policy targets {document} version {expected} but {actual} is loaded")]
    VersionMismatch {
        document: &'static str,
        expected: String,
        actual: String,
    },
}
