use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Governance strictness of a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Closed vocabulary, single value unless the category says otherwise.
    Hard,
    /// Preferred vocabulary, may accept freeform values.
    Soft,
    /// Recognized but never counted or required.
    Ungoverned,
}

impl Tier {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hard" => Some(Self::Hard),
            "soft" => Some(Self::Soft),
            "ungoverned" => Some(Self::Ungoverned),
            _ => None,
        }
    }

    pub fn is_governed(self) -> bool {
        !matches!(self, Self::Ungoverned)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeformPolicy {
    #[serde(default)]
    pub allowed: bool,

    /// Substrings that route an unknown tag into this category.
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// A category as exposed to the rest of the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Category {
    pub id: String,
    pub tier: Tier,
    pub min: u32,
    /// `None` means unbounded.
    pub max: Option<u32>,
    pub allowed_values: Vec<String>,
    pub preferred_values: Vec<String>,
    pub freeform: FreeformPolicy,
}

impl Category {
    pub fn allows_multiple(&self) -> bool {
        self.max.map_or(true, |max| max > 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyVersions {
    pub taxonomy: String,
    pub graph: String,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyStats {
    pub categories: usize,
    pub signals: usize,
    pub constraints: usize,
    pub governed_values: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HintOptions {
    pub category: String,
    pub options: Vec<String>,
    pub allows_freeform: bool,
}

// ---------------------------------------------------------------------------
// On-disk documents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TaxonomyDocument {
    pub taxonomy_version: serde_json::Value,
    #[serde(default)]
    pub categories: Vec<CategoryDocument>,
    #[serde(default)]
    pub ungoverned_allowed_tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CategoryDocument {
    pub id: String,
    pub tier: String,
    #[serde(default)]
    pub cardinality: Option<CardinalityDocument>,
    #[serde(default)]
    pub allowed_values: Vec<String>,
    #[serde(default)]
    pub preferred_values: Vec<String>,
    #[serde(default)]
    pub freeform: FreeformPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CardinalityDocument {
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphDocument {
    pub graph_version: serde_json::Value,
    #[serde(default)]
    pub signals: BTreeMap<String, SignalDocument>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDocument>,
    #[serde(default)]
    pub consistency_checks: Vec<ConsistencyCheckDocument>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum SignalDocument {
    Derived {
        derivation: Derivation,
    },
    /// Perceptual fact; only known when supplied by the caller or asserted by tags.
    External {
        #[serde(default)]
        asserted_by: Option<EvidenceDocument>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct EvidenceDocument {
    #[serde(default)]
    pub when_true: Vec<String>,
    #[serde(default)]
    pub when_false: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum Derivation {
    TagPresent {
        tag: String,
    },
    AnyTag {
        tags: Vec<String>,
    },
    Evidence {
        #[serde(default)]
        when_true: Vec<String>,
        #[serde(default)]
        when_false: Vec<String>,
    },
    Signal {
        signal: String,
    },
    Not {
        of: Box<Derivation>,
    },
    All {
        of: Vec<Derivation>,
    },
    Any {
        of: Vec<Derivation>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConstraintDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub when: ConditionDocument,
    #[serde(default)]
    pub require: Vec<RequirementDocument>,
    #[serde(default)]
    pub forbid_tags: Vec<String>,
    #[serde(default)]
    pub forbid_categories: Vec<String>,
    #[serde(default)]
    pub relax: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConditionDocument {
    pub signal: String,
    #[serde(default = "default_true")]
    pub equals: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RequirementDocument {
    pub category: String,
    #[serde(default)]
    pub min: u32,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ConsistencyCheckDocument {
    pub rule: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PolicyDocument {
    pub policy_version: serde_json::Value,
    pub taxonomy_version: serde_json::Value,
    pub graph_version: serde_json::Value,
    #[serde(default)]
    pub defaults: PolicyDefaults,
    #[serde(default)]
    pub category_policy: BTreeMap<String, CategoryPolicy>,
    #[serde(default)]
    pub tag_policy: BTreeMap<String, TagPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct PolicyDefaults {
    #[serde(default = "default_error")]
    pub missing_required: Severity,
    #[serde(default = "default_error")]
    pub forbidden: Severity,
    #[serde(default = "default_error")]
    pub invalid: Severity,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            missing_required: Severity::Error,
            forbidden: Severity::Error,
            invalid: Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct CategoryPolicy {
    #[serde(default)]
    pub missing: Option<Severity>,
    #[serde(default)]
    pub only_when_signal: Option<String>,
    #[serde(default)]
    pub unless_signal: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TagPolicy {
    pub severity: Severity,
}

fn default_true() -> bool {
    true
}

fn default_error() -> Severity {
    Severity::Error
}

/// Versions are opaque: numbers and strings are both displayed verbatim.
pub(crate) fn version_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Null => "unversioned".to_string(),
        other => other.to_string(),
    }
}
