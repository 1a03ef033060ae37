use crate::model::{ImageId, ImageRecord};
use serde::{Deserialize, Deserializer, Serialize};
use tagtidy_taxonomy::{HintEvaluator, UndesiredTags};

/// Predicates over images; unset fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Case-insensitive substring of the relative path.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub filename_contains: Option<String>,
    /// Exact tag in the current TagSet.
    #[serde(default, deserialize_with = "blank_as_none")]
    pub has_tag: Option<String>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub has_undesired: Option<bool>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub has_missing_required: Option<bool>,
    #[serde(default, deserialize_with = "loose_bool")]
    pub is_complete: Option<bool>,
}

fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|raw| !raw.trim().is_empty()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseBool {
    Bool(bool),
    Text(String),
}

/// Query strings carry flags as text; a blank value leaves the flag unset.
fn loose_bool<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<LooseBool>::deserialize(deserializer)? {
        None => Ok(None),
        Some(LooseBool::Bool(flag)) => Ok(Some(flag)),
        Some(LooseBool::Text(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "true" | "yes" | "on" | "1" => Ok(Some(true)),
            "false" | "no" | "off" | "0" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean flag, got '{other}'"
            ))),
        },
    }
}

/// Shared read-only inputs needed to evaluate filters and hints.
#[derive(Clone, Copy)]
pub struct ScopeContext<'a> {
    pub evaluator: &'a HintEvaluator,
    pub undesired: &'a UndesiredTags,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, image: &ImageRecord, ctx: &ScopeContext<'_>) -> bool {
        if let Some(needle) = &self.filename_contains {
            if !image
                .rel_path()
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(tag) = &self.has_tag {
            if !image.tags().iter().any(|present| present == tag) {
                return false;
            }
        }
        if let Some(wanted) = self.has_undesired {
            if ctx.undesired.matches_any(image.tags()) != wanted {
                return false;
            }
        }
        if let Some(wanted) = self.is_complete {
            if image.is_complete() != wanted {
                return false;
            }
        }
        if let Some(wanted) = self.has_missing_required {
            // Operator-completed images are treated as having nothing missing.
            let missing = !image.is_complete()
                && ctx
                    .evaluator
                    .evaluate(image.tags(), ctx.undesired)
                    .has_missing_required();
            if missing != wanted {
                return false;
            }
        }
        true
    }
}

/// Which images a bulk operation touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BulkScope {
    All,
    Filtered {
        #[serde(default)]
        filter: FilterCriteria,
    },
    /// Unknown ids are skipped.
    Selected {
        #[serde(default)]
        image_ids: Vec<ImageId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkOp {
    Add { tag: String },
    Delete { tag: String },
    /// Exact, case-sensitive match on the whole tag.
    Replace { old_tag: String, new_tag: String },
}

/// A single-image edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StageOp {
    Add {
        tag: String,
    },
    Delete {
        tag: String,
    },
    Edit {
        index: usize,
        old_tag: String,
        new_tag: String,
    },
    Reorder {
        tags: Vec<String>,
    },
}
