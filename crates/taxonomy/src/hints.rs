use crate::canonical::{canonicalize, dedupe_preserve};
use crate::graph::SignalValues;
use crate::loader::Taxonomy;
use crate::types::Severity;
use crate::undesired::UndesiredTags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// A category holding more distinct values than it allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardinalityViolation {
    pub category: String,
    pub count: usize,
    pub max: u32,
    pub values: Vec<String>,
}

/// Advisory hints for one image. Never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHints {
    pub missing_required: Vec<String>,
    pub possibly_missing: Vec<String>,
    pub not_required: Vec<String>,
    /// Tags as written in the TagSet.
    pub forbidden_present: Vec<String>,
    pub cardinality_violations: Vec<CardinalityViolation>,
    pub info: Vec<String>,
    pub undesired_present: Vec<String>,
    pub signals: SignalValues,
}

impl ImageHints {
    pub fn has_missing_required(&self) -> bool {
        !self.missing_required.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.missing_required.is_empty()
            && self.forbidden_present.is_empty()
            && self.cardinality_violations.is_empty()
    }
}

/// Computes hints against a validated [`Taxonomy`].
///
/// Only constructible from a loaded taxonomy, so an invalid one can never be
/// evaluated. Evaluation is pure: same tags in, same hints out.
#[derive(Debug, Clone)]
pub struct HintEvaluator {
    taxonomy: Arc<Taxonomy>,
}

#[derive(Default)]
struct Buckets {
    missing_required: Vec<String>,
    possibly_missing: Vec<String>,
    not_required: Vec<String>,
}

impl Buckets {
    fn route(&mut self, category: &str, severity: Severity) {
        let bucket = match severity {
            Severity::Error => &mut self.missing_required,
            Severity::Warning | Severity::Info => &mut self.possibly_missing,
            Severity::Ignore => &mut self.not_required,
        };
        bucket.push(category.to_string());
    }
}

impl HintEvaluator {
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self { taxonomy }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn evaluate(&self, tags: &[String], undesired: &UndesiredTags) -> ImageHints {
        self.evaluate_with_signals(tags, &BTreeMap::new(), undesired)
    }

    pub fn evaluate_with_signals(
        &self,
        tags: &[String],
        external: &BTreeMap<String, bool>,
        undesired: &UndesiredTags,
    ) -> ImageHints {
        let taxonomy = &*self.taxonomy;

        // canonical -> first spelling seen, so hints point at editable tags
        let mut spelled: HashMap<String, &str> = HashMap::new();
        let mut canonical_order = Vec::new();
        for tag in tags {
            let canonical = canonicalize(tag);
            if canonical.is_empty() || spelled.contains_key(&canonical) {
                continue;
            }
            spelled.insert(canonical.clone(), tag.as_str());
            canonical_order.push(canonical);
        }
        let present: HashSet<String> = canonical_order.iter().cloned().collect();

        let mut by_category: HashMap<&str, Vec<&str>> = HashMap::new();
        for canonical in &canonical_order {
            if let Some(category) = taxonomy.category_for_canonical(canonical) {
                by_category
                    .entry(category.id.as_str())
                    .or_default()
                    .push(spelled[canonical]);
            }
        }
        let count_of = |category: &str| by_category.get(category).map_or(0, Vec::len);

        let signals = taxonomy.signals.evaluate(&present, external);

        let mut buckets = Buckets::default();
        let mut forbidden = Vec::new();
        let mut required_mins: HashMap<&str, u32> = HashMap::new();
        let mut constraint_max: HashMap<&str, u32> = HashMap::new();
        let mut relaxed: HashSet<&str> = HashSet::new();
        let forbidden_severity = taxonomy.policy.defaults.forbidden;

        for constraint in taxonomy
            .constraints
            .iter()
            .filter(|c| c.when.matches(&signals))
        {
            for requirement in &constraint.require {
                let min = required_mins
                    .entry(requirement.category.as_str())
                    .or_insert(0);
                *min = (*min).max(requirement.min);
                if let Some(max) = requirement.max {
                    let limit = constraint_max
                        .entry(requirement.category.as_str())
                        .or_insert(max);
                    *limit = (*limit).min(max);
                }
            }

            let mut hits: Vec<String> = constraint
                .forbid_tags
                .iter()
                .filter_map(|canonical| spelled.get(canonical).map(|t| t.to_string()))
                .collect();
            for category in &constraint.forbid_categories {
                if let Some(values) = by_category.get(category.as_str()) {
                    hits.extend(values.iter().map(|v| v.to_string()));
                }
            }
            if forbidden_severity == Severity::Ignore {
                if !hits.is_empty() {
                    buckets.not_required.extend(constraint.forbid_categories.iter().cloned());
                }
            } else {
                forbidden.extend(hits);
            }

            relaxed.extend(constraint.relax.iter().map(String::as_str));
        }

        let mut violations = Vec::new();
        if taxonomy.policy.defaults.invalid != Severity::Ignore {
            for category in taxonomy.categories() {
                let Some(values) = by_category.get(category.id.as_str()) else {
                    continue;
                };
                let mut limit = category.max;
                if taxonomy.is_singleton(&category.id) {
                    limit = Some(limit.map_or(1, |max| max.min(1)));
                }
                if let Some(&max) = constraint_max.get(category.id.as_str()) {
                    limit = Some(limit.map_or(max, |current| current.min(max)));
                }
                if let Some(max) = limit {
                    if values.len() > max as usize {
                        violations.push(CardinalityViolation {
                            category: category.id.clone(),
                            count: values.len(),
                            max,
                            values: values.iter().map(|v| v.to_string()).collect(),
                        });
                    }
                }
            }
        }

        for category in taxonomy.categories() {
            let id = category.id.as_str();
            if !category.tier.is_governed() {
                continue;
            }
            let present_count = count_of(id);
            let fired = required_mins.get(id).copied();
            let is_relaxed = relaxed.contains(id);

            if is_relaxed {
                if present_count == 0 {
                    buckets.not_required.push(id.to_string());
                }
                continue;
            }

            // Gated only by signals nobody could resolve: stay silent rather than guess.
            if fired.is_none() {
                if let Some(gates) = taxonomy.gating_signals(id) {
                    let all_unknown = gates
                        .iter()
                        .all(|signal| signals.get(signal).copied().flatten().is_none());
                    if all_unknown {
                        continue;
                    }
                }
            }

            let required_min = category.min.max(fired.unwrap_or(0));
            let required = required_min > 0;
            let triggered = fired.is_some();
            if !(required || triggered || taxonomy.policy.has_missing_rule(id)) {
                continue;
            }

            let missing = if required {
                (present_count as u32) < required_min
            } else {
                present_count == 0
            };
            if !missing {
                continue;
            }

            if let Some(severity) = taxonomy.policy.missing_severity(id, &signals, required) {
                buckets.route(id, severity);
            }
        }

        let info = canonical_order
            .iter()
            .filter(|canonical| taxonomy.policy.tag_severity(canonical).is_some())
            .map(|canonical| spelled[canonical].to_string())
            .collect();

        ImageHints {
            missing_required: dedupe_preserve(buckets.missing_required),
            possibly_missing: dedupe_preserve(buckets.possibly_missing),
            not_required: dedupe_preserve(buckets.not_required),
            forbidden_present: dedupe_preserve(forbidden),
            cardinality_violations: violations,
            info,
            undesired_present: undesired.present_in(tags),
            signals,
        }
    }
}
