use crate::canonical::{canonicalize, dedupe_preserve};
use crate::error::{Result, TaxonomyError};
use crate::graph::{SignalGraph, SignalValues};
use crate::types::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

const BUNDLED_TAXONOMY: &str = include_str!("../data/taxonomy.v1.json");
const BUNDLED_GRAPH: &str = include_str!("../data/applicability_graph.v1.json");
const BUNDLED_POLICY: &str = include_str!("../data/policy.v1.json");

const SINGLETON_RULE: &str = "no_more_than_one_value_each";

#[derive(Debug, Clone)]
pub(crate) struct Condition {
    pub signal: String,
    pub equals: bool,
}

impl Condition {
    /// Unknown signals never match, in either direction.
    pub fn matches(&self, signals: &SignalValues) -> bool {
        signals.get(&self.signal).copied().flatten() == Some(self.equals)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Requirement {
    pub category: String,
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone)]
pub(crate) struct Constraint {
    pub when: Condition,
    pub require: Vec<Requirement>,
    /// Canonical forms.
    pub forbid_tags: Vec<String>,
    pub forbid_categories: Vec<String>,
    pub relax: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct Policy {
    pub defaults: PolicyDefaults,
    pub categories: BTreeMap<String, CategoryPolicy>,
    /// Keyed by canonical tag.
    pub tags: HashMap<String, Severity>,
}

impl Policy {
    fn permissive() -> Self {
        Self {
            defaults: PolicyDefaults::default(),
            categories: BTreeMap::new(),
            tags: HashMap::new(),
        }
    }

    pub fn has_missing_rule(&self, category: &str) -> bool {
        self.categories
            .get(category)
            .is_some_and(|policy| policy.missing.is_some())
    }

    fn signal_allows_missing(&self, category: &str, signals: &SignalValues) -> bool {
        let Some(policy) = self.categories.get(category) else {
            return true;
        };
        let is_true = |signal: &str| signals.get(signal).copied().flatten() == Some(true);
        if let Some(only_when) = &policy.only_when_signal {
            return is_true(only_when);
        }
        !policy.unless_signal.iter().any(|signal| is_true(signal))
    }

    pub fn missing_severity(
        &self,
        category: &str,
        signals: &SignalValues,
        required: bool,
    ) -> Option<Severity> {
        if !self.signal_allows_missing(category, signals) {
            return Some(Severity::Ignore);
        }
        let explicit = self
            .categories
            .get(category)
            .and_then(|policy| policy.missing);
        explicit.or(required.then_some(self.defaults.missing_required))
    }

    pub fn tag_severity(&self, canonical: &str) -> Option<Severity> {
        self.tags.get(canonical).copied()
    }
}

/// Validated, immutable taxonomy plus applicability graph.
///
/// Built once at process start and shared read-only by every evaluation;
/// there is no mutation API.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    versions: TaxonomyVersions,
    categories: Vec<Category>,
    category_index: HashMap<String, usize>,
    /// Canonical value -> category position.
    value_index: HashMap<String, usize>,
    ungoverned_allowed: HashSet<String>,
    singletons: HashSet<String>,
    pub(crate) signals: SignalGraph,
    pub(crate) constraints: Vec<Constraint>,
    /// Category -> signals whose constraints require or relax it.
    gates: HashMap<String, BTreeSet<String>>,
    pub(crate) policy: Policy,
}

impl Taxonomy {
    /// Load taxonomy and graph with default severities.
    pub fn load(taxonomy_source: &str, graph_source: &str) -> Result<Self> {
        Self::build(taxonomy_source, graph_source, None)
    }

    /// Load taxonomy, graph and a webapp policy whose versions must match.
    pub fn load_with_policy(
        taxonomy_source: &str,
        graph_source: &str,
        policy_source: &str,
    ) -> Result<Self> {
        Self::build(taxonomy_source, graph_source, Some(policy_source))
    }

    /// The v1 documents compiled into the binary.
    pub fn bundled() -> Result<Self> {
        Self::load_with_policy(BUNDLED_TAXONOMY, BUNDLED_GRAPH, BUNDLED_POLICY)
    }

    /// Read documents from disk; any missing path falls back to the bundled document.
    pub fn from_paths(
        taxonomy: Option<&Path>,
        graph: Option<&Path>,
        policy: Option<&Path>,
    ) -> Result<Self> {
        let taxonomy_source = read_or_bundled(taxonomy, BUNDLED_TAXONOMY)?;
        let graph_source = read_or_bundled(graph, BUNDLED_GRAPH)?;
        let policy_source = read_or_bundled(policy, BUNDLED_POLICY)?;
        Self::load_with_policy(&taxonomy_source, &graph_source, &policy_source)
    }

    fn build(taxonomy_source: &str, graph_source: &str, policy_source: Option<&str>) -> Result<Self> {
        let taxonomy_doc: TaxonomyDocument =
            serde_json::from_str(taxonomy_source).map_err(|source| TaxonomyError::Parse {
                document: "taxonomy",
                source,
            })?;
        let graph_doc: GraphDocument =
            serde_json::from_str(graph_source).map_err(|source| TaxonomyError::Parse {
                document: "graph",
                source,
            })?;

        let mut categories: Vec<Category> = Vec::with_capacity(taxonomy_doc.categories.len());
        let mut category_index = HashMap::new();
        let mut value_index: HashMap<String, usize> = HashMap::new();

        for doc in &taxonomy_doc.categories {
            let tier = Tier::parse(&doc.tier).ok_or_else(|| TaxonomyError::InvalidTier {
                category: doc.id.clone(),
                tier: doc.tier.clone(),
            })?;
            if tier == Tier::Hard && doc.allowed_values.is_empty() {
                return Err(TaxonomyError::EmptyAllowedValues(doc.id.clone()));
            }
            if category_index.contains_key(&doc.id) {
                return Err(TaxonomyError::DuplicateCategory(doc.id.clone()));
            }

            let cardinality = doc.cardinality.clone().unwrap_or_default();
            let max = match (cardinality.max, tier) {
                (Some(max), _) => Some(max),
                (None, Tier::Ungoverned) => None,
                (None, _) => Some(1),
            };
            if let Some(max) = max {
                if cardinality.min > max {
                    return Err(TaxonomyError::InvalidCardinality {
                        category: doc.id.clone(),
                        min: cardinality.min,
                        max,
                    });
                }
            }

            let position = categories.len();
            for value in doc.allowed_values.iter().chain(&doc.preferred_values) {
                let canonical = canonicalize(value);
                match value_index.get(&canonical) {
                    Some(&owner) if owner != position => {
                        return Err(TaxonomyError::DuplicateValue {
                            value: value.clone(),
                            first: categories[owner].id.clone(),
                            second: doc.id.clone(),
                        });
                    }
                    _ => {
                        value_index.insert(canonical, position);
                    }
                }
            }

            category_index.insert(doc.id.clone(), position);
            categories.push(Category {
                id: doc.id.clone(),
                tier,
                min: cardinality.min,
                max,
                allowed_values: doc.allowed_values.clone(),
                preferred_values: doc.preferred_values.clone(),
                freeform: FreeformPolicy {
                    allowed: doc.freeform.allowed,
                    keywords: doc
                        .freeform
                        .keywords
                        .iter()
                        .map(|k| canonicalize(k))
                        .collect(),
                },
            });
        }

        let ensure_category = |context: String, category: &str| -> Result<()> {
            if category_index.contains_key(category) {
                Ok(())
            } else {
                Err(TaxonomyError::UnknownCategory {
                    context,
                    category: category.to_string(),
                })
            }
        };

        let signals = SignalGraph::build(&graph_doc.signals)?;

        let mut singletons = HashSet::new();
        for check in &graph_doc.consistency_checks {
            if check.rule != SINGLETON_RULE {
                return Err(TaxonomyError::UnknownRule(check.rule.clone()));
            }
            for category in &check.categories {
                ensure_category(format!("Consistency check '{}'", check.rule), category)?;
                singletons.insert(category.clone());
            }
        }

        let mut constraints = Vec::with_capacity(graph_doc.constraints.len());
        let mut gates: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (position, doc) in graph_doc.constraints.iter().enumerate() {
            let label = doc
                .id
                .clone()
                .unwrap_or_else(|| format!("#{position}"));
            let context = format!("Constraint '{label}'");
            if !signals.contains(&doc.when.signal) {
                return Err(TaxonomyError::UnknownSignal {
                    context,
                    signal: doc.when.signal.clone(),
                });
            }
            for requirement in &doc.require {
                ensure_category(context.clone(), &requirement.category)?;
                if let Some(max) = requirement.max {
                    if requirement.min > max {
                        return Err(TaxonomyError::InvalidCardinality {
                            category: requirement.category.clone(),
                            min: requirement.min,
                            max,
                        });
                    }
                }
            }
            for category in doc.forbid_categories.iter().chain(&doc.relax) {
                ensure_category(context.clone(), category)?;
            }
            for category in doc
                .require
                .iter()
                .map(|r| &r.category)
                .chain(&doc.relax)
            {
                gates
                    .entry(category.clone())
                    .or_default()
                    .insert(doc.when.signal.clone());
            }
            constraints.push(Constraint {
                when: Condition {
                    signal: doc.when.signal.clone(),
                    equals: doc.when.equals,
                },
                require: doc
                    .require
                    .iter()
                    .map(|r| Requirement {
                        category: r.category.clone(),
                        min: r.min,
                        max: r.max,
                    })
                    .collect(),
                forbid_tags: doc.forbid_tags.iter().map(|t| canonicalize(t)).collect(),
                forbid_categories: doc.forbid_categories.clone(),
                relax: doc.relax.clone(),
            });
        }

        let taxonomy_version = version_string(&taxonomy_doc.taxonomy_version);
        let graph_version = version_string(&graph_doc.graph_version);

        let (policy, policy_version) = match policy_source {
            None => (Policy::permissive(), "default".to_string()),
            Some(source) => {
                let doc: PolicyDocument =
                    serde_json::from_str(source).map_err(|source| TaxonomyError::Parse {
                        document: "policy",
                        source,
                    })?;
                let expected_taxonomy = version_string(&doc.taxonomy_version);
                if expected_taxonomy != taxonomy_version {
                    return Err(TaxonomyError::VersionMismatch {
                        document: "taxonomy",
                        expected: expected_taxonomy,
                        actual: taxonomy_version,
                    });
                }
                let expected_graph = version_string(&doc.graph_version);
                if expected_graph != graph_version {
                    return Err(TaxonomyError::VersionMismatch {
                        document: "graph",
                        expected: expected_graph,
                        actual: graph_version,
                    });
                }
                for (category, rule) in &doc.category_policy {
                    let context = format!("Policy for '{category}'");
                    ensure_category(context.clone(), category)?;
                    for signal in rule.only_when_signal.iter().chain(&rule.unless_signal) {
                        if !signals.contains(signal) {
                            return Err(TaxonomyError::UnknownSignal {
                                context: context.clone(),
                                signal: signal.clone(),
                            });
                        }
                    }
                }
                let policy = Policy {
                    defaults: doc.defaults.clone(),
                    categories: doc.category_policy.clone(),
                    tags: doc
                        .tag_policy
                        .iter()
                        .map(|(tag, rule)| (canonicalize(tag), rule.severity))
                        .collect(),
                };
                (policy, version_string(&doc.policy_version))
            }
        };

        let ungoverned_allowed = taxonomy_doc
            .ungoverned_allowed_tags
            .iter()
            .map(|t| canonicalize(t))
            .collect();

        log::info!(
            "Loaded taxonomy v{taxonomy_version} / graph v{graph_version}: {} categories, {} signals, {} constraints",
            categories.len(),
            signals.len(),
            constraints.len()
        );

        Ok(Self {
            versions: TaxonomyVersions {
                taxonomy: taxonomy_version,
                graph: graph_version,
                policy: policy_version,
            },
            categories,
            category_index,
            value_index,
            ungoverned_allowed,
            singletons,
            signals,
            constraints,
            gates,
            policy,
        })
    }

    pub fn versions(&self) -> &TaxonomyVersions {
        &self.versions
    }

    pub fn stats(&self) -> TaxonomyStats {
        TaxonomyStats {
            categories: self.categories.len(),
            signals: self.signals.len(),
            constraints: self.constraints.len(),
            governed_values: self.value_index.len(),
        }
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.category_index.get(id).map(|&idx| &self.categories[idx])
    }

    pub fn signal_graph(&self) -> &SignalGraph {
        &self.signals
    }

    pub(crate) fn is_singleton(&self, category: &str) -> bool {
        self.singletons.contains(category)
    }

    pub(crate) fn gating_signals(&self, category: &str) -> Option<&BTreeSet<String>> {
        self.gates.get(category)
    }

    /// Category for an already-canonical tag: exact vocabulary first, then
    /// freeform keywords of soft categories.
    pub(crate) fn category_for_canonical(&self, canonical: &str) -> Option<&Category> {
        if let Some(&idx) = self.value_index.get(canonical) {
            return Some(&self.categories[idx]);
        }
        if self.ungoverned_allowed.contains(canonical) {
            return None;
        }
        self.categories.iter().find(|category| {
            category.freeform.allowed
                && category
                    .freeform
                    .keywords
                    .iter()
                    .any(|keyword| canonical.split(' ').any(|word| word == keyword))
        })
    }

    pub fn category_for_tag(&self, tag: &str) -> Option<&Category> {
        self.category_for_canonical(&canonicalize(tag))
    }

    /// Group tags by category, values canonical and distinct per category.
    pub fn categorize(&self, tags: &[String]) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for tag in tags {
            let canonical = canonicalize(tag);
            if canonical.is_empty() {
                continue;
            }
            if let Some(category) = self.category_for_canonical(&canonical) {
                let values = grouped.entry(category.id.clone()).or_default();
                if !values.contains(&canonical) {
                    values.push(canonical);
                }
            }
        }
        grouped
    }

    /// Values to offer when the operator fills a hinted category.
    pub fn hint_options(&self, category_id: &str) -> HintOptions {
        let Some(category) = self.category(category_id) else {
            return HintOptions {
                category: category_id.to_string(),
                options: Vec::new(),
                allows_freeform: false,
            };
        };
        let options = dedupe_preserve(
            category
                .preferred_values
                .iter()
                .chain(&category.allowed_values)
                .cloned()
                .collect(),
        );
        HintOptions {
            category: category.id.clone(),
            options,
            allows_freeform: category.freeform.allowed,
        }
    }
}

fn read_or_bundled(path: Option<&Path>, bundled: &str) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|source| TaxonomyError::Read {
            path: path.display().to_string(),
            source,
        }),
        None => Ok(bundled.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GRAPH: &str = r#"{"graph_version": 1, "signals": {}}"#;

    fn taxonomy_with(categories: &str) -> String {
        format!(r#"{{"taxonomy_version": 1, "categories": {categories}}}"#)
    }

    #[test]
    fn bundled_documents_load() {
        let taxonomy = Taxonomy::bundled().unwrap();
        assert_eq!(taxonomy.versions().taxonomy, "1");
        assert_eq!(taxonomy.versions().graph, "1");
        assert!(taxonomy.category("expression").is_some());
        assert!(taxonomy.signal_graph().contains("face_visible"));
    }

    #[test]
    fn rejects_unknown_tier_naming_category() {
        let doc = taxonomy_with(r#"[{"id": "pose", "tier": "medium", "allowed_values": ["standing"]}]"#);
        let err = Taxonomy::load(&doc, GRAPH).unwrap_err();
        assert!(matches!(err, TaxonomyError::InvalidTier { ref category, .. } if category == "pose"));
        assert!(err.to_string().contains("pose"));
    }

    #[test]
    fn rejects_hard_category_without_values() {
        let doc = taxonomy_with(r#"[{"id": "gaze", "tier": "hard"}]"#);
        let err = Taxonomy::load(&doc, GRAPH).unwrap_err();
        assert!(matches!(err, TaxonomyError::EmptyAllowedValues(ref id) if id == "gaze"));
    }

    #[test]
    fn soft_and_ungoverned_may_omit_values() {
        let doc = taxonomy_with(
            r#"[{"id": "mood", "tier": "soft"}, {"id": "misc", "tier": "ungoverned"}]"#,
        );
        let taxonomy = Taxonomy::load(&doc, GRAPH).unwrap();
        assert_eq!(taxonomy.category("mood").unwrap().max, Some(1));
        assert_eq!(taxonomy.category("misc").unwrap().max, None);
    }

    #[test]
    fn rejects_graph_reference_to_unknown_category() {
        let doc = taxonomy_with(r#"[{"id": "gaze", "tier": "hard", "allowed_values": ["looking up"]}]"#);
        let graph = r#"{
            "graph_version": 1,
            "signals": {"face": {"type": "external"}},
            "constraints": [{"id": "face-needs-expression", "when": {"signal": "face"}, "require": [{"category": "expression", "min": 1}]}]
        }"#;
        let err = Taxonomy::load(&doc, graph).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("face-needs-expression"), "{message}");
        assert!(message.contains("expression"), "{message}");
    }

    #[test]
    fn rejects_value_shared_by_two_categories() {
        let doc = taxonomy_with(
            r#"[
                {"id": "a", "tier": "hard", "allowed_values": ["Close-Up"]},
                {"id": "b", "tier": "hard", "allowed_values": ["close up"]}
            ]"#,
        );
        let err = Taxonomy::load(&doc, GRAPH).unwrap_err();
        assert!(matches!(err, TaxonomyError::DuplicateValue { .. }));
    }

    #[test]
    fn policy_version_must_match() {
        let doc = taxonomy_with(r#"[]"#);
        let policy = r#"{"policy_version": 1, "taxonomy_version": 2, "graph_version": 1}"#;
        let err = Taxonomy::load_with_policy(&doc, GRAPH, policy).unwrap_err();
        assert!(matches!(err, TaxonomyError::VersionMismatch { document: "taxonomy", .. }));
    }

    #[test]
    fn categorize_groups_canonical_values() {
        let taxonomy = Taxonomy::bundled().unwrap();
        let grouped = taxonomy.categorize(&[
            "Full Body".to_string(),
            "from behind".to_string(),
            "smile".to_string(),
            "closed eyes".to_string(),
            "arms crossed".to_string(),
            "raised hand".to_string(),
        ]);
        assert_eq!(grouped["framing"], vec!["full body".to_string()]);
        assert_eq!(grouped["view_angle"], vec!["from behind".to_string()]);
        assert_eq!(grouped["expression"], vec!["smile".to_string()]);
        assert_eq!(grouped["eyes_state"], vec!["closed eyes".to_string()]);
        assert_eq!(
            grouped["arm_hand_position"],
            vec!["arms crossed".to_string(), "raised hand".to_string()]
        );
    }

    #[test]
    fn category_for_tag_folds_spelling_and_reports_cardinality() {
        let taxonomy = Taxonomy::bundled().unwrap();
        let view = taxonomy.category_for_tag("Front-View").unwrap();
        assert_eq!(view.id, "view_angle");
        assert!(!view.allows_multiple());

        let arms = taxonomy.category_for_tag("raised hand").unwrap();
        assert_eq!(arms.id, "arm_hand_position");
        assert!(arms.allows_multiple());

        assert!(taxonomy.category_for_tag("red scarf").is_none());
    }

    #[test]
    fn hint_options_list_preferred_first() {
        let taxonomy = Taxonomy::bundled().unwrap();
        let options = taxonomy.hint_options("expression");
        assert!(!options.options.is_empty());
        assert_eq!(options.options[0], "smile");
        let unknown = taxonomy.hint_options("nope");
        assert!(unknown.options.is_empty());
        assert!(!unknown.allows_freeform);
    }
}
