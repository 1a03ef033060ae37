use crate::canonical::canonicalize;
use crate::error::{Result, TaxonomyError};
use crate::types::{Derivation, EvidenceDocument, SignalDocument};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Resolved signal values. `None` means the signal is unknown for this image.
pub type SignalValues = BTreeMap<String, Option<bool>>;

/// Runtime form of a derivation with tag arguments already canonicalized.
#[derive(Debug, Clone)]
enum Expr {
    AnyTag(Vec<String>),
    Evidence(Evidence),
    Signal(String),
    Not(Box<Expr>),
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

#[derive(Debug, Clone, Default)]
struct Evidence {
    when_true: Vec<String>,
    when_false: Vec<String>,
}

impl Evidence {
    fn from_document(doc: &EvidenceDocument) -> Self {
        Self::new(&doc.when_true, &doc.when_false)
    }

    fn new(when_true: &[String], when_false: &[String]) -> Self {
        Self {
            when_true: when_true.iter().map(|t| canonicalize(t)).collect(),
            when_false: when_false.iter().map(|t| canonicalize(t)).collect(),
        }
    }

    /// Negative evidence wins; no evidence at all leaves the signal unknown.
    fn resolve(&self, tags: &HashSet<String>) -> Option<bool> {
        if self.when_false.iter().any(|t| tags.contains(t)) {
            return Some(false);
        }
        if self.when_true.iter().any(|t| tags.contains(t)) {
            return Some(true);
        }
        None
    }
}

#[derive(Debug, Clone)]
enum SignalKind {
    Derived(Expr),
    External(Evidence),
}

#[derive(Debug, Clone)]
struct SignalNode {
    id: String,
    kind: SignalKind,
}

/// Derived/external signals as an explicit dependency DAG.
///
/// Edges point from a dependency to the signal that reads it, so a
/// topological order is a valid evaluation order. The order is computed once
/// at load time; cycles are rejected there.
#[derive(Debug, Clone)]
pub struct SignalGraph {
    graph: DiGraph<SignalNode, ()>,
    index: HashMap<String, NodeIndex>,
    order: Vec<NodeIndex>,
}

impl SignalGraph {
    pub(crate) fn build(signals: &BTreeMap<String, SignalDocument>) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for (id, doc) in signals {
            let kind = match doc {
                SignalDocument::Derived { derivation } => {
                    SignalKind::Derived(compile(derivation))
                }
                SignalDocument::External { asserted_by } => SignalKind::External(
                    asserted_by
                        .as_ref()
                        .map(Evidence::from_document)
                        .unwrap_or_default(),
                ),
            };
            let idx = graph.add_node(SignalNode {
                id: id.clone(),
                kind,
            });
            index.insert(id.clone(), idx);
        }

        let mut edges = Vec::new();
        for idx in graph.node_indices() {
            let node = &graph[idx];
            let SignalKind::Derived(expr) = &node.kind else {
                continue;
            };
            let mut deps = Vec::new();
            collect_dependencies(expr, &mut deps);
            for dep in deps {
                let Some(&from) = index.get(&dep) else {
                    return Err(TaxonomyError::UnknownSignal {
                        context: format!("Derivation of signal '{}'", node.id),
                        signal: dep,
                    });
                };
                edges.push((from, idx));
            }
        }
        for (from, to) in edges {
            graph.add_edge(from, to, ());
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| TaxonomyError::CyclicSignals(graph[cycle.node_id()].id.clone()))?;

        log::debug!(
            "Built signal graph: {} signals, {} dependencies",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            index,
            order,
        })
    }

    pub fn contains(&self, signal: &str) -> bool {
        self.index.contains_key(signal)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn is_external(&self, signal: &str) -> bool {
        self.index
            .get(signal)
            .is_some_and(|&idx| matches!(self.graph[idx].kind, SignalKind::External(_)))
    }

    /// Signal ids in evaluation order.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .map(|&idx| self.graph[idx].id.as_str())
            .collect()
    }

    /// Resolve every signal against a set of canonical tags.
    ///
    /// `external` carries caller-known values for perceptual signals; they take
    /// precedence over tag evidence.
    pub fn evaluate(
        &self,
        tags: &HashSet<String>,
        external: &BTreeMap<String, bool>,
    ) -> SignalValues {
        let mut values = SignalValues::new();
        for &idx in &self.order {
            let node = &self.graph[idx];
            let value = match &node.kind {
                SignalKind::External(evidence) => external
                    .get(&node.id)
                    .copied()
                    .or_else(|| evidence.resolve(tags)),
                SignalKind::Derived(expr) => eval(expr, tags, &values),
            };
            values.insert(node.id.clone(), value);
        }
        values
    }
}

fn compile(derivation: &Derivation) -> Expr {
    match derivation {
        Derivation::TagPresent { tag } => Expr::AnyTag(vec![canonicalize(tag)]),
        Derivation::AnyTag { tags } => Expr::AnyTag(tags.iter().map(|t| canonicalize(t)).collect()),
        Derivation::Evidence {
            when_true,
            when_false,
        } => Expr::Evidence(Evidence::new(when_true, when_false)),
        Derivation::Signal { signal } => Expr::Signal(signal.clone()),
        Derivation::Not { of } => Expr::Not(Box::new(compile(of))),
        Derivation::All { of } => Expr::All(of.iter().map(compile).collect()),
        Derivation::Any { of } => Expr::Any(of.iter().map(compile).collect()),
    }
}

fn collect_dependencies(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Signal(signal) => out.push(signal.clone()),
        Expr::Not(inner) => collect_dependencies(inner, out),
        Expr::All(items) | Expr::Any(items) => {
            for item in items {
                collect_dependencies(item, out);
            }
        }
        Expr::AnyTag(_) | Expr::Evidence(_) => {}
    }
}

// Kleene three-valued logic: unknown only collapses when another operand decides.
fn eval(expr: &Expr, tags: &HashSet<String>, resolved: &SignalValues) -> Option<bool> {
    match expr {
        Expr::AnyTag(candidates) => Some(candidates.iter().any(|t| tags.contains(t))),
        Expr::Evidence(evidence) => evidence.resolve(tags),
        Expr::Signal(signal) => resolved.get(signal).copied().flatten(),
        Expr::Not(inner) => eval(inner, tags, resolved).map(|v| !v),
        Expr::All(items) => {
            let mut unknown = false;
            for item in items {
                match eval(item, tags, resolved) {
                    Some(false) => return Some(false),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown {
                None
            } else {
                Some(true)
            }
        }
        Expr::Any(items) => {
            let mut unknown = false;
            for item in items {
                match eval(item, tags, resolved) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(json: &str) -> BTreeMap<String, SignalDocument> {
        serde_json::from_str(json).unwrap()
    }

    fn tags(items: &[&str]) -> HashSet<String> {
        items.iter().map(|t| canonicalize(t)).collect()
    }

    #[test]
    fn dependencies_evaluate_before_dependents() {
        let graph = SignalGraph::build(&signals(
            r#"{
                "a_face_visible": {"type": "derived", "derivation": {"op": "not", "of": {"op": "signal", "signal": "z_from_behind"}}},
                "z_from_behind": {"type": "derived", "derivation": {"op": "tag_present", "tag": "from behind"}}
            }"#,
        ))
        .unwrap();

        assert_eq!(
            graph.evaluation_order(),
            vec!["z_from_behind", "a_face_visible"]
        );
        let values = graph.evaluate(&tags(&["From Behind"]), &BTreeMap::new());
        assert_eq!(values["z_from_behind"], Some(true));
        assert_eq!(values["a_face_visible"], Some(false));
    }

    #[test]
    fn cycles_are_rejected_at_build_time() {
        let err = SignalGraph::build(&signals(
            r#"{
                "a": {"type": "derived", "derivation": {"op": "signal", "signal": "b"}},
                "b": {"type": "derived", "derivation": {"op": "not", "of": {"op": "signal", "signal": "a"}}}
            }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, TaxonomyError::CyclicSignals(_)));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let err = SignalGraph::build(&signals(
            r#"{"a": {"type": "derived", "derivation": {"op": "signal", "signal": "missing"}}}"#,
        ))
        .unwrap_err();
        assert!(matches!(err, TaxonomyError::UnknownSignal { signal, .. } if signal == "missing"));
    }

    #[test]
    fn external_signals_stay_unknown_without_evidence() {
        let graph = SignalGraph::build(&signals(
            r#"{
                "lower_body": {"type": "external", "asserted_by": {"when_true": ["full body"], "when_false": ["portrait"]}},
                "grounded": {"type": "derived", "derivation": {"op": "all", "of": [
                    {"op": "signal", "signal": "lower_body"},
                    {"op": "any_tag", "tags": ["standing", "sitting"]}
                ]}}
            }"#,
        ))
        .unwrap();

        let unknown = graph.evaluate(&tags(&["standing"]), &BTreeMap::new());
        assert_eq!(unknown["lower_body"], None);
        assert_eq!(unknown["grounded"], None);

        let asserted = graph.evaluate(&tags(&["full body", "standing"]), &BTreeMap::new());
        assert_eq!(asserted["grounded"], Some(true));

        // A definite false operand decides an AND even when the other side is unknown.
        let decided = graph.evaluate(&tags(&["kneeling"]), &BTreeMap::new());
        assert_eq!(decided["grounded"], Some(false));

        let mut external = BTreeMap::new();
        external.insert("lower_body".to_string(), true);
        let overridden = graph.evaluate(&tags(&["portrait"]), &external);
        assert_eq!(overridden["lower_body"], Some(true));
    }
}
