//! # Tag Tidy Taxonomy
//!
//! Category taxonomy, applicability rule graph and per-image hint evaluation.
//!
//! ## Architecture
//!
//! ```text
//! taxonomy.json + applicability_graph.json (+ policy.json)
//!     │
//!     ├──> Loader (validation, fails with TaxonomyError)
//!     │      ├─ Categories: tier, cardinality, vocabulary
//!     │      ├─ Signal graph (petgraph DAG, topological order)
//!     │      └─ Constraints: require / forbid / relax per signal
//!     │
//!     └──> Hint Evaluator (pure, per image)
//!            ├─ Resolve signals (three-valued)
//!            ├─ Apply constraints whose signal is known
//!            └─ missing_required / possibly_missing / not_required /
//!               forbidden_present / cardinality_violations
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use tagtidy_taxonomy::{HintEvaluator, Taxonomy, UndesiredTags};
//!
//! let evaluator = HintEvaluator::new(Arc::new(Taxonomy::bundled().unwrap()));
//! let tags = vec!["from behind".to_string(), "close-up".to_string()];
//! let hints = evaluator.evaluate(&tags, &UndesiredTags::default());
//! assert!(!hints.missing_required.contains(&"expression".to_string()));
//! ```

mod canonical;
mod error;
mod graph;
mod hints;
mod loader;
mod types;
mod undesired;

pub use canonical::canonicalize;
pub use error::{Result, TaxonomyError};
pub use graph::{SignalGraph, SignalValues};
pub use hints::{CardinalityViolation, HintEvaluator, ImageHints};
pub use loader::Taxonomy;
pub use types::{
    Category, FreeformPolicy, HintOptions, Severity, TaxonomyStats, TaxonomyVersions, Tier,
};
pub use undesired::UndesiredTags;
