use std::collections::HashSet;

/// Canonical form used to match tags against taxonomy values.
///
/// Lowercases, treats `-` and `_` as spaces and collapses runs of whitespace,
/// so `Close-Up`, `close_up` and `close  up` all resolve to `close up`.
/// Stored tags are never rewritten with this form.
pub fn canonicalize(tag: &str) -> String {
    tag.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn dedupe_preserve(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
