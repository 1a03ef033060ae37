//! Sidecar text <-> TagSet conversion.
//!
//! Only whitespace and separators are normalized: no case folding, no
//! deduplication, no sorting.

const SEPARATOR: &str = ", ";

/// Split on commas, trim, drop empty segments. Order and duplicates are kept.
pub fn parse(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join with `", "` after trimming each tag and dropping empties.
pub fn serialize<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|tag| tag.as_ref().trim())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Trimmed form of a tag coming from an edit request; `None` when blank.
pub(crate) fn clean_tag(raw: &str) -> Option<String> {
    let tag = raw.trim();
    (!tag.is_empty()).then(|| tag.to_string())
}
