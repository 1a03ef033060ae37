use std::collections::HashSet;

/// Read-only set of tags the operator wants flagged.
///
/// Owned and persisted elsewhere; the core only consults it. Matching is
/// case-insensitive on the trimmed tag.
#[derive(Debug, Clone, Default)]
pub struct UndesiredTags {
    tags: Vec<String>,
    lowered: HashSet<String>,
}

impl UndesiredTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::default();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if tag.is_empty() {
                continue;
            }
            if set.lowered.insert(tag.to_lowercase()) {
                set.tags.push(tag.to_string());
            }
        }
        set
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.lowered.contains(&tag.trim().to_lowercase())
    }

    pub fn matches_any(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.contains(tag))
    }

    /// Present tags that are undesired, in TagSet order, without repeats.
    pub fn present_in(&self, tags: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        tags.iter()
            .filter(|tag| self.contains(tag) && seen.insert(tag.as_str()))
            .cloned()
            .collect()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_ignores_case_and_padding() {
        let undesired = UndesiredTags::new(["Watermark", " watermark ", "", "signature"]);
        assert_eq!(undesired.len(), 2);
        assert!(undesired.contains("WATERMARK"));
        assert!(!undesired.contains("water"));

        let tags = vec![
            "solo".to_string(),
            "watermark".to_string(),
            "Signature".to_string(),
            "watermark".to_string(),
        ];
        assert!(undesired.matches_any(&tags));
        assert_eq!(
            undesired.present_in(&tags),
            vec!["watermark".to_string(), "Signature".to_string()]
        );
    }
}
