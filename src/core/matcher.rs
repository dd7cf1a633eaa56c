//! Candidate Matching
//!
//! Decides which candidates count as "the same answer" for consensus and
//! majority voting. The default `NormalizedMatcher` trims surrounding
//! whitespace and folds case, so `" Paris"` and `"paris"` share a group.
//!
//! Custom matchers (semantic, numeric, code-aware) plug in through the
//! `CandidateMatcher` trait.

use std::sync::Arc;

/// Groups candidate contents into equivalence classes.
///
/// Two contents are in the same class iff their canonical forms are equal.
/// Implementations must be `Send + Sync` so engines can share them across
/// tasks.
pub trait CandidateMatcher: Send + Sync + std::fmt::Debug {
    /// Canonical form used as the grouping key.
    fn canonicalize(&self, content: &str) -> String;

    /// Whether two contents belong to the same group.
    fn are_equivalent(&self, a: &str, b: &str) -> bool {
        self.canonicalize(a) == self.canonicalize(b)
    }

    /// Human-readable matcher name.
    fn matcher_type(&self) -> &str;
}

/// Case-insensitive, whitespace-trimmed matching.
#[derive(Debug, Clone, Default)]
pub struct NormalizedMatcher;

impl NormalizedMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl CandidateMatcher for NormalizedMatcher {
    fn canonicalize(&self, content: &str) -> String {
        content.trim().to_lowercase()
    }

    fn matcher_type(&self) -> &str {
        "normalized"
    }
}

/// The matcher used when none is configured.
pub fn default_matcher() -> Arc<dyn CandidateMatcher> {
    Arc::new(NormalizedMatcher::new())
}

/// Group `contents` by canonical form, preserving first-appearance order.
///
/// Returns `(canonical, member_indices)` pairs. Order is deterministic: the
/// group whose first member appears earliest comes first.
pub fn group_by_canonical<'a, I>(
    matcher: &dyn CandidateMatcher,
    contents: I,
) -> Vec<(String, Vec<usize>)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: Vec<(String, Vec<usize>)> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();

    for (i, content) in contents.into_iter().enumerate() {
        let key = matcher.canonicalize(content);
        match index.get(&key) {
            Some(&g) => groups[g].1.push(i),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }

    groups
}

/// Index of the largest group; the earliest group wins ties.
pub fn largest_group(groups: &[(String, Vec<usize>)]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, (_, members)) in groups.iter().enumerate() {
        match best {
            Some(b) if groups[b].1.len() >= members.len() => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_matcher_trims_and_folds_case() {
        let m = NormalizedMatcher::new();
        assert!(m.are_equivalent("  Paris ", "paris"));
        assert!(m.are_equivalent("YES", "yes"));
        assert!(!m.are_equivalent("4", "four"));
    }

    #[test]
    fn test_normalized_matcher_keeps_inner_whitespace() {
        let m = NormalizedMatcher::new();
        assert!(!m.are_equivalent("new york", "newyork"));
    }

    #[test]
    fn test_default_matcher_type() {
        assert_eq!(default_matcher().matcher_type(), "normalized");
    }

    #[test]
    fn test_group_by_canonical_preserves_order() {
        let m = NormalizedMatcher::new();
        let groups = group_by_canonical(&m, ["B", "a", "b", "A ", "c"]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], ("b".to_string(), vec![0, 2]));
        assert_eq!(groups[1], ("a".to_string(), vec![1, 3]));
        assert_eq!(groups[2], ("c".to_string(), vec![4]));
    }

    #[test]
    fn test_largest_group_earliest_wins_tie() {
        let m = NormalizedMatcher::new();
        let groups = group_by_canonical(&m, ["x", "y", "y", "x"]);
        assert_eq!(largest_group(&groups), Some(0));
        assert_eq!(largest_group(&[]), None);
    }
}
