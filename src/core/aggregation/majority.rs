//! Majority vote over normalized candidate contents.

use super::{Aggregation, AggregationError, Aggregator};
use crate::core::candidate::{Candidate, Metadata};
use crate::core::matcher::{default_matcher, group_by_canonical, largest_group, CandidateMatcher};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Picks the largest group of equivalent answers.
///
/// Confidence is the winning group's share of the batch. Ties go to the
/// group whose first member appeared earliest. The reported answer is the
/// first member's original (un-normalized) content.
#[derive(Debug, Clone)]
pub struct MajorityVote {
    matcher: Arc<dyn CandidateMatcher>,
}

impl Default for MajorityVote {
    fn default() -> Self {
        Self::new()
    }
}

impl MajorityVote {
    pub fn new() -> Self {
        Self {
            matcher: default_matcher(),
        }
    }

    pub fn with_matcher(matcher: Arc<dyn CandidateMatcher>) -> Self {
        Self { matcher }
    }
}

impl Aggregator for MajorityVote {
    fn name(&self) -> &str {
        "majority_vote"
    }

    fn aggregate(&self, candidates: &[Candidate]) -> Result<Aggregation, AggregationError> {
        if candidates.is_empty() {
            return Err(AggregationError::NoCandidates);
        }

        let groups = group_by_canonical(
            self.matcher.as_ref(),
            candidates.iter().map(Candidate::content),
        );
        let top = largest_group(&groups).ok_or(AggregationError::NoCandidates)?;
        let winner = &candidates[groups[top].1[0]];

        let distribution: Map<String, Value> = groups
            .iter()
            .map(|(label, members)| (label.clone(), Value::from(members.len())))
            .collect();

        let mut metadata = Metadata::new();
        metadata.insert("vote_distribution".to_string(), Value::Object(distribution));
        metadata.insert("total_votes".to_string(), Value::from(candidates.len()));
        metadata.insert("strategy".to_string(), Value::from(self.name()));

        Ok(Aggregation {
            answer: winner.content().to_string(),
            confidence: groups[top].1.len() as f64 / candidates.len() as f64,
            candidate: Some(winner.clone()),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(contents: &[&str]) -> Vec<Candidate> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Candidate::new(format!("c{}", i), *c))
            .collect()
    }

    #[test]
    fn test_empty_fails() {
        assert_eq!(
            MajorityVote::new().aggregate(&[]).unwrap_err(),
            AggregationError::NoCandidates
        );
    }

    #[test]
    fn test_majority_wins_with_share_confidence() {
        let result = MajorityVote::new()
            .aggregate(&batch(&["42", "41", " 42", "42"]))
            .unwrap();
        assert_eq!(result.answer, "42");
        assert!((result.confidence - 0.75).abs() < f64::EPSILON);
        assert_eq!(result.candidate.unwrap().id(), "c0");
    }

    #[test]
    fn test_vote_distribution_is_complete() {
        let result = MajorityVote::new()
            .aggregate(&batch(&["Yes", "no", "YES", "maybe"]))
            .unwrap();
        assert_eq!(
            result.metadata["vote_distribution"],
            json!({"yes": 2, "no": 1, "maybe": 1})
        );
        assert_eq!(result.metadata["total_votes"], json!(4));
    }

    #[test]
    fn test_tie_goes_to_first_seen() {
        let result = MajorityVote::new()
            .aggregate(&batch(&["b", "a", "a", "b"]))
            .unwrap();
        assert_eq!(result.answer, "b");
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
    }
}
