//! Consensus measurement over a candidate batch.
//!
//! The agreement ratio is the size of the largest group of equivalent
//! candidates divided by the batch size. Adaptive self-consistency compares
//! it against the early-stop threshold after every batch.

use crate::core::candidate::{Candidate, Metadata};
use crate::core::matcher::{default_matcher, group_by_canonical, largest_group, CandidateMatcher};
use serde_json::Value;
use std::sync::Arc;

/// Consensus could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsensusError {
    /// The candidate set was empty
    NoCandidates,
}

impl ConsensusError {
    pub fn reason(&self) -> &'static str {
        "no_candidates"
    }
}

impl std::fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cannot check consensus of an empty candidate set")
    }
}

impl std::error::Error for ConsensusError {}

/// Agreement among a candidate batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusReport {
    /// Largest group size / total, in `(0, 1]`
    pub agreement_ratio: f64,
    /// `total`, `groups`, `largest_group`, `majority_answer`
    pub metadata: Metadata,
}

/// Computes agreement ratios using a `CandidateMatcher`.
#[derive(Debug, Clone)]
pub struct ConsensusChecker {
    matcher: Arc<dyn CandidateMatcher>,
}

impl Default for ConsensusChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusChecker {
    pub fn new() -> Self {
        Self {
            matcher: default_matcher(),
        }
    }

    pub fn with_matcher(matcher: Arc<dyn CandidateMatcher>) -> Self {
        Self { matcher }
    }

    /// Measure agreement among `candidates`.
    pub fn check_consensus(
        &self,
        candidates: &[Candidate],
    ) -> Result<ConsensusReport, ConsensusError> {
        if candidates.is_empty() {
            return Err(ConsensusError::NoCandidates);
        }

        let groups = group_by_canonical(
            self.matcher.as_ref(),
            candidates.iter().map(Candidate::content),
        );
        let top = largest_group(&groups).ok_or(ConsensusError::NoCandidates)?;
        let (_, members) = &groups[top];
        let total = candidates.len();

        let mut metadata = Metadata::new();
        metadata.insert("total".to_string(), Value::from(total));
        metadata.insert("groups".to_string(), Value::from(groups.len()));
        metadata.insert("largest_group".to_string(), Value::from(members.len()));
        metadata.insert(
            "majority_answer".to_string(),
            Value::from(candidates[members[0]].content()),
        );

        Ok(ConsensusReport {
            agreement_ratio: members.len() as f64 / total as f64,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(contents: &[&str]) -> Vec<Candidate> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Candidate::new(format!("c{}", i), *c))
            .collect()
    }

    #[test]
    fn test_empty_set_fails() {
        let err = ConsensusChecker::new().check_consensus(&[]).unwrap_err();
        assert_eq!(err, ConsensusError::NoCandidates);
        assert_eq!(err.reason(), "no_candidates");
    }

    #[test]
    fn test_single_candidate_is_unanimous() {
        let report = ConsensusChecker::new()
            .check_consensus(&batch(&["42"]))
            .unwrap();
        assert_eq!(report.agreement_ratio, 1.0);
    }

    #[test]
    fn test_ratio_uses_normalized_groups() {
        let report = ConsensusChecker::new()
            .check_consensus(&batch(&["Paris", " paris", "PARIS ", "Lyon"]))
            .unwrap();
        assert!((report.agreement_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(report.metadata["groups"], serde_json::json!(2));
        assert_eq!(report.metadata["majority_answer"], serde_json::json!("Paris"));
    }

    #[test]
    fn test_all_distinct() {
        let report = ConsensusChecker::new()
            .check_consensus(&batch(&["a", "b", "c", "d"]))
            .unwrap();
        assert!((report.agreement_ratio - 0.25).abs() < f64::EPSILON);
    }
}
