//! Best-of-N selection by candidate score.

use super::{agreement_share, Aggregation, AggregationError, Aggregator};
use crate::core::candidate::{Candidate, Metadata};
use crate::core::matcher::{default_matcher, CandidateMatcher};
use serde_json::Value;
use std::sync::Arc;

/// Picks the candidate with the highest score.
///
/// Unscored candidates never beat scored ones; the first candidate wins
/// ties. When nothing carries a score, the first candidate is returned
/// instead of failing, with its agreement share as confidence.
#[derive(Debug, Clone)]
pub struct BestOfN {
    matcher: Arc<dyn CandidateMatcher>,
}

impl Default for BestOfN {
    fn default() -> Self {
        Self::new()
    }
}

impl BestOfN {
    pub fn new() -> Self {
        Self {
            matcher: default_matcher(),
        }
    }

    pub fn with_matcher(matcher: Arc<dyn CandidateMatcher>) -> Self {
        Self { matcher }
    }
}

impl Aggregator for BestOfN {
    fn name(&self) -> &str {
        "best_of_n"
    }

    fn aggregate(&self, candidates: &[Candidate]) -> Result<Aggregation, AggregationError> {
        let first = candidates.first().ok_or(AggregationError::NoCandidates)?;

        let mut best: Option<(&Candidate, f64)> = None;
        let mut scored = 0usize;
        for candidate in candidates {
            let Some(score) = candidate.score().filter(|s| !s.is_nan()) else {
                continue;
            };
            scored += 1;
            match best {
                Some((_, top)) if top >= score => {}
                _ => best = Some((candidate, score)),
            }
        }

        let mut metadata = Metadata::new();
        metadata.insert("strategy".to_string(), Value::from(self.name()));
        metadata.insert("scored_candidates".to_string(), Value::from(scored));

        let (winner, confidence) = match best {
            Some((candidate, score)) => {
                metadata.insert("selection".to_string(), Value::from("max_score"));
                metadata.insert("best_score".to_string(), Value::from(score));
                (candidate, score.clamp(0.0, 1.0))
            }
            None => {
                metadata.insert(
                    "selection".to_string(),
                    Value::from("first_candidate_fallback"),
                );
                (
                    first,
                    agreement_share(self.matcher.as_ref(), candidates, first.content()),
                )
            }
        };

        Ok(Aggregation {
            answer: winner.content().to_string(),
            confidence,
            candidate: Some(winner.clone()),
            metadata,
        })
    }
}
