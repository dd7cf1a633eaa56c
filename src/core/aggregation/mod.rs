//! Candidate Aggregation
//!
//! Reduces a candidate set to one answer with a confidence and explanatory
//! metadata. Built-in strategies:
//!
//! - `MajorityVote`: largest group of equivalent answers wins
//! - `BestOfN`: highest-scored candidate wins
//! - `Weighted`: weighted combination of several strategies
//!
//! External strategies implement `Aggregator` and are wrapped with
//! `AggregationStrategy::Custom`.

pub mod best_of_n;
pub mod majority;
pub mod weighted;

pub use best_of_n::BestOfN;
pub use majority::MajorityVote;
pub use weighted::{LengthHeuristic, Weighted};

use crate::core::candidate::{Candidate, Metadata};
use crate::core::error::ConfigError;
use std::sync::Arc;

/// Output of an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Selected answer content
    pub answer: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// The candidate the answer was taken from, when there is one
    pub candidate: Option<Candidate>,
    /// Strategy-specific explanation
    pub metadata: Metadata,
}

/// Aggregation could not produce an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationError {
    /// The candidate set was empty
    NoCandidates,
}

impl AggregationError {
    pub fn reason(&self) -> &'static str {
        match self {
            AggregationError::NoCandidates => "no_candidates",
        }
    }
}

impl std::fmt::Display for AggregationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationError::NoCandidates => write!(f, "Cannot aggregate zero candidates"),
        }
    }
}

impl std::error::Error for AggregationError {}

/// Capability to reduce candidates to a single answer.
pub trait Aggregator: Send + Sync + std::fmt::Debug {
    /// Registry name of this strategy.
    fn name(&self) -> &str;

    /// Aggregate `candidates` into one answer.
    fn aggregate(&self, candidates: &[Candidate]) -> Result<Aggregation, AggregationError>;
}

/// Names accepted by `AggregationStrategy::from_name`.
pub const BUILTIN_STRATEGIES: [&str; 3] = ["majority_vote", "best_of_n", "weighted"];

/// Closed set of built-in strategies plus an extension point.
#[derive(Debug, Clone)]
pub enum AggregationStrategy {
    MajorityVote(MajorityVote),
    BestOfN(BestOfN),
    Weighted(Weighted),
    Custom(Arc<dyn Aggregator>),
}

impl Default for AggregationStrategy {
    fn default() -> Self {
        AggregationStrategy::MajorityVote(MajorityVote::new())
    }
}

impl AggregationStrategy {
    /// Resolve a built-in strategy by name.
    ///
    /// # Errors
    ///
    /// `ConfigError::AggregatorMustImplementAggregate` for any name outside
    /// `BUILTIN_STRATEGIES`.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name {
            "majority_vote" => Ok(AggregationStrategy::MajorityVote(MajorityVote::new())),
            "best_of_n" => Ok(AggregationStrategy::BestOfN(BestOfN::new())),
            "weighted" => Ok(AggregationStrategy::Weighted(Weighted::default())),
            other => Err(ConfigError::AggregatorMustImplementAggregate {
                name: other.to_string(),
            }),
        }
    }

    /// Wrap an external aggregator.
    pub fn custom(aggregator: Arc<dyn Aggregator>) -> Self {
        AggregationStrategy::Custom(aggregator)
    }

    fn inner(&self) -> &dyn Aggregator {
        match self {
            AggregationStrategy::MajorityVote(a) => a,
            AggregationStrategy::BestOfN(a) => a,
            AggregationStrategy::Weighted(a) => a,
            AggregationStrategy::Custom(a) => a.as_ref(),
        }
    }
}

impl Aggregator for AggregationStrategy {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn aggregate(&self, candidates: &[Candidate]) -> Result<Aggregation, AggregationError> {
        self.inner().aggregate(candidates)
    }
}

/// Fraction of `candidates` equivalent to `content` under `matcher`.
pub(crate) fn agreement_share(
    matcher: &dyn crate::core::matcher::CandidateMatcher,
    candidates: &[Candidate],
    content: &str,
) -> f64 {
    if candidates.is_empty() {
        return 0.0;
    }
    let key = matcher.canonicalize(content);
    let matching = candidates
        .iter()
        .filter(|c| matcher.canonicalize(c.content()) == key)
        .count();
    matching as f64 / candidates.len() as f64
}
