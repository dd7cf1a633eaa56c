//! Weighted combination of aggregation strategies.
//!
//! Each component strategy votes for its own answer with
//! `weight * confidence`. Votes are pooled per normalized answer and the
//! answer with the highest pooled score wins:
//!
//! ```text
//! score(a)    = Σ weight_i * confidence_i   over components choosing a
//! confidence  = score(winner) / Σ weight_i
//! ```

use super::{agreement_share, Aggregation, AggregationError, Aggregator, BestOfN, MajorityVote};
use crate::core::candidate::{Candidate, Metadata};
use crate::core::error::ConfigError;
use crate::core::matcher::{default_matcher, CandidateMatcher};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Default weight of the majority-vote component.
pub const DEFAULT_MAJORITY_WEIGHT: f64 = 0.5;
/// Default weight of the best-of-n component.
pub const DEFAULT_BEST_OF_N_WEIGHT: f64 = 0.3;
/// Default weight of the length heuristic component.
pub const DEFAULT_LENGTH_WEIGHT: f64 = 0.2;

/// Picks the candidate of median content length.
///
/// Very short answers tend to be truncated and very long ones tend to
/// wander; the median is a cheap guard against both. Confidence is the
/// chosen answer's agreement share.
#[derive(Debug, Clone)]
pub struct LengthHeuristic {
    matcher: Arc<dyn CandidateMatcher>,
}

impl Default for LengthHeuristic {
    fn default() -> Self {
        Self {
            matcher: default_matcher(),
        }
    }
}

impl Aggregator for LengthHeuristic {
    fn name(&self) -> &str {
        "length"
    }

    fn aggregate(&self, candidates: &[Candidate]) -> Result<Aggregation, AggregationError> {
        if candidates.is_empty() {
            return Err(AggregationError::NoCandidates);
        }

        let mut order: Vec<usize> = (0..candidates.len()).collect();
        // stable: equal lengths keep arrival order
        order.sort_by_key(|&i| candidates[i].content().trim().chars().count());
        let chosen = &candidates[order[(order.len() - 1) / 2]];

        let mut metadata = Metadata::new();
        metadata.insert("strategy".to_string(), Value::from(self.name()));
        metadata.insert(
            "median_length".to_string(),
            Value::from(chosen.content().trim().chars().count()),
        );

        Ok(Aggregation {
            answer: chosen.content().to_string(),
            confidence: agreement_share(self.matcher.as_ref(), candidates, chosen.content()),
            candidate: Some(chosen.clone()),
            metadata,
        })
    }
}

/// Weighted ensemble of aggregators.
#[derive(Debug, Clone)]
pub struct Weighted {
    components: Vec<(Arc<dyn Aggregator>, f64)>,
    matcher: Arc<dyn CandidateMatcher>,
}

impl Default for Weighted {
    fn default() -> Self {
        Self {
            components: vec![
                (Arc::new(MajorityVote::new()), DEFAULT_MAJORITY_WEIGHT),
                (Arc::new(BestOfN::new()), DEFAULT_BEST_OF_N_WEIGHT),
                (Arc::new(LengthHeuristic::default()), DEFAULT_LENGTH_WEIGHT),
            ],
            matcher: default_matcher(),
        }
    }
}

impl Weighted {
    /// Build from explicit `(strategy, weight)` pairs.
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidWeight` if any weight is negative or not finite.
    pub fn new(components: Vec<(Arc<dyn Aggregator>, f64)>) -> Result<Self, ConfigError> {
        for (strategy, weight) in &components {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    strategy: strategy.name().to_string(),
                    weight: *weight,
                });
            }
        }
        Ok(Self {
            components,
            matcher: default_matcher(),
        })
    }

    /// Build from the built-in strategies, weighting each by name.
    ///
    /// Recognized names: `majority_vote`, `best_of_n`, `length`.
    pub fn from_weights<'a, I>(weights: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut components: Vec<(Arc<dyn Aggregator>, f64)> = Vec::new();
        for (name, weight) in weights {
            let strategy: Arc<dyn Aggregator> = match name {
                "majority_vote" => Arc::new(MajorityVote::new()),
                "best_of_n" => Arc::new(BestOfN::new()),
                "length" => Arc::new(LengthHeuristic::default()),
                other => {
                    return Err(ConfigError::AggregatorMustImplementAggregate {
                        name: other.to_string(),
                    })
                }
            };
            components.push((strategy, weight));
        }
        Self::new(components)
    }

    pub fn with_matcher(mut self, matcher: Arc<dyn CandidateMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn components(&self) -> impl Iterator<Item = (&str, f64)> {
        self.components.iter().map(|(s, w)| (s.name(), *w))
    }
}

impl Aggregator for Weighted {
    fn name(&self) -> &str {
        "weighted"
    }

    fn aggregate(&self, candidates: &[Candidate]) -> Result<Aggregation, AggregationError> {
        if candidates.is_empty() {
            return Err(AggregationError::NoCandidates);
        }

        // (canonical, answer, candidate, pooled score) in first-vote order
        let mut pool: Vec<(String, String, Option<Candidate>, f64)> = Vec::new();
        let mut strategy_results = Map::new();
        let mut weights = Map::new();
        let mut total_weight = 0.0;

        for (strategy, weight) in &self.components {
            let result = strategy.aggregate(candidates)?;

            let mut key = strategy.name().to_string();
            let mut n = 2;
            while strategy_results.contains_key(&key) {
                key = format!("{}#{}", strategy.name(), n);
                n += 1;
            }
            strategy_results.insert(
                key.clone(),
                json!({
                    "answer": result.answer,
                    "confidence": result.confidence,
                    "weight": weight,
                }),
            );
            weights.insert(key, Value::from(*weight));
            total_weight += weight;

            let canonical = self.matcher.canonicalize(&result.answer);
            let vote = weight * result.confidence;
            match pool.iter_mut().find(|(c, ..)| *c == canonical) {
                Some(entry) => entry.3 += vote,
                None => pool.push((canonical, result.answer, result.candidate, vote)),
            }
        }

        let mut winner: Option<usize> = None;
        for (i, entry) in pool.iter().enumerate() {
            match winner {
                Some(w) if pool[w].3 >= entry.3 => {}
                _ => winner = Some(i),
            }
        }

        let (answer, candidate, score) = match winner {
            Some(w) => {
                let (_, answer, candidate, score) = pool.swap_remove(w);
                (answer, candidate, score)
            }
            None => (candidates[0].content().to_string(), Some(candidates[0].clone()), 0.0),
        };

        let mut metadata = Metadata::new();
        metadata.insert("strategy".to_string(), Value::from(self.name()));
        metadata.insert("strategy_results".to_string(), Value::Object(strategy_results));
        metadata.insert("weights".to_string(), Value::Object(weights));
        metadata.insert("weighted_score".to_string(), Value::from(score));

        Ok(Aggregation {
            answer,
            confidence: if total_weight > 0.0 {
                (score / total_weight).clamp(0.0, 1.0)
            } else {
                0.0
            },
            candidate,
            metadata,
        })
    }
}
