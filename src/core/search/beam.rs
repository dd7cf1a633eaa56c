//! Beam search over candidate refinement trees.
//!
//! ```text
//! frontier = score(generate(prompt, n = beam_width))
//! for depth in 1..=max_depth:
//!     parents  = select_top_k(frontier, beam_width)
//!     children = score(expand(p, branching_factor) for p in parents)
//!     frontier = select_top_k(children, beam_width)
//! ```
//!
//! Expansion and scoring fan out on a `JoinSet`; results are merged in
//! request order, so the outcome does not depend on completion order.

use super::state::{SearchNode, SearchState};
use crate::core::candidate::Candidate;
use crate::core::error::{ConfigError, SearchError};
use crate::core::fanout::join_in_order;
use crate::core::filter::CandidateFilter;
use crate::core::generator::{GenerateOptions, Generator, Verifier, VerifyContext};
use crate::events::{EngineEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_BEAM_WIDTH: usize = 3;
pub const DEFAULT_DEPTH: usize = 3;
pub const DEFAULT_BRANCHING_FACTOR: usize = 2;
pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 30_000;

pub const MAX_BEAM_WIDTH: usize = 100;
pub const MAX_DEPTH: usize = 20;
pub const MAX_BRANCHING_FACTOR: usize = 10;

/// Beam search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamSearchConfig {
    /// Nodes kept per depth, `1..=100`
    pub beam_width: usize,
    /// Expansion rounds, `1..=20`
    pub depth: usize,
    /// Children requested per frontier node, `1..=10`
    pub branching_factor: usize,
    /// Deadline measured from the start of `search`
    pub timeout_ms: u64,
    /// Maximum verifier evaluations
    pub budget: Option<usize>,
    /// Non-improving children tolerated before converging
    pub patience: Option<usize>,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            beam_width: DEFAULT_BEAM_WIDTH,
            depth: DEFAULT_DEPTH,
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            timeout_ms: DEFAULT_SEARCH_TIMEOUT_MS,
            budget: None,
            patience: None,
        }
    }
}

impl BeamSearchConfig {
    pub fn with_beam_width(mut self, beam_width: usize) -> Self {
        self.beam_width = beam_width;
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_branching_factor(mut self, branching_factor: usize) -> Self {
        self.branching_factor = branching_factor;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = Some(patience);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_BEAM_WIDTH).contains(&self.beam_width) {
            return Err(ConfigError::InvalidBeamWidth {
                value: self.beam_width,
            });
        }
        if !(1..=MAX_DEPTH).contains(&self.depth) {
            return Err(ConfigError::InvalidDepth { value: self.depth });
        }
        if !(1..=MAX_BRANCHING_FACTOR).contains(&self.branching_factor) {
            return Err(ConfigError::InvalidBranchingFactor {
                value: self.branching_factor,
            });
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Result of a completed search.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSearchOutcome {
    pub best_candidate: Candidate,
    pub best_score: f64,
    /// Depths fully explored
    pub iterations: usize,
    /// True when the search stopped before `depth` (no children or patience)
    pub converged: bool,
    /// Verifier calls made
    pub evaluations: usize,
    pub elapsed: Duration,
}

/// The `k` highest-scoring nodes, best first.
///
/// Stable: equal scores keep their input order. NaN scores rank last.
pub fn select_top_k(nodes: &[SearchNode], k: usize) -> Vec<SearchNode> {
    if k == 0 || nodes.is_empty() {
        return Vec::new();
    }
    let rank = |s: f64| if s.is_nan() { f64::NEG_INFINITY } else { s };
    let mut sorted = nodes.to_vec();
    sorted.sort_by(|a, b| rank(b.score).total_cmp(&rank(a.score)));
    sorted.truncate(k);
    sorted
}

/// Verifier-guided beam search.
#[derive(Debug, Clone)]
pub struct BeamSearch {
    config: BeamSearchConfig,
    filter: CandidateFilter,
    event_bus: Option<EventBus>,
}

impl BeamSearch {
    /// # Errors
    ///
    /// `invalid_beam_width`, `invalid_depth` or `invalid_branching_factor`
    /// when a bound is out of range.
    pub fn new(config: BeamSearchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            filter: CandidateFilter::new(),
            event_bus: None,
        })
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &BeamSearchConfig {
        &self.config
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }

    /// Run the search and return the best candidate found.
    ///
    /// `opts` is the template for every generator call; `n`, `parent` and
    /// `depth` are overwritten per call.
    pub async fn search(
        &self,
        prompt: &str,
        generator: Arc<dyn Generator>,
        verifier: Arc<dyn Verifier>,
        opts: GenerateOptions,
    ) -> Result<BeamSearchOutcome, SearchError> {
        if prompt.trim().is_empty() {
            return Err(SearchError::InvalidPrompt);
        }

        let start = Instant::now();
        let timeout = self.config.timeout();
        let deadline = start + timeout;
        let timed_out = || SearchError::Timeout {
            elapsed: start.elapsed(),
        };
        let budget = self.config.budget.unwrap_or(usize::MAX);
        let mut evaluations = 0usize;

        // Initial candidates
        let initial_opts = GenerateOptions {
            n: self.config.beam_width,
            parent: None,
            depth: 0,
            ..opts.clone()
        };
        let generated =
            tokio::time::timeout_at(deadline, generator.generate(prompt, &initial_opts))
                .await
                .map_err(|_| timed_out())?;
        if start.elapsed() >= timeout {
            return Err(timed_out());
        }
        let generated = generated.map_err(SearchError::GenerationFailed)?;
        let (initial, _) = self.filter.partition(generated.into_vec());
        if initial.is_empty() {
            return Err(SearchError::NoInitialCandidates);
        }

        let batch: Vec<(Candidate, Option<Candidate>)> =
            initial.into_iter().map(|c| (c, None)).collect();
        charge(batch.len(), budget, &mut evaluations)?;
        let scored = self
            .score_batch(prompt, &verifier, batch, 0, deadline)
            .await
            .ok_or_else(timed_out)?;
        if scored.is_empty() {
            return Err(SearchError::NoInitialCandidates);
        }

        let mut state = SearchState::new(budget.saturating_sub(evaluations));
        for node in &scored {
            state = state.update_best(node.clone());
        }
        state = state.set_nodes(scored);

        if start.elapsed() >= timeout {
            return Err(timed_out());
        }

        for depth in 1..=self.config.depth {
            let parents = select_top_k(state.nodes(), self.config.beam_width);

            let children = self
                .expand(prompt, &generator, &parents, depth, &opts, deadline)
                .await
                .ok_or_else(timed_out)?;

            if children.is_empty() {
                debug!(depth, "No children generated, converging");
                state = state.converge();
                break;
            }

            charge(children.len(), budget, &mut evaluations)?;
            for _ in 0..children.len() {
                state = state.decrement_budget();
            }
            let scored = self
                .score_batch(prompt, &verifier, children, depth, deadline)
                .await
                .ok_or_else(timed_out)?;

            let produced = scored.len();
            for node in &scored {
                state = state.update_best(node.clone());
            }
            let frontier = select_top_k(&scored, self.config.beam_width);
            state = state.set_nodes(frontier).increment_iteration();

            let best_score = state.best_node().map(|n| n.score);
            debug!(depth, produced, best_score = ?best_score, "Depth explored");
            self.emit(EngineEvent::depth_explored(
                depth,
                parents.len(),
                produced,
                best_score,
            ));

            if start.elapsed() >= timeout {
                return Err(timed_out());
            }
            if produced == 0 {
                state = state.converge();
                break;
            }
            if let Some(patience) = self.config.patience {
                if state.stagnation_count() >= patience {
                    debug!(depth, stagnation = state.stagnation_count(), "Patience exhausted");
                    state = state.converge();
                    break;
                }
            }
        }

        let iterations = state.iterations();
        let converged = state.is_converged();
        let best = state.into_best().ok_or(SearchError::NoInitialCandidates)?;
        let elapsed = start.elapsed();

        info!(
            best_score = best.score,
            iterations,
            evaluations,
            converged,
            "Beam search completed"
        );
        self.emit(EngineEvent::search_completed(
            iterations,
            evaluations,
            converged,
            best.score,
            elapsed,
        ));

        Ok(BeamSearchOutcome {
            best_candidate: best.candidate,
            best_score: best.score,
            iterations,
            converged,
            evaluations,
            elapsed,
        })
    }

    /// Generate `branching_factor` children per parent, concurrently.
    /// Children keep parent order; `None` when the deadline passes.
    async fn expand(
        &self,
        prompt: &str,
        generator: &Arc<dyn Generator>,
        parents: &[SearchNode],
        depth: usize,
        template: &GenerateOptions,
        deadline: Instant,
    ) -> Option<Vec<(Candidate, Option<Candidate>)>> {
        let mut set = JoinSet::new();
        for (i, parent) in parents.iter().enumerate() {
            let generator = Arc::clone(generator);
            let prompt = prompt.to_string();
            let opts = GenerateOptions {
                n: self.config.branching_factor,
                parent: Some(parent.candidate.clone()),
                depth,
                ..template.clone()
            };
            set.spawn(async move { (i, generator.generate(&prompt, &opts).await) });
        }
        let results = join_in_order(&mut set, parents.len(), Some(deadline)).await?;

        let mut children = Vec::new();
        for (parent, result) in parents.iter().zip(results) {
            match result {
                Some(Ok(generated)) => {
                    let mut batch = generated.into_vec();
                    batch.truncate(self.config.branching_factor);
                    let (kept, _) = self.filter.partition(batch);
                    children.extend(
                        kept.into_iter()
                            .map(|c| (c, Some(parent.candidate.clone()))),
                    );
                }
                Some(Err(e)) => {
                    warn!(depth, parent = %parent.candidate.id(), error = %e, "Expansion failed");
                    self.emit(EngineEvent::generation_failed(depth, e.reason()));
                }
                None => {
                    warn!(depth, parent = %parent.candidate.id(), "Expansion task panicked");
                }
            }
        }
        Some(children)
    }

    /// Verify a batch concurrently. Failed verifications drop the candidate;
    /// a missing score counts as 0.0. `None` when the deadline passes.
    async fn score_batch(
        &self,
        prompt: &str,
        verifier: &Arc<dyn Verifier>,
        batch: Vec<(Candidate, Option<Candidate>)>,
        depth: usize,
        deadline: Instant,
    ) -> Option<Vec<SearchNode>> {
        let size = batch.len();
        let mut set = JoinSet::new();
        for (i, (candidate, parent)) in batch.into_iter().enumerate() {
            let verifier = Arc::clone(verifier);
            let context = VerifyContext {
                prompt: prompt.to_string(),
                depth,
                parent,
                ..VerifyContext::default()
            };
            set.spawn(async move {
                let result = verifier.verify(&candidate, &context).await;
                (i, (candidate, result))
            });
        }
        let results = join_in_order(&mut set, size, Some(deadline)).await?;

        let mut nodes = Vec::with_capacity(size);
        for (candidate, result) in results.into_iter().flatten() {
            match result {
                Ok(verification) => {
                    let score = verification.score.unwrap_or(0.0);
                    let mut node = SearchNode::new(candidate, score)
                        .with_metadata("depth", serde_json::Value::from(depth));
                    if let Some(reasoning) = verification.reasoning {
                        node = node.with_metadata("reasoning", serde_json::Value::from(reasoning));
                    }
                    nodes.push(node);
                }
                Err(e) => {
                    warn!(depth, candidate = %candidate.id(), error = %e, "Verification failed");
                }
            }
        }
        Some(nodes)
    }
}

/// Reserve `calls` verifier evaluations against `budget`.
fn charge(calls: usize, budget: usize, evaluations: &mut usize) -> Result<(), SearchError> {
    if calls > budget.saturating_sub(*evaluations) {
        return Err(SearchError::BudgetExhausted {
            evaluations: *evaluations,
        });
    }
    *evaluations += calls;
    Ok(())
}
