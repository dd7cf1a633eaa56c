//! Search state for tree/beam search.
//!
//! `SearchState` is a value: every transition consumes the state and
//! returns the next one, so concurrent branches never share mutable
//! memory. Two invariants hold across any sequence of transitions:
//!
//! - `best_node` only changes to a node with a strictly greater score
//! - `stagnation_count` counts consecutive non-improving candidates and is
//!   reset to 0 exactly when `best_node` changes

use crate::core::candidate::{Candidate, Metadata};
use std::time::{Duration, Instant};

/// A scored candidate in the search tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchNode {
    pub candidate: Candidate,
    pub score: f64,
    pub metadata: Metadata,
}

impl SearchNode {
    pub fn new(candidate: Candidate, score: f64) -> Self {
        Self {
            candidate,
            score,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Immutable-by-replacement search state.
#[derive(Debug, Clone)]
pub struct SearchState {
    nodes: Vec<SearchNode>,
    best_node: Option<SearchNode>,
    iterations: usize,
    budget_remaining: usize,
    converged: bool,
    stagnation_count: usize,
    metadata: Metadata,
    start_time: Instant,
}

impl SearchState {
    /// Fresh state with the given evaluation budget.
    pub fn new(budget: usize) -> Self {
        Self {
            nodes: Vec::new(),
            best_node: None,
            iterations: 0,
            budget_remaining: budget,
            converged: false,
            stagnation_count: 0,
            metadata: Metadata::new(),
            start_time: Instant::now(),
        }
    }

    /// Offer `node` as the new best.
    ///
    /// Accepted only if there is no best yet or its score is strictly
    /// greater; otherwise the stagnation counter grows.
    pub fn update_best(mut self, node: SearchNode) -> Self {
        let improves = match &self.best_node {
            None => !node.score.is_nan(),
            Some(best) => node.score > best.score,
        };
        if improves {
            self.best_node = Some(node);
            self.stagnation_count = 0;
        } else {
            self.stagnation_count += 1;
        }
        self
    }

    /// Prepend a node (most-recent-first).
    pub fn add_node(mut self, node: SearchNode) -> Self {
        self.nodes.insert(0, node);
        self
    }

    /// Prepend several nodes; the last of `nodes` ends up first.
    pub fn add_nodes(self, nodes: impl IntoIterator<Item = SearchNode>) -> Self {
        nodes.into_iter().fold(self, SearchState::add_node)
    }

    /// Replace the frontier.
    pub fn set_nodes(mut self, nodes: Vec<SearchNode>) -> Self {
        self.nodes = nodes;
        self
    }

    /// Consume one unit of budget (saturating at zero).
    pub fn decrement_budget(mut self) -> Self {
        self.budget_remaining = self.budget_remaining.saturating_sub(1);
        self
    }

    pub fn increment_iteration(mut self) -> Self {
        self.iterations += 1;
        self
    }

    pub fn converge(mut self) -> Self {
        self.converged = true;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn nodes(&self) -> &[SearchNode] {
        &self.nodes
    }

    pub fn best_node(&self) -> Option<&SearchNode> {
        self.best_node.as_ref()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn budget_remaining(&self) -> usize {
        self.budget_remaining
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    pub fn stagnation_count(&self) -> usize {
        self.stagnation_count
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Take the best node out of the state.
    pub fn into_best(self) -> Option<SearchNode> {
        self.best_node
    }
}
