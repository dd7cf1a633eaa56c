//! Accuracy Engine - reliable answers from non-deterministic generators
//!
//! Improves the reliability of a generator (typically an LLM) by sampling
//! several candidates and deciding what to trust:
//!
//! - **Adaptive self-consistency**: sample in difficulty-scaled batches and
//!   stop early once the candidates agree
//! - **Beam search**: expand and prune a tree of refinements scored by a verifier
//! - **Aggregation**: majority vote, best-of-n, or a weighted blend
//! - **Decisions**: answer or abstain by expected value; critique feedback
//!   from verifier scores
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use accuracy::core::{AdaptiveConfig, AdaptiveSelfConsistency, MajorityVote, MockGenerator, RunOptions};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = AdaptiveSelfConsistency::new(AdaptiveConfig::default(), Arc::new(MajorityVote::new()))?;
//! let generator = Arc::new(MockGenerator::constant("42"));
//!
//! let outcome = engine.run("What is 6 * 7?", RunOptions::new(generator)).await?;
//! println!("{} ({:.2})", outcome.aggregation.answer, outcome.aggregation.confidence);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod events;
pub mod services;

// Re-export commonly used items at crate root
pub use config::{AggregatorConfig, EngineConfig};
pub use core::{
    AdaptiveConfig, AdaptiveSelfConsistency, BeamSearch, BeamSearchConfig, Candidate,
    ConfigError, CritiqueResult, DecisionResult, RunError, SearchError,
};
pub use events::observers::{LoggingObserver, MetricsObserver};
pub use events::{EngineEvent, EventBus};
