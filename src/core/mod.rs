//! Core accuracy algorithms
//!
//! - `difficulty`: query difficulty estimates and levels
//! - `consensus`: agreement measurement over candidates
//! - `adaptive`: difficulty-adaptive self-consistency sampling
//! - `aggregation`: pluggable candidate aggregation strategies
//! - `search`: verifier-guided beam search over refinements
//! - `decision`: answer/abstain decisions and critique feedback

pub mod adaptive;
pub mod aggregation;
pub mod candidate;
pub mod consensus;
pub mod decision;
pub mod difficulty;
pub mod error;
mod fanout;
pub mod filter;
pub mod generator;
pub mod matcher;
pub mod search;

pub use adaptive::{
    adjust_n, AdaptiveConfig, AdaptiveSelfConsistency, LevelTable, RunMetadata, RunOptions,
    SelfConsistencyOutcome,
};
pub use aggregation::{
    Aggregation, AggregationError, AggregationStrategy, Aggregator, BestOfN, MajorityVote,
    Weighted,
};
pub use candidate::{Candidate, Metadata};
pub use consensus::{ConsensusChecker, ConsensusError, ConsensusReport};
pub use decision::{
    CritiqueAttrs, CritiqueResult, Decision, DecisionAttrs, DecisionError, DecisionResult,
    ExpectedValuePolicy, SeverityLevel,
};
pub use difficulty::{
    to_level, DifficultyAttrs, DifficultyError, DifficultyEstimate, DifficultyEstimator,
    DifficultyLevel, HeuristicEstimator,
};
pub use error::{ConfigError, RunError, SearchError};
pub use filter::{CandidateFilter, Rejection};
pub use generator::{
    BoxFuture, FnGenerator, FnVerifier, GenerateOptions, Generated, GenerationError,
    Generator, MockGenerator, MockVerifier, SyncFnGenerator, VerificationError,
    VerificationResult, Verifier, VerifyContext,
};
pub use matcher::{default_matcher, CandidateMatcher, NormalizedMatcher};
pub use search::{
    select_top_k, BeamSearch, BeamSearchConfig, BeamSearchOutcome, SearchNode, SearchState,
};
