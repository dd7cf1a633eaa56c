//! Event-Driven Observability
//!
//! The engine emits structured events while it works:
//! - Batch requests, rejected candidates and failed generator calls
//! - Consensus checks and run completion
//! - Beam search depth progress and completion
//! - Answer/abstain decisions
//!
//! # Architecture
//!
//! Events are emitted via an `EventBus` which uses a broadcast channel.
//! Multiple observers can subscribe to receive all events:
//!
//! ```text
//! Engine → EventBus → [LoggingObserver, MetricsObserver, ...]
//! ```

pub mod bus;
pub mod observers;

use crate::core::decision::DecisionResult;
use crate::core::difficulty::DifficultyLevel;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// All events emitted by the engine.
///
/// Tagged with their type for JSON serialization; every event carries the
/// wall-clock time it was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EngineEvent {
    /// A batch of generator calls was started
    BatchRequested {
        /// 1-based batch number within the run
        batch: usize,
        /// Calls in this batch
        size: usize,
        /// Candidates collected before this batch
        collected: usize,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// Generator output was discarded by the candidate filter
    CandidateRejected {
        /// Rejection reason code (e.g. "empty_content")
        reason: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// A generator call failed
    GenerationFailed {
        /// Attempt index (self-consistency) or depth (search)
        attempt: usize,
        /// Failure reason code
        reason: String,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// Agreement among the collected candidates was measured
    ConsensusChecked {
        candidates: usize,
        agreement_ratio: f64,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// An adaptive self-consistency run finished successfully
    RunCompleted {
        actual_n: usize,
        early_stopped: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        consensus: Option<f64>,
        difficulty: DifficultyLevel,
        elapsed_ms: u64,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// One beam search depth was expanded and scored
    DepthExplored {
        depth: usize,
        /// Parents expanded at this depth
        frontier: usize,
        /// Scored children produced
        children: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        best_score: Option<f64>,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// A beam search finished successfully
    SearchCompleted {
        iterations: usize,
        evaluations: usize,
        converged: bool,
        best_score: f64,
        elapsed_ms: u64,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },

    /// An answer/abstain decision was taken
    DecisionMade {
        /// "answer" or "abstain"
        decision: String,
        confidence: f64,
        ev_answer: f64,
        ev_abstain: f64,
        #[serde(with = "system_time_serde")]
        timestamp: SystemTime,
    },
}

impl EngineEvent {
    pub fn batch_requested(batch: usize, size: usize, collected: usize) -> Self {
        Self::BatchRequested {
            batch,
            size,
            collected,
            timestamp: SystemTime::now(),
        }
    }

    pub fn candidate_rejected(reason: &str) -> Self {
        Self::CandidateRejected {
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn generation_failed(attempt: usize, reason: &str) -> Self {
        Self::GenerationFailed {
            attempt,
            reason: reason.to_string(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn consensus_checked(candidates: usize, agreement_ratio: f64) -> Self {
        Self::ConsensusChecked {
            candidates,
            agreement_ratio,
            timestamp: SystemTime::now(),
        }
    }

    pub fn run_completed(
        actual_n: usize,
        early_stopped: bool,
        consensus: Option<f64>,
        difficulty: DifficultyLevel,
        elapsed: Duration,
    ) -> Self {
        Self::RunCompleted {
            actual_n,
            early_stopped,
            consensus,
            difficulty,
            elapsed_ms: elapsed.as_millis() as u64,
            timestamp: SystemTime::now(),
        }
    }

    pub fn depth_explored(
        depth: usize,
        frontier: usize,
        children: usize,
        best_score: Option<f64>,
    ) -> Self {
        Self::DepthExplored {
            depth,
            frontier,
            children,
            best_score,
            timestamp: SystemTime::now(),
        }
    }

    pub fn search_completed(
        iterations: usize,
        evaluations: usize,
        converged: bool,
        best_score: f64,
        elapsed: Duration,
    ) -> Self {
        Self::SearchCompleted {
            iterations,
            evaluations,
            converged,
            best_score,
            elapsed_ms: elapsed.as_millis() as u64,
            timestamp: SystemTime::now(),
        }
    }

    pub fn decision_made(result: &DecisionResult) -> Self {
        Self::DecisionMade {
            decision: result.decision.as_str().to_string(),
            confidence: result.confidence,
            ev_answer: result.ev_answer,
            ev_abstain: result.ev_abstain,
            timestamp: SystemTime::now(),
        }
    }

    /// Variant name, matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BatchRequested { .. } => "BatchRequested",
            Self::CandidateRejected { .. } => "CandidateRejected",
            Self::GenerationFailed { .. } => "GenerationFailed",
            Self::ConsensusChecked { .. } => "ConsensusChecked",
            Self::RunCompleted { .. } => "RunCompleted",
            Self::DepthExplored { .. } => "DepthExplored",
            Self::SearchCompleted { .. } => "SearchCompleted",
            Self::DecisionMade { .. } => "DecisionMade",
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            Self::BatchRequested { timestamp, .. }
            | Self::CandidateRejected { timestamp, .. }
            | Self::GenerationFailed { timestamp, .. }
            | Self::ConsensusChecked { timestamp, .. }
            | Self::RunCompleted { timestamp, .. }
            | Self::DepthExplored { timestamp, .. }
            | Self::SearchCompleted { timestamp, .. }
            | Self::DecisionMade { timestamp, .. } => *timestamp,
        }
    }
}

/// Serde module for SystemTime serialization (epoch milliseconds)
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

pub use bus::EventBus;
