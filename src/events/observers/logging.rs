//! Logging Observer
//!
//! Structured logging for engine events using the `tracing` crate:
//! - INFO: RunCompleted, SearchCompleted, DecisionMade
//! - WARN: GenerationFailed
//! - DEBUG: everything else

use crate::events::{EngineEvent, EventBus};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Observer that logs engine events using tracing
pub struct LoggingObserver {
    receiver: broadcast::Receiver<EngineEvent>,
}

impl LoggingObserver {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            receiver: bus.subscribe(),
        }
    }

    /// Log events until the channel closes.
    ///
    /// ```rust,ignore
    /// tokio::spawn(LoggingObserver::new(&bus).run());
    /// ```
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => Self::log_event(&event),
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("EventBus closed, logging observer stopping");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        skipped = count,
                        "Logging observer lagged, skipped {} events", count
                    );
                }
            }
        }
    }

    /// Log a single event at the appropriate level
    pub fn log_event(event: &EngineEvent) {
        match event {
            EngineEvent::BatchRequested {
                batch,
                size,
                collected,
                ..
            } => {
                debug!(batch, size, collected, "Batch requested");
            }

            EngineEvent::CandidateRejected { reason, .. } => {
                debug!(reason = %reason, "Candidate rejected");
            }

            EngineEvent::GenerationFailed {
                attempt, reason, ..
            } => {
                warn!(attempt, reason = %reason, "Generation failed");
            }

            EngineEvent::ConsensusChecked {
                candidates,
                agreement_ratio,
                ..
            } => {
                debug!(candidates, agreement = agreement_ratio, "Consensus checked");
            }

            EngineEvent::RunCompleted {
                actual_n,
                early_stopped,
                consensus,
                difficulty,
                elapsed_ms,
                ..
            } => {
                info!(
                    actual_n,
                    early_stopped,
                    consensus = ?consensus,
                    difficulty = %difficulty.as_str(),
                    elapsed_ms,
                    "Self-consistency run completed"
                );
            }

            EngineEvent::DepthExplored {
                depth,
                frontier,
                children,
                best_score,
                ..
            } => {
                debug!(
                    depth,
                    frontier,
                    children,
                    best_score = ?best_score,
                    "Search depth explored"
                );
            }

            EngineEvent::SearchCompleted {
                iterations,
                evaluations,
                converged,
                best_score,
                elapsed_ms,
                ..
            } => {
                info!(
                    iterations,
                    evaluations,
                    converged,
                    best_score,
                    elapsed_ms,
                    "Beam search completed"
                );
            }

            EngineEvent::DecisionMade {
                decision,
                confidence,
                ev_answer,
                ev_abstain,
                ..
            } => {
                info!(
                    decision = %decision,
                    confidence,
                    ev_answer,
                    ev_abstain,
                    "Decision made"
                );
            }
        }
    }
}
