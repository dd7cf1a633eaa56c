//! Candidate Filtering
//!
//! Generator output is untrusted. Candidates that are empty, oversized or
//! contain control characters are discarded before they reach consensus or
//! aggregation. A discarded candidate is never repaired or truncated.

use crate::core::candidate::Candidate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default maximum candidate content length, in characters.
pub const DEFAULT_MAX_CONTENT_CHARS: usize = 32_768;

/// Reason a candidate was discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Rejection {
    /// Content was empty or whitespace only
    EmptyContent,
    /// Content exceeded the configured character limit
    ContentTooLong {
        /// Character count of the rejected content
        actual: usize,
        /// Configured limit
        limit: usize,
    },
    /// Content contained NUL or other non-whitespace control characters
    MalformedContent,
    /// Score was NaN or infinite
    InvalidScore,
}

impl Rejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::EmptyContent => "empty_content",
            Rejection::ContentTooLong { .. } => "content_too_long",
            Rejection::MalformedContent => "malformed_content",
            Rejection::InvalidScore => "invalid_score",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::EmptyContent => write!(f, "Candidate content is empty"),
            Rejection::ContentTooLong { actual, limit } => write!(
                f,
                "Candidate content has {} characters (limit {})",
                actual, limit
            ),
            Rejection::MalformedContent => write!(f, "Candidate content has control characters"),
            Rejection::InvalidScore => write!(f, "Candidate score is not finite"),
        }
    }
}

/// Validates generator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFilter {
    /// Maximum content length in characters (`None` disables the check)
    pub max_content_chars: Option<usize>,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            max_content_chars: Some(DEFAULT_MAX_CONTENT_CHARS),
        }
    }
}

impl CandidateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_content_chars(mut self, limit: usize) -> Self {
        self.max_content_chars = Some(limit);
        self
    }

    pub fn without_length_limit(mut self) -> Self {
        self.max_content_chars = None;
        self
    }

    /// Check one candidate, returning the first rejection found.
    pub fn check(&self, candidate: &Candidate) -> Result<(), Rejection> {
        let content = candidate.content();
        if content.trim().is_empty() {
            return Err(Rejection::EmptyContent);
        }
        if let Some(limit) = self.max_content_chars {
            let actual = content.chars().count();
            if actual > limit {
                return Err(Rejection::ContentTooLong { actual, limit });
            }
        }
        if content.chars().any(|c| c.is_control() && !c.is_whitespace()) {
            return Err(Rejection::MalformedContent);
        }
        if candidate.score().is_some_and(|s| !s.is_finite()) {
            return Err(Rejection::InvalidScore);
        }
        Ok(())
    }

    /// Keep the acceptable candidates, returning rejections alongside.
    pub fn partition(&self, candidates: Vec<Candidate>) -> (Vec<Candidate>, Vec<Rejection>) {
        let mut kept = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for candidate in candidates {
            match self.check(&candidate) {
                Ok(()) => kept.push(candidate),
                Err(rejection) => {
                    warn!(
                        candidate_id = %candidate.id(),
                        reason = rejection.reason(),
                        "Discarding candidate"
                    );
                    rejected.push(rejection);
                }
            }
        }
        (kept, rejected)
    }
}
