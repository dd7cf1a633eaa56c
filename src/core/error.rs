//! Engine error types.
//!
//! Every error carries a stable snake_case reason code (`reason()`) so that
//! calling code can branch on outcomes without parsing messages.
//!
//! - `ConfigError`: invalid thresholds or bounds, raised only at construction
//! - `RunError`: terminal outcomes of an adaptive self-consistency run
//! - `SearchError`: terminal outcomes of a beam search

use crate::core::aggregation::AggregationError;
use crate::core::generator::GenerationError;
use std::time::Duration;

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `min_candidates` must be at least 1
    InvalidMinCandidates {
        /// The rejected value
        value: usize,
    },
    /// `max_candidates` must be at least 1
    InvalidMaxCandidates {
        /// The rejected value
        value: usize,
    },
    /// `min_candidates` exceeds `max_candidates`
    MinCandidatesMustBeLessThanMax {
        /// Configured minimum
        min: usize,
        /// Configured maximum
        max: usize,
    },
    /// Early-stop threshold outside `[0, 1]`
    InvalidEarlyStopThreshold {
        /// The rejected value
        value: f64,
    },
    /// Generation failure budget above `limit`
    InvalidMaxGenerationFailures {
        /// The rejected value
        value: usize,
        /// Largest accepted value for the configured `max_candidates`
        limit: usize,
    },
    /// A batch size or level cap of zero
    InvalidBatchSize {
        /// Difficulty level label the value belongs to
        level: &'static str,
    },
    /// The named aggregator is not a known `Aggregator` implementation
    AggregatorMustImplementAggregate {
        /// The unresolved name
        name: String,
    },
    /// A weighted-aggregation weight that is negative or not finite
    InvalidWeight {
        /// Strategy the weight belongs to
        strategy: String,
        /// The rejected weight
        weight: f64,
    },
    /// Beam width outside `[1, 100]`
    InvalidBeamWidth {
        /// The rejected value
        value: usize,
    },
    /// Search depth outside `[1, 20]`
    InvalidDepth {
        /// The rejected value
        value: usize,
    },
    /// Branching factor outside `[1, 10]`
    InvalidBranchingFactor {
        /// The rejected value
        value: usize,
    },
    /// Rate limit with zero requests or a zero window
    InvalidRateLimit {
        /// Validation message
        message: String,
    },
    /// Sandbox with a zero timeout or output cap
    InvalidSandbox {
        /// Validation message
        message: String,
    },
    /// A configuration document could not be read or parsed
    Parse {
        /// Parser or I/O message
        message: String,
    },
}

impl ConfigError {
    /// Stable reason code for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            ConfigError::InvalidMinCandidates { .. } => "invalid_min_candidates",
            ConfigError::InvalidMaxCandidates { .. } => "invalid_max_candidates",
            ConfigError::MinCandidatesMustBeLessThanMax { .. } => {
                "min_candidates_must_be_less_than_max"
            }
            ConfigError::InvalidEarlyStopThreshold { .. } => "invalid_early_stop_threshold",
            ConfigError::InvalidMaxGenerationFailures { .. } => {
                "invalid_max_generation_failures"
            }
            ConfigError::InvalidBatchSize { .. } => "invalid_batch_size",
            ConfigError::AggregatorMustImplementAggregate { .. } => {
                "aggregator_must_implement_aggregate"
            }
            ConfigError::InvalidWeight { .. } => "invalid_weight",
            ConfigError::InvalidBeamWidth { .. } => "invalid_beam_width",
            ConfigError::InvalidDepth { .. } => "invalid_depth",
            ConfigError::InvalidBranchingFactor { .. } => "invalid_branching_factor",
            ConfigError::InvalidRateLimit { .. } => "invalid_rate_limit",
            ConfigError::InvalidSandbox { .. } => "invalid_sandbox",
            ConfigError::Parse { .. } => "invalid_config",
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidMinCandidates { value } => {
                write!(f, "min_candidates must be > 0, got {}", value)
            }
            ConfigError::InvalidMaxCandidates { value } => {
                write!(f, "max_candidates must be > 0, got {}", value)
            }
            ConfigError::MinCandidatesMustBeLessThanMax { min, max } => write!(
                f,
                "min_candidates ({}) must be less than or equal to max_candidates ({})",
                min, max
            ),
            ConfigError::InvalidEarlyStopThreshold { value } => {
                write!(f, "early_stop_threshold must be in [0, 1], got {}", value)
            }
            ConfigError::InvalidMaxGenerationFailures { value, limit } => write!(
                f,
                "max_generation_failures must be <= {}, got {}",
                limit, value
            ),
            ConfigError::InvalidBatchSize { level } => {
                write!(f, "batch size and cap for level '{}' must be > 0", level)
            }
            ConfigError::AggregatorMustImplementAggregate { name } => {
                write!(f, "'{}' is not a known aggregator", name)
            }
            ConfigError::InvalidWeight { strategy, weight } => {
                write!(f, "weight for '{}' must be finite and >= 0, got {}", strategy, weight)
            }
            ConfigError::InvalidBeamWidth { value } => {
                write!(f, "beam_width must be in [1, 100], got {}", value)
            }
            ConfigError::InvalidDepth { value } => {
                write!(f, "depth must be in [1, 20], got {}", value)
            }
            ConfigError::InvalidBranchingFactor { value } => {
                write!(f, "branching_factor must be in [1, 10], got {}", value)
            }
            ConfigError::InvalidRateLimit { message } => {
                write!(f, "Invalid rate limit: {}", message)
            }
            ConfigError::InvalidSandbox { message } => write!(f, "Invalid sandbox: {}", message),
            ConfigError::Parse { message } => write!(f, "Invalid configuration: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Terminal failure of an adaptive self-consistency run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    /// The query was empty or whitespace only
    InvalidQuery,
    /// No generator was supplied
    GeneratorRequired,
    /// Every generation attempt failed or was filtered out
    AllGeneratorsFailed {
        /// Number of generation attempts made
        attempts: usize,
    },
    /// Some candidates were produced, but fewer than `min_candidates`
    InsufficientCandidates {
        /// Usable candidates collected
        collected: usize,
        /// Required minimum
        required: usize,
    },
    /// The run deadline passed
    Timeout {
        /// Time elapsed when the deadline was detected
        elapsed: Duration,
    },
    /// The aggregator rejected the final candidate set
    Aggregation(AggregationError),
}

impl RunError {
    /// Stable reason code for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            RunError::InvalidQuery => "invalid_query",
            RunError::GeneratorRequired => "generator_required",
            RunError::AllGeneratorsFailed { .. } => "all_generators_failed",
            RunError::InsufficientCandidates { .. } => "insufficient_candidates",
            RunError::Timeout { .. } => "timeout",
            RunError::Aggregation(e) => e.reason(),
        }
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::InvalidQuery => write!(f, "Query must be a non-empty string"),
            RunError::GeneratorRequired => write!(f, "A generator is required"),
            RunError::AllGeneratorsFailed { attempts } => {
                write!(f, "All {} generation attempts failed", attempts)
            }
            RunError::InsufficientCandidates {
                collected,
                required,
            } => write!(
                f,
                "Collected {} candidates, at least {} required",
                collected, required
            ),
            RunError::Timeout { elapsed } => write!(f, "Run timed out after {:?}", elapsed),
            RunError::Aggregation(e) => write!(f, "Aggregation failed: {}", e),
        }
    }
}

impl std::error::Error for RunError {}

impl From<AggregationError> for RunError {
    fn from(e: AggregationError) -> Self {
        RunError::Aggregation(e)
    }
}

/// Terminal failure of a beam search.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The prompt was empty or whitespace only
    InvalidPrompt,
    /// The initial generation produced no usable candidates
    NoInitialCandidates,
    /// The initial generation call itself failed
    GenerationFailed(GenerationError),
    /// The search deadline passed
    Timeout {
        /// Time elapsed when the deadline was detected
        elapsed: Duration,
    },
    /// The evaluation budget ran out before the search finished
    BudgetExhausted {
        /// Verifier evaluations performed
        evaluations: usize,
    },
}

impl SearchError {
    /// Stable reason code for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            SearchError::InvalidPrompt => "invalid_prompt",
            SearchError::NoInitialCandidates => "no_initial_candidates",
            SearchError::GenerationFailed(_) => "generation_failed",
            SearchError::Timeout { .. } => "timeout",
            SearchError::BudgetExhausted { .. } => "budget_exhausted",
        }
    }
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::InvalidPrompt => write!(f, "Prompt must be a non-empty string"),
            SearchError::NoInitialCandidates => write!(f, "No initial candidates were generated"),
            SearchError::GenerationFailed(e) => write!(f, "Initial generation failed: {}", e),
            SearchError::Timeout { elapsed } => write!(f, "Search timed out after {:?}", elapsed),
            SearchError::BudgetExhausted { evaluations } => {
                write!(f, "Search budget exhausted after {} evaluations", evaluations)
            }
        }
    }
}

impl std::error::Error for SearchError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_reason_codes() {
        assert_eq!(
            ConfigError::MinCandidatesMustBeLessThanMax { min: 5, max: 2 }.reason(),
            "min_candidates_must_be_less_than_max"
        );
        assert_eq!(
            ConfigError::AggregatorMustImplementAggregate {
                name: "nope".to_string()
            }
            .reason(),
            "aggregator_must_implement_aggregate"
        );
        assert_eq!(
            ConfigError::InvalidBeamWidth { value: 0 }.reason(),
            "invalid_beam_width"
        );
        assert_eq!(
            ConfigError::InvalidMaxGenerationFailures {
                value: usize::MAX,
                limit: 200
            }
            .reason(),
            "invalid_max_generation_failures"
        );
    }

    #[test]
    fn test_run_reason_codes() {
        assert_eq!(RunError::GeneratorRequired.reason(), "generator_required");
        assert_eq!(
            RunError::AllGeneratorsFailed { attempts: 3 }.reason(),
            "all_generators_failed"
        );
        assert_eq!(
            RunError::Aggregation(AggregationError::NoCandidates).reason(),
            "no_candidates"
        );
    }

    #[test]
    fn test_display_includes_values() {
        assert!(ConfigError::InvalidDepth { value: 25 }
            .to_string()
            .contains("25"));
        assert!(ConfigError::InvalidMaxGenerationFailures {
            value: 500,
            limit: 200
        }
        .to_string()
        .contains("<= 200, got 500"));
        assert!(RunError::InsufficientCandidates {
            collected: 1,
            required: 3
        }
        .to_string()
        .contains("at least 3"));
        assert!(SearchError::Timeout {
            elapsed: Duration::from_millis(5)
        }
        .to_string()
        .contains("timed out"));
    }

    #[test]
    fn test_errors_are_std_errors() {
        let err: Box<dyn std::error::Error> = Box::new(SearchError::NoInitialCandidates);
        assert!(err.to_string().contains("initial"));
    }
}
