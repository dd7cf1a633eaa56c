//! Adaptive Self-Consistency
//!
//! Samples candidates in batches until the batch agrees with itself, the
//! per-difficulty cap is hit, or the failure budget runs out, then reduces
//! the collected set with the configured aggregator.
//!
//! # Algorithm
//!
//! ```text
//! max_n = min(max(level_cap(level), min_candidates), max_candidates)
//! loop:
//!     k = adjust_n(level, len(candidates), max_n)     // 0 => stop
//!     fan out k generator calls (n = 1 each), keep request order
//!     drop failures and filtered candidates
//!     if len >= min_candidates and agreement >= threshold => early stop
//! aggregate(candidates)
//! ```
//!
//! Easy questions usually converge after the first batch; hard questions
//! are allowed up to `max_candidates` samples.

use crate::core::aggregation::{Aggregation, Aggregator};
use crate::core::candidate::{Candidate, Metadata};
use crate::core::consensus::ConsensusChecker;
use crate::core::decision::{DecisionResult, ExpectedValuePolicy};
use crate::core::difficulty::{DifficultyEstimator, DifficultyLevel, HeuristicEstimator};
use crate::core::error::{ConfigError, RunError};
use crate::core::fanout::join_in_order;
use crate::core::filter::CandidateFilter;
use crate::core::generator::{GenerateOptions, Generator};
use crate::core::matcher::CandidateMatcher;
use crate::events::{EngineEvent, EventBus};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default minimum number of candidates before consensus is checked.
pub const DEFAULT_MIN_CANDIDATES: usize = 3;
/// Default hard ceiling on candidates per run.
pub const DEFAULT_MAX_CANDIDATES: usize = 20;
/// Default agreement ratio that stops sampling early.
pub const DEFAULT_EARLY_STOP_THRESHOLD: f64 = 0.8;
/// Default number of failed generation calls tolerated per run.
pub const DEFAULT_MAX_GENERATION_FAILURES: usize = 10;
/// Largest failure budget accepted per allowed candidate.
pub const MAX_GENERATION_FAILURES_PER_CANDIDATE: usize = 10;
/// Default number of generator calls in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Per-difficulty integer table (batch sizes, caps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable {
    pub easy: usize,
    pub medium: usize,
    pub hard: usize,
}

impl LevelTable {
    pub const fn new(easy: usize, medium: usize, hard: usize) -> Self {
        Self { easy, medium, hard }
    }

    pub fn get(&self, level: DifficultyLevel) -> usize {
        match level {
            DifficultyLevel::Easy => self.easy,
            DifficultyLevel::Medium => self.medium,
            DifficultyLevel::Hard => self.hard,
        }
    }
}

/// Default candidates requested per batch, by level.
pub const DEFAULT_BATCH_SIZES: LevelTable = LevelTable::new(3, 4, 5);
/// Default candidate cap, by level.
pub const DEFAULT_LEVEL_CAPS: LevelTable = LevelTable::new(5, 10, 20);

/// Configuration for adaptive sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Candidates required before consensus is checked
    pub min_candidates: usize,
    /// Absolute cap on candidates, applied over the level caps
    pub max_candidates: usize,
    /// Agreement ratio in `[0, 1]` at which sampling stops
    pub early_stop_threshold: f64,
    pub batch_sizes: LevelTable,
    pub level_caps: LevelTable,
    /// Failed calls tolerated before the run gives up
    pub max_generation_failures: usize,
    /// Generator calls in flight at once
    pub max_concurrency: usize,
    /// Wall-clock deadline for the whole run
    pub timeout_ms: Option<u64>,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            min_candidates: DEFAULT_MIN_CANDIDATES,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            early_stop_threshold: DEFAULT_EARLY_STOP_THRESHOLD,
            batch_sizes: DEFAULT_BATCH_SIZES,
            level_caps: DEFAULT_LEVEL_CAPS,
            max_generation_failures: DEFAULT_MAX_GENERATION_FAILURES,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout_ms: None,
        }
    }
}

impl AdaptiveConfig {
    pub fn with_min_candidates(mut self, n: usize) -> Self {
        self.min_candidates = n;
        self
    }

    pub fn with_max_candidates(mut self, n: usize) -> Self {
        self.max_candidates = n;
        self
    }

    pub fn with_early_stop_threshold(mut self, threshold: f64) -> Self {
        self.early_stop_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_max_generation_failures(mut self, n: usize) -> Self {
        self.max_generation_failures = n;
        self
    }

    /// Check every bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_candidates == 0 {
            return Err(ConfigError::InvalidMinCandidates {
                value: self.min_candidates,
            });
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::InvalidMaxCandidates {
                value: self.max_candidates,
            });
        }
        if self.min_candidates > self.max_candidates {
            return Err(ConfigError::MinCandidatesMustBeLessThanMax {
                min: self.min_candidates,
                max: self.max_candidates,
            });
        }
        if !(0.0..=1.0).contains(&self.early_stop_threshold) {
            return Err(ConfigError::InvalidEarlyStopThreshold {
                value: self.early_stop_threshold,
            });
        }
        let failure_limit = self
            .max_candidates
            .saturating_mul(MAX_GENERATION_FAILURES_PER_CANDIDATE);
        if self.max_generation_failures > failure_limit {
            return Err(ConfigError::InvalidMaxGenerationFailures {
                value: self.max_generation_failures,
                limit: failure_limit,
            });
        }
        for level in DifficultyLevel::ALL {
            if self.batch_sizes.get(level) == 0 {
                return Err(ConfigError::InvalidBatchSize {
                    level: level.as_str(),
                });
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Per-run inputs.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Candidate source (required)
    pub generator: Option<Arc<dyn Generator>>,
    /// Known difficulty; estimated from the query when absent
    pub difficulty: Option<DifficultyLevel>,
    /// Passed through to every generator call
    pub extra: Metadata,
}

impl RunOptions {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator: Some(generator),
            ..Self::default()
        }
    }

    pub fn with_difficulty(mut self, level: DifficultyLevel) -> Self {
        self.difficulty = Some(level);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("generator", &self.generator.as_ref().map(|_| "<generator>"))
            .field("difficulty", &self.difficulty)
            .field("extra", &self.extra)
            .finish()
    }
}

/// How a run went.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    /// Candidates that reached aggregation
    pub actual_n: usize,
    pub early_stopped: bool,
    /// Last computed agreement ratio
    pub consensus: Option<f64>,
    pub difficulty: DifficultyLevel,
    pub max_n: usize,
    pub batches: usize,
    /// Failed or fully filtered generator calls
    pub failed_attempts: usize,
    pub elapsed: Duration,
}

impl RunMetadata {
    /// String-keyed view for callers that pass metadata along as JSON.
    pub fn metadata_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("actual_n".to_string(), Value::from(self.actual_n));
        map.insert("early_stopped".to_string(), Value::from(self.early_stopped));
        map.insert(
            "consensus".to_string(),
            self.consensus.map_or(Value::Null, Value::from),
        );
        map.insert("difficulty".to_string(), Value::from(self.difficulty.as_str()));
        map.insert("max_n".to_string(), Value::from(self.max_n));
        map.insert("batches".to_string(), Value::from(self.batches));
        map.insert(
            "failed_attempts".to_string(),
            Value::from(self.failed_attempts),
        );
        map.insert(
            "elapsed_ms".to_string(),
            Value::from(self.elapsed.as_millis() as u64),
        );
        map
    }
}

/// Successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfConsistencyOutcome {
    pub aggregation: Aggregation,
    /// Candidates in arrival order
    pub candidates: Vec<Candidate>,
    pub metadata: RunMetadata,
}

/// Difficulty-adaptive self-consistency sampler.
#[derive(Debug, Clone)]
pub struct AdaptiveSelfConsistency {
    config: AdaptiveConfig,
    aggregator: Arc<dyn Aggregator>,
    estimator: Arc<dyn DifficultyEstimator>,
    checker: ConsensusChecker,
    filter: CandidateFilter,
    event_bus: Option<EventBus>,
}

impl AdaptiveSelfConsistency {
    /// Create a sampler.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found by `AdaptiveConfig::validate`.
    pub fn new(
        config: AdaptiveConfig,
        aggregator: Arc<dyn Aggregator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            aggregator,
            estimator: Arc::new(HeuristicEstimator::new()),
            checker: ConsensusChecker::new(),
            filter: CandidateFilter::new(),
            event_bus: None,
        })
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn DifficultyEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Use `matcher` when measuring consensus.
    pub fn with_matcher(mut self, matcher: Arc<dyn CandidateMatcher>) -> Self {
        self.checker = ConsensusChecker::with_matcher(matcher);
        self
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &AdaptiveConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &Arc<dyn Aggregator> {
        &self.aggregator
    }

    /// Candidate cap for `level`, raised to `min_candidates` when the level
    /// table is lower.
    pub fn max_n_for_level(&self, level: DifficultyLevel) -> usize {
        self.config
            .level_caps
            .get(level)
            .max(self.config.min_candidates)
            .min(self.config.max_candidates)
    }

    /// Size of the next batch: `min(batch_size(level), max_n - current_n)`,
    /// zero once `current_n >= max_n`.
    pub fn adjust_n(&self, level: DifficultyLevel, current_n: usize, max_n: usize) -> usize {
        adjust_n(&self.config.batch_sizes, level, current_n, max_n)
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event);
        }
    }

    /// Answer or abstain on a finished run under `policy`.
    pub fn decide(
        &self,
        outcome: &SelfConsistencyOutcome,
        policy: &ExpectedValuePolicy,
    ) -> DecisionResult {
        let result = policy.decide_aggregation(&outcome.aggregation);
        debug!(
            decision = result.decision.as_str(),
            confidence = result.confidence,
            ev_answer = result.ev_answer,
            "Decision made"
        );
        self.emit(EngineEvent::decision_made(&result));
        result
    }

    /// Sample, check consensus, and aggregate.
    ///
    /// # Errors
    ///
    /// - `RunError::InvalidQuery` for a blank query
    /// - `RunError::GeneratorRequired` without a generator
    /// - `RunError::AllGeneratorsFailed` when nothing usable was produced
    /// - `RunError::InsufficientCandidates` below `min_candidates`
    /// - `RunError::Timeout` when the deadline passes
    pub async fn run(
        &self,
        query: &str,
        options: RunOptions,
    ) -> Result<SelfConsistencyOutcome, RunError> {
        if query.trim().is_empty() {
            return Err(RunError::InvalidQuery);
        }
        let generator = options.generator.ok_or(RunError::GeneratorRequired)?;

        let start = Instant::now();
        let deadline = self.config.timeout().map(|t| tokio::time::Instant::now() + t);

        let level = match options.difficulty {
            Some(level) => level,
            None => self.estimator.estimate(query).level(),
        };
        let max_n = self.max_n_for_level(level);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut attempts = 0usize;
        let mut failed_attempts = 0usize;
        let mut batches = 0usize;
        let mut consensus: Option<f64> = None;
        let mut early_stopped = false;

        debug!(level = %level, max_n, query_len = query.len(), "Starting adaptive run");

        loop {
            let size = self.adjust_n(level, candidates.len(), max_n);
            if size == 0 {
                break;
            }
            if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
                return Err(RunError::Timeout {
                    elapsed: start.elapsed(),
                });
            }

            batches += 1;
            self.emit(EngineEvent::batch_requested(batches, size, candidates.len()));
            debug!(batch = batches, size, collected = candidates.len(), "Requesting batch");

            let mut set = JoinSet::new();
            for i in 0..size {
                let generator = Arc::clone(&generator);
                let semaphore = Arc::clone(&semaphore);
                let query = query.to_string();
                let opts = GenerateOptions {
                    n: 1,
                    difficulty: Some(level),
                    attempt: attempts + i,
                    extra: options.extra.clone(),
                    ..GenerateOptions::default()
                };
                set.spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    (i, generator.generate(&query, &opts).await)
                });
            }
            attempts += size;

            let results = join_in_order(&mut set, size, deadline)
                .await
                .ok_or_else(|| RunError::Timeout {
                    elapsed: start.elapsed(),
                })?;

            let mut batch_successes = 0usize;
            for (i, result) in results.into_iter().enumerate() {
                let attempt = attempts - size + i;
                let generated = match result {
                    Some(Ok(generated)) => generated,
                    Some(Err(e)) => {
                        failed_attempts += 1;
                        warn!(attempt, reason = e.reason(), error = %e, "Generation failed");
                        self.emit(EngineEvent::generation_failed(attempt, e.reason()));
                        continue;
                    }
                    None => {
                        failed_attempts += 1;
                        warn!(attempt, "Generation task panicked");
                        self.emit(EngineEvent::generation_failed(attempt, "task_failed"));
                        continue;
                    }
                };

                let (kept, rejected) = self.filter.partition(generated.into_vec());
                for rejection in &rejected {
                    self.emit(EngineEvent::candidate_rejected(rejection.reason()));
                }
                if kept.is_empty() {
                    failed_attempts += 1;
                    continue;
                }
                for candidate in kept {
                    if candidates.len() >= max_n {
                        break;
                    }
                    let candidate = if candidate.id().is_empty() {
                        candidate.with_id(format!("candidate-{}", candidates.len()))
                    } else {
                        candidate
                    };
                    candidates.push(candidate);
                    batch_successes += 1;
                }
            }

            if failed_attempts > self.config.max_generation_failures {
                warn!(
                    failed_attempts,
                    limit = self.config.max_generation_failures,
                    "Generation failure budget exhausted"
                );
                break;
            }

            if batch_successes > 0 && candidates.len() >= self.config.min_candidates {
                if let Ok(report) = self.checker.check_consensus(&candidates) {
                    consensus = Some(report.agreement_ratio);
                    self.emit(EngineEvent::consensus_checked(
                        candidates.len(),
                        report.agreement_ratio,
                    ));
                    debug!(
                        collected = candidates.len(),
                        agreement = report.agreement_ratio,
                        "Consensus checked"
                    );
                    if report.agreement_ratio >= self.config.early_stop_threshold {
                        early_stopped = true;
                        break;
                    }
                }
            }
        }

        if candidates.is_empty() {
            return Err(RunError::AllGeneratorsFailed { attempts });
        }
        if candidates.len() < self.config.min_candidates {
            return Err(RunError::InsufficientCandidates {
                collected: candidates.len(),
                required: self.config.min_candidates,
            });
        }

        let aggregation = self.aggregator.aggregate(&candidates)?;
        let metadata = RunMetadata {
            actual_n: candidates.len(),
            early_stopped,
            consensus,
            difficulty: level,
            max_n,
            batches,
            failed_attempts,
            elapsed: start.elapsed(),
        };

        info!(
            actual_n = metadata.actual_n,
            early_stopped,
            consensus = ?consensus,
            level = %level,
            confidence = aggregation.confidence,
            "Adaptive run completed"
        );
        self.emit(EngineEvent::run_completed(
            metadata.actual_n,
            early_stopped,
            consensus,
            level,
            metadata.elapsed,
        ));

        Ok(SelfConsistencyOutcome {
            aggregation,
            candidates,
            metadata,
        })
    }
}

/// `min(batch_size(level), max_n - current_n)`, saturating at zero.
pub fn adjust_n(
    batch_sizes: &LevelTable,
    level: DifficultyLevel,
    current_n: usize,
    max_n: usize,
) -> usize {
    batch_sizes.get(level).min(max_n.saturating_sub(current_n))
}
