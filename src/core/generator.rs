//! Generator and Verifier Collaborators
//!
//! The engine never produces candidates itself. It calls a `Generator`
//! (typically an LLM client) and, during search, a `Verifier` that scores
//! candidates. Both are async capability traits returning boxed futures so
//! they can be shared as `Arc<dyn _>` and fanned out on a tokio `JoinSet`.
//!
//! Closure adapters (`FnGenerator`, `SyncFnGenerator`, `FnVerifier`) cover
//! the common case of plugging in a function; `MockGenerator` and
//! `MockVerifier` are scripted collaborators for tests and demos.

use crate::core::candidate::{Candidate, Metadata};
use crate::core::difficulty::DifficultyLevel;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Boxed, sendable future returned by collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Number of candidates requested from this call
    pub n: usize,
    /// Candidate being refined (search expansion)
    pub parent: Option<Candidate>,
    /// Search depth of the requested candidates (0 = initial)
    pub depth: usize,
    /// Difficulty level of the query, when known
    pub difficulty: Option<DifficultyLevel>,
    /// Zero-based index of this call within the current run
    pub attempt: usize,
    /// Caller-supplied passthrough data
    pub extra: Metadata,
}

impl GenerateOptions {
    pub fn with_n(mut self, n: usize) -> Self {
        self.n = n;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Successful generator output.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    /// A single candidate
    One(Candidate),
    /// Several candidates
    Many(Vec<Candidate>),
    /// The call succeeded but produced nothing usable
    Empty,
}

impl Generated {
    pub fn into_vec(self) -> Vec<Candidate> {
        match self {
            Generated::One(c) => vec![c],
            Generated::Many(cs) => cs,
            Generated::Empty => Vec::new(),
        }
    }
}

impl From<Candidate> for Generated {
    fn from(c: Candidate) -> Self {
        Generated::One(c)
    }
}

impl From<Vec<Candidate>> for Generated {
    fn from(cs: Vec<Candidate>) -> Self {
        Generated::Many(cs)
    }
}

impl From<Option<Candidate>> for Generated {
    fn from(c: Option<Candidate>) -> Self {
        c.map_or(Generated::Empty, Generated::One)
    }
}

/// A single generation call failed.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationError {
    /// The generator reported a failure
    Failed {
        /// Generator-supplied message
        message: String,
    },
    /// A rate limiter refused the call
    RateLimited {
        /// Time until the limit resets, when known
        retry_after: Option<Duration>,
    },
    /// The call did not finish before its deadline
    Timeout,
}

impl GenerationError {
    pub fn failed(message: impl Into<String>) -> Self {
        GenerationError::Failed {
            message: message.into(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            GenerationError::Failed { .. } => "generation_failed",
            GenerationError::RateLimited { .. } => "rate_limited",
            GenerationError::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Failed { message } => write!(f, "Generation failed: {}", message),
            GenerationError::RateLimited { retry_after } => match retry_after {
                Some(d) => write!(f, "Rate limited, retry after {:?}", d),
                None => write!(f, "Rate limited"),
            },
            GenerationError::Timeout => write!(f, "Generation timed out"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Produces candidate answers for a query.
pub trait Generator: Send + Sync {
    /// Generate candidates for `query`.
    fn generate<'a>(
        &'a self,
        query: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<Generated, GenerationError>>;
}

/// Async closure generator: `Fn(String, GenerateOptions) -> Future`.
pub struct FnGenerator<F> {
    f: F,
}

impl<F, Fut> FnGenerator<F>
where
    F: Fn(String, GenerateOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Generated, GenerationError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Generator for FnGenerator<F>
where
    F: Fn(String, GenerateOptions) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Generated, GenerationError>> + Send + 'static,
{
    fn generate<'a>(
        &'a self,
        query: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<Generated, GenerationError>> {
        Box::pin((self.f)(query.to_string(), opts.clone()))
    }
}

/// One-argument synchronous closure generator: `Fn(&str) -> Result<Generated, _>`.
pub struct SyncFnGenerator<F> {
    f: F,
}

impl<F> SyncFnGenerator<F>
where
    F: Fn(&str) -> Result<Generated, GenerationError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Generator for SyncFnGenerator<F>
where
    F: Fn(&str) -> Result<Generated, GenerationError> + Send + Sync,
{
    fn generate<'a>(
        &'a self,
        query: &'a str,
        _opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<Generated, GenerationError>> {
        let result = (self.f)(query);
        Box::pin(async move { result })
    }
}

/// Scripted generator for tests and demos.
///
/// Cycles through `responses`. The first `fail_first` calls fail; a call
/// with `opts.n > 1` returns that many candidates. With a parent candidate
/// the response is appended to the parent's content, which makes search
/// trees easy to follow.
#[derive(Debug, Clone)]
pub struct MockGenerator {
    responses: Vec<String>,
    index: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    fail_first: usize,
    always_fail: bool,
    delay: Option<Duration>,
    model: String,
}

impl MockGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            index: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(AtomicUsize::new(0)),
            fail_first: 0,
            always_fail: false,
            delay: None,
            model: "mock".to_string(),
        }
    }

    /// Generator that always returns `response`.
    pub fn constant(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    /// Generator whose every call fails.
    pub fn failing() -> Self {
        let mut g = Self::new(Vec::new());
        g.always_fail = true;
        g
    }

    /// Fail the first `n` calls, then succeed.
    pub fn with_failures(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total calls received, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_candidate(&self, parent: Option<&Candidate>) -> Candidate {
        let idx = self.index.fetch_add(1, Ordering::SeqCst);
        let response = &self.responses[idx % self.responses.len()];
        let content = match parent {
            Some(p) => format!("{}{}", p.content(), response),
            None => response.clone(),
        };
        Candidate::new(format!("mock-{}", idx), content).with_model(self.model.clone())
    }
}

impl Generator for MockGenerator {
    fn generate<'a>(
        &'a self,
        _query: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<Generated, GenerationError>> {
        Box::pin(async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            if self.always_fail || self.responses.is_empty() || call < self.fail_first {
                return Err(GenerationError::failed(format!("mock failure on call {}", call)));
            }
            if opts.n > 1 {
                let batch = (0..opts.n)
                    .map(|_| self.next_candidate(opts.parent.as_ref()))
                    .collect();
                Ok(Generated::Many(batch))
            } else {
                Ok(Generated::One(self.next_candidate(opts.parent.as_ref())))
            }
        })
    }
}

/// Context passed to a verifier.
#[derive(Debug, Clone, Default)]
pub struct VerifyContext {
    /// Original prompt
    pub prompt: String,
    /// Depth of the candidate being verified
    pub depth: usize,
    /// Parent the candidate was expanded from
    pub parent: Option<Candidate>,
    pub metadata: Metadata,
}

/// Verifier output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerificationResult {
    /// Quality score, typically in `[0, 1]`; `None` when the verifier
    /// could not score the candidate
    pub score: Option<f64>,
    pub reasoning: Option<String>,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub metadata: Metadata,
}

impl VerificationResult {
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// A verification call failed.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationError {
    Failed {
        /// Verifier-supplied message
        message: String,
    },
    Timeout,
}

impl VerificationError {
    pub fn failed(message: impl Into<String>) -> Self {
        VerificationError::Failed {
            message: message.into(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            VerificationError::Failed { .. } => "verification_failed",
            VerificationError::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for VerificationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationError::Failed { message } => {
                write!(f, "Verification failed: {}", message)
            }
            VerificationError::Timeout => write!(f, "Verification timed out"),
        }
    }
}

impl std::error::Error for VerificationError {}

/// Scores candidates.
pub trait Verifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        candidate: &'a Candidate,
        context: &'a VerifyContext,
    ) -> BoxFuture<'a, Result<VerificationResult, VerificationError>>;
}

/// Synchronous closure verifier.
pub struct FnVerifier<F> {
    f: F,
}

impl<F> FnVerifier<F>
where
    F: Fn(&Candidate, &VerifyContext) -> Result<VerificationResult, VerificationError>
        + Send
        + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Verifier for FnVerifier<F>
where
    F: Fn(&Candidate, &VerifyContext) -> Result<VerificationResult, VerificationError>
        + Send
        + Sync,
{
    fn verify<'a>(
        &'a self,
        candidate: &'a Candidate,
        context: &'a VerifyContext,
    ) -> BoxFuture<'a, Result<VerificationResult, VerificationError>> {
        let result = (self.f)(candidate, context);
        Box::pin(async move { result })
    }
}

/// Scripted verifier for tests and demos.
///
/// Scores a candidate by the fraction of `target` characters its content
/// matches position by position, unless an explicit score was registered
/// for that exact content.
#[derive(Debug, Clone)]
pub struct MockVerifier {
    target: String,
    scores: HashMap<String, f64>,
    failing: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl MockVerifier {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            scores: HashMap::new(),
            failing: HashSet::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_score(mut self, content: impl Into<String>, score: f64) -> Self {
        self.scores.insert(content.into(), score);
        self
    }

    /// Fail verification of candidates with exactly this content.
    pub fn with_failure(mut self, content: impl Into<String>) -> Self {
        self.failing.insert(content.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn similarity(&self, content: &str) -> f64 {
        let len = self.target.chars().count();
        if len == 0 {
            return 0.0;
        }
        let matching = self
            .target
            .chars()
            .zip(content.chars())
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / len.max(content.chars().count()) as f64
    }
}

impl Verifier for MockVerifier {
    fn verify<'a>(
        &'a self,
        candidate: &'a Candidate,
        _context: &'a VerifyContext,
    ) -> BoxFuture<'a, Result<VerificationResult, VerificationError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let content = candidate.content();
            if self.failing.contains(content) {
                return Err(VerificationError::failed(format!(
                    "mock rejected {}",
                    candidate.id()
                )));
            }
            let score = self
                .scores
                .get(content)
                .copied()
                .unwrap_or_else(|| self.similarity(content));
            Ok(VerificationResult::scored(score))
        })
    }
}
