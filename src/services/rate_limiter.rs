//! Per-key request throttling
//!
//! A single actor task owns the window table; callers talk to it through a
//! cloneable `RateLimiterHandle`. Each configured key gets a fixed window of
//! `window_ms` admitting at most `max_requests` calls. Keys that were never
//! configured are unlimited.
//!
//! A handle whose actor has stopped never blocks callers: `allow_request`
//! admits the call and `status` reports `RateLimitStatus::unlimited()`.

use crate::core::generator::{BoxFuture, GenerateOptions, Generated, GenerationError, Generator};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Key used by `RateLimitedGenerator` when none is given
pub const DEFAULT_RATE_LIMIT_KEY: &str = "generator";

/// Queue depth of the actor's command channel
const COMMAND_BUFFER: usize = 64;

/// Limit for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Calls admitted per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.max_requests == 0 {
            return Err(RateLimitError::InvalidMaxRequests);
        }
        if self.window_ms == 0 {
            return Err(RateLimitError::InvalidWindow);
        }
        Ok(())
    }

    fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Remaining allowance for a key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStatus {
    /// Calls left in the current window
    pub remaining: u32,
    /// When the current window ends
    pub reset_at: SystemTime,
    /// Whether the key is limited at all
    pub limited: bool,
}

impl RateLimitStatus {
    /// Status of an unconfigured key, or of a stopped limiter.
    pub fn unlimited() -> Self {
        Self {
            remaining: u32::MAX,
            reset_at: SystemTime::now(),
            limited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitError {
    /// The key has used its allowance for the current window
    RateLimited { key: String, retry_after: Duration },
    InvalidMaxRequests,
    InvalidWindow,
}

impl RateLimitError {
    pub fn reason(&self) -> &'static str {
        match self {
            RateLimitError::RateLimited { .. } => "rate_limited",
            RateLimitError::InvalidMaxRequests => "invalid_max_requests",
            RateLimitError::InvalidWindow => "invalid_window",
        }
    }
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitError::RateLimited { key, retry_after } => {
                write!(f, "Rate limit reached for '{}', retry after {:?}", key, retry_after)
            }
            RateLimitError::InvalidMaxRequests => write!(f, "max_requests must be > 0"),
            RateLimitError::InvalidWindow => write!(f, "window_ms must be > 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

#[derive(Debug)]
struct Window {
    config: RateLimitConfig,
    count: u32,
    window_start: Instant,
}

impl Window {
    fn new(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            config,
            count: 0,
            window_start: now,
        }
    }

    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.config.window() {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn time_left(&self, now: Instant) -> Duration {
        (self.window_start + self.config.window()).saturating_duration_since(now)
    }
}

enum Command {
    Configure {
        key: String,
        config: RateLimitConfig,
    },
    Allow {
        key: String,
        reply: oneshot::Sender<Result<(), RateLimitError>>,
    },
    Status {
        key: String,
        reply: oneshot::Sender<RateLimitStatus>,
    },
    Shutdown,
}

/// Actor state: key → fixed window.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: HashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the actor on the current runtime.
    pub fn spawn(self) -> (RateLimiterHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let task = tokio::spawn(self.run(receiver));
        (RateLimiterHandle { sender }, task)
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<Command>) {
        while let Some(command) = receiver.recv().await {
            let now = Instant::now();
            match command {
                Command::Configure { key, config } => {
                    debug!(
                        key = %key,
                        max_requests = config.max_requests,
                        window_ms = config.window_ms,
                        "Rate limit configured"
                    );
                    self.windows.insert(key, Window::new(config, now));
                }
                Command::Allow { key, reply } => {
                    let _ = reply.send(self.allow(&key, now));
                }
                Command::Status { key, reply } => {
                    let _ = reply.send(self.status(&key, now));
                }
                Command::Shutdown => break,
            }
        }
        debug!("Rate limiter stopped");
    }

    fn allow(&mut self, key: &str, now: Instant) -> Result<(), RateLimitError> {
        let Some(window) = self.windows.get_mut(key) else {
            return Ok(());
        };
        window.roll(now);
        if window.count < window.config.max_requests {
            window.count += 1;
            Ok(())
        } else {
            Err(RateLimitError::RateLimited {
                key: key.to_string(),
                retry_after: window.time_left(now),
            })
        }
    }

    fn status(&mut self, key: &str, now: Instant) -> RateLimitStatus {
        let Some(window) = self.windows.get_mut(key) else {
            return RateLimitStatus::unlimited();
        };
        window.roll(now);
        RateLimitStatus {
            remaining: window.config.max_requests.saturating_sub(window.count),
            reset_at: SystemTime::now() + window.time_left(now),
            limited: true,
        }
    }
}

/// Cloneable client of a running `RateLimiter`.
#[derive(Debug, Clone)]
pub struct RateLimiterHandle {
    sender: mpsc::Sender<Command>,
}

impl RateLimiterHandle {
    /// Set (or replace) the limit for `key`, starting a fresh window.
    pub async fn configure(
        &self,
        key: impl Into<String>,
        config: RateLimitConfig,
    ) -> Result<(), RateLimitError> {
        config.validate()?;
        let key = key.into();
        if self
            .sender
            .send(Command::Configure { key, config })
            .await
            .is_err()
        {
            warn!("Rate limiter not running, configuration ignored");
        }
        Ok(())
    }

    /// Admit or refuse one call for `key`.
    pub async fn allow_request(&self, key: &str) -> Result<(), RateLimitError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Allow {
            key: key.to_string(),
            reply,
        };
        if self.sender.send(command).await.is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }

    pub async fn status(&self, key: &str) -> RateLimitStatus {
        let (reply, rx) = oneshot::channel();
        let command = Command::Status {
            key: key.to_string(),
            reply,
        };
        if self.sender.send(command).await.is_err() {
            return RateLimitStatus::unlimited();
        }
        rx.await.unwrap_or_else(|_| RateLimitStatus::unlimited())
    }

    /// Stop the actor. Later calls degrade to unlimited.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown).await;
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// Generator decorator that asks a rate limiter before every call.
pub struct RateLimitedGenerator {
    inner: Arc<dyn Generator>,
    limiter: RateLimiterHandle,
    key: String,
}

impl RateLimitedGenerator {
    pub fn new(inner: Arc<dyn Generator>, limiter: RateLimiterHandle) -> Self {
        Self {
            inner,
            limiter,
            key: DEFAULT_RATE_LIMIT_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl Generator for RateLimitedGenerator {
    fn generate<'a>(
        &'a self,
        query: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<Generated, GenerationError>> {
        Box::pin(async move {
            match self.limiter.allow_request(&self.key).await {
                Ok(()) => self.inner.generate(query, opts).await,
                Err(RateLimitError::RateLimited { retry_after, .. }) => {
                    Err(GenerationError::RateLimited {
                        retry_after: Some(retry_after),
                    })
                }
                Err(_) => Err(GenerationError::RateLimited { retry_after: None }),
            }
        })
    }
}
