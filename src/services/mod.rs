//! Boundary services around the engine
//!
//! - `rate_limiter`: per-key fixed-window throttling actor
//! - `sandbox`: allowlisted command execution and command-backed collaborators

pub mod rate_limiter;
pub mod sandbox;

pub use rate_limiter::{
    RateLimitConfig, RateLimitError, RateLimitStatus, RateLimitedGenerator, RateLimiter,
    RateLimiterHandle, DEFAULT_RATE_LIMIT_KEY,
};
pub use sandbox::{
    CommandGenerator, CommandOutput, CommandSandbox, CommandVerifier, RunCommandOptions,
    SandboxConfig, SandboxError,
};
