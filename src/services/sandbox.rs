//! Sandboxed command execution
//!
//! `CommandSandbox` runs external programs under an allowlist, an optional
//! working directory check, a wall-clock timeout and a stdout size cap.
//! `CommandGenerator` and `CommandVerifier` expose a command as a
//! `Generator` or `Verifier`: the query (or candidate content) goes to the
//! program's stdin and its stdout is read back.

use crate::core::candidate::Candidate;
use crate::core::generator::{
    BoxFuture, GenerateOptions, Generated, GenerationError, Generator, VerificationError,
    VerificationResult, Verifier, VerifyContext,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

/// Default wall-clock limit for one command
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;

/// Default stdout cap (1 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Programs allowed when no allowlist is configured
pub const DEFAULT_ALLOWED_COMMANDS: [&str; 6] = ["echo", "cat", "python3", "node", "ruby", "wc"];

/// Sandbox policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Program names that may be run
    pub allowed_commands: Vec<String>,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
            timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl SandboxConfig {
    pub fn with_allowed(mut self, command: impl Into<String>) -> Self {
        self.allowed_commands.push(command.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_output_bytes(mut self, limit: usize) -> Self {
        self.max_output_bytes = limit;
        self
    }

    pub fn validate(&self) -> Result<(), SandboxError> {
        if self.timeout_ms == 0 {
            return Err(SandboxError::InvalidConfig {
                message: "timeout_ms must be > 0".to_string(),
            });
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::InvalidConfig {
                message: "max_output_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Per-call options for `run_command`.
#[derive(Debug, Clone, Default)]
pub struct RunCommandOptions {
    pub cwd: Option<PathBuf>,
    /// Written to the program's stdin, then closed
    pub stdin: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Overrides the sandbox timeout
    pub timeout: Option<Duration>,
    /// Skip the allowlist. Only for trusted internal callers.
    pub bypass_allowlist: bool,
}

impl RunCommandOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn bypass_allowlist(mut self) -> Self {
        self.bypass_allowlist = true;
        self
    }
}

/// Result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// -1 when the process was terminated by a signal
    pub exit_code: i32,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxError {
    CommandNotAllowed { command: String },
    DirectoryNotFound { path: String },
    Timeout { limit: Duration },
    OutputTooLarge { limit: usize },
    SpawnFailed { message: String },
    InvalidConfig { message: String },
}

impl SandboxError {
    pub fn reason(&self) -> &'static str {
        match self {
            SandboxError::CommandNotAllowed { .. } => "command_not_allowed",
            SandboxError::DirectoryNotFound { .. } => "directory_not_found",
            SandboxError::Timeout { .. } => "timeout",
            SandboxError::OutputTooLarge { .. } => "output_too_large",
            SandboxError::SpawnFailed { .. } => "spawn_failed",
            SandboxError::InvalidConfig { .. } => "invalid_config",
        }
    }
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxError::CommandNotAllowed { command } => {
                write!(f, "Command not allowed: {}", command)
            }
            SandboxError::DirectoryNotFound { path } => {
                write!(f, "Working directory not found: {}", path)
            }
            SandboxError::Timeout { limit } => write!(f, "Command timed out after {:?}", limit),
            SandboxError::OutputTooLarge { limit } => {
                write!(f, "Command output exceeded {} bytes", limit)
            }
            SandboxError::SpawnFailed { message } => {
                write!(f, "Failed to start command: {}", message)
            }
            SandboxError::InvalidConfig { message } => {
                write!(f, "Invalid sandbox configuration: {}", message)
            }
        }
    }
}

impl std::error::Error for SandboxError {}

impl From<SandboxError> for GenerationError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Timeout { .. } => GenerationError::Timeout,
            other => GenerationError::failed(other.to_string()),
        }
    }
}

impl From<SandboxError> for VerificationError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Timeout { .. } => VerificationError::Timeout,
            other => VerificationError::failed(other.to_string()),
        }
    }
}

/// Runs allowlisted programs with bounded time and output.
#[derive(Debug, Clone, Default)]
pub struct CommandSandbox {
    config: SandboxConfig,
}

impl CommandSandbox {
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn is_allowed(&self, command: &str) -> bool {
        !command.contains('\0') && self.config.allowed_commands.iter().any(|c| c == command)
    }

    /// Run `command` with `args` and capture its stdout.
    ///
    /// A non-zero exit status is reported in `CommandOutput`, not as an
    /// error. Stderr is discarded.
    pub async fn run_command(
        &self,
        command: &str,
        args: &[String],
        opts: RunCommandOptions,
    ) -> Result<CommandOutput, SandboxError> {
        if !opts.bypass_allowlist && !self.is_allowed(command) {
            warn!(command, "Command rejected by allowlist");
            return Err(SandboxError::CommandNotAllowed {
                command: command.to_string(),
            });
        }
        if let Some(cwd) = &opts.cwd {
            check_directory(cwd).await?;
        }

        let limit = opts
            .timeout
            .unwrap_or_else(|| Duration::from_millis(self.config.timeout_ms));
        debug!(command, args = ?args, timeout_ms = limit.as_millis() as u64, "Running command");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .envs(&opts.env)
            .stdin(if opts.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(cwd) = &opts.cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd.spawn().map_err(|e| SandboxError::SpawnFailed {
            message: e.to_string(),
        })?;

        match tokio::time::timeout(limit, self.collect(child, opts.stdin)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(command, timeout_ms = limit.as_millis() as u64, "Command timed out");
                Err(SandboxError::Timeout { limit })
            }
        }
    }

    async fn collect(
        &self,
        mut child: tokio::process::Child,
        input: Option<String>,
    ) -> Result<CommandOutput, SandboxError> {
        let limit = self.config.max_output_bytes;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();

        let write = async move {
            if let (Some(mut pipe), Some(input)) = (stdin, input) {
                // the program may exit without reading its input
                let _ = pipe.write_all(input.as_bytes()).await;
            }
        };
        let read = async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout {
                pipe.take(limit as u64 + 1).read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let ((), read) = tokio::join!(write, read);
        let buf = read.map_err(|e| SandboxError::SpawnFailed {
            message: e.to_string(),
        })?;

        if buf.len() > limit {
            let _ = child.kill().await;
            return Err(SandboxError::OutputTooLarge { limit });
        }

        let status = child.wait().await.map_err(|e| SandboxError::SpawnFailed {
            message: e.to_string(),
        })?;
        Ok(CommandOutput {
            exit_code: status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&buf).into_owned(),
        })
    }
}

async fn check_directory(path: &Path) -> Result<(), SandboxError> {
    let display = path.to_string_lossy().into_owned();
    if display.contains('\0') {
        return Err(SandboxError::DirectoryNotFound { path: display });
    }
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        _ => Err(SandboxError::DirectoryNotFound { path: display }),
    }
}

/// A command used as a candidate generator.
///
/// The query is written to stdin; trimmed stdout becomes the candidate.
/// During search the parent content and depth are passed as
/// `ACCURACY_PARENT` and `ACCURACY_DEPTH`.
#[derive(Debug)]
pub struct CommandGenerator {
    sandbox: Arc<CommandSandbox>,
    command: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    counter: AtomicUsize,
}

impl CommandGenerator {
    pub fn new(sandbox: Arc<CommandSandbox>, command: impl Into<String>) -> Self {
        Self {
            sandbox,
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    async fn run_once(
        &self,
        query: &str,
        opts: &GenerateOptions,
    ) -> Result<Candidate, GenerationError> {
        let mut run = RunCommandOptions::new()
            .with_stdin(query)
            .with_env("ACCURACY_DEPTH", opts.depth.to_string());
        if let Some(parent) = &opts.parent {
            run = run.with_env("ACCURACY_PARENT", parent.content());
        }
        if let Some(cwd) = &self.cwd {
            run = run.with_cwd(cwd.clone());
        }

        let output = self
            .sandbox
            .run_command(&self.command, &self.args, run)
            .await?;
        if !output.success() {
            return Err(GenerationError::failed(format!(
                "{} exited with status {}",
                self.command, output.exit_code
            )));
        }
        let idx = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Candidate::new(format!("cmd-{}", idx), output.stdout.trim())
            .with_model(self.command.clone()))
    }
}

impl Generator for CommandGenerator {
    fn generate<'a>(
        &'a self,
        query: &'a str,
        opts: &'a GenerateOptions,
    ) -> BoxFuture<'a, Result<Generated, GenerationError>> {
        Box::pin(async move {
            if opts.n <= 1 {
                return Ok(Generated::One(self.run_once(query, opts).await?));
            }
            let mut batch = Vec::with_capacity(opts.n);
            for _ in 0..opts.n {
                batch.push(self.run_once(query, opts).await?);
            }
            Ok(Generated::Many(batch))
        })
    }
}

/// A command used as a verifier.
///
/// Candidate content is written to stdin. Stdout is either a bare number
/// (the score) or a JSON object with `score`, `reasoning`, `issues` and
/// `suggestions`. Anything else yields an unscored result.
#[derive(Debug)]
pub struct CommandVerifier {
    sandbox: Arc<CommandSandbox>,
    command: String,
    args: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerifierReport {
    score: Option<f64>,
    reasoning: Option<String>,
    issues: Vec<String>,
    suggestions: Vec<String>,
}

impl CommandVerifier {
    pub fn new(sandbox: Arc<CommandSandbox>, command: impl Into<String>) -> Self {
        Self {
            sandbox,
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Parse verifier stdout into a result.
pub fn parse_verifier_output(stdout: &str) -> VerificationResult {
    let trimmed = stdout.trim();
    if let Ok(score) = trimmed.parse::<f64>() {
        return VerificationResult::scored(score);
    }
    match serde_json::from_str::<VerifierReport>(trimmed) {
        Ok(report) => VerificationResult {
            score: report.score,
            reasoning: report.reasoning,
            issues: report.issues,
            suggestions: report.suggestions,
            ..VerificationResult::default()
        },
        Err(_) => VerificationResult {
            reasoning: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            ..VerificationResult::default()
        },
    }
}

impl Verifier for CommandVerifier {
    fn verify<'a>(
        &'a self,
        candidate: &'a Candidate,
        context: &'a VerifyContext,
    ) -> BoxFuture<'a, Result<VerificationResult, VerificationError>> {
        Box::pin(async move {
            let run = RunCommandOptions::new()
                .with_stdin(candidate.content())
                .with_env("ACCURACY_PROMPT", context.prompt.as_str())
                .with_env("ACCURACY_DEPTH", context.depth.to_string());
            let output = self
                .sandbox
                .run_command(&self.command, &self.args, run)
                .await?;
            if !output.success() {
                return Err(VerificationError::failed(format!(
                    "{} exited with status {}",
                    self.command, output.exit_code
                )));
            }
            Ok(parse_verifier_output(&output.stdout))
        })
    }
}
