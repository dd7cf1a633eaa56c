//! accuracy-cli - command-line front end for the accuracy engine
//!
//! Thin surface over the library: difficulty estimation, aggregation of a
//! candidate file, critique of a verifier score, and a full adaptive
//! self-consistency run against a sandboxed command acting as generator.

use accuracy::config::EngineConfig;
use accuracy::core::{
    Candidate, CritiqueResult, DifficultyEstimator, DifficultyLevel, ExpectedValuePolicy,
    HeuristicEstimator, RunOptions, VerificationResult,
};
use accuracy::services::CommandGenerator;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{self, Read};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Accuracy engine CLI - adaptive sampling, aggregation and answer/abstain decisions
#[derive(Parser)]
#[command(name = "accuracy-cli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate_config: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output for programmatic use
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Easy,
    Medium,
    Hard,
}

impl From<LevelArg> for DifficultyLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Easy => DifficultyLevel::Easy,
            LevelArg::Medium => DifficultyLevel::Medium,
            LevelArg::Hard => DifficultyLevel::Hard,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate the difficulty of a query
    Difficulty {
        /// The query (or - for stdin)
        query: Option<String>,
    },

    /// Aggregate a JSON array of candidates
    Aggregate {
        /// majority_vote, best_of_n or weighted (defaults to the configured strategy)
        #[arg(short, long)]
        strategy: Option<String>,

        /// File holding the candidates (stdin when absent)
        #[arg(long)]
        file: Option<String>,
    },

    /// Turn a verifier score into critique feedback
    Critique {
        /// Verifier score in [0, 1]
        #[arg(short, long)]
        score: Option<f64>,

        /// Verifier reasoning
        #[arg(short, long)]
        reasoning: Option<String>,

        /// Issue found by the verifier (repeatable)
        #[arg(short, long = "issue")]
        issues: Vec<String>,
    },

    /// Run adaptive self-consistency with a command as the generator
    Run {
        /// The query (or - for stdin)
        #[arg(short, long)]
        query: Option<String>,

        /// Generator program; receives the query on stdin
        #[arg(long)]
        command: String,

        /// Argument passed to the generator program (repeatable)
        #[arg(long = "arg", allow_hyphen_values = true)]
        args: Vec<String>,

        /// Skip difficulty estimation and use this level
        #[arg(short, long, value_enum)]
        difficulty: Option<LevelArg>,
    },
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
struct AggregateResponse {
    answer: String,
    confidence: f64,
    strategy: String,
    decision: String,
    ev_answer: f64,
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Serialize)]
struct CritiqueResponse {
    severity: f64,
    severity_level: String,
    actionable: bool,
    should_refine: bool,
    issues: Vec<String>,
    suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feedback: Option<String>,
}

#[derive(Serialize)]
struct RunResponse {
    answer: String,
    confidence: f64,
    decision: String,
    difficulty: String,
    actual_n: usize,
    max_n: usize,
    early_stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    consensus: Option<f64>,
    batches: usize,
    failed_attempts: usize,
    elapsed_ms: u64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if cli.validate_config {
        println!("Configuration is valid.");
        return ExitCode::SUCCESS;
    }

    let command = match cli.command {
        Some(cmd) => cmd,
        None => {
            eprintln!("Error: a subcommand is required (see --help)");
            return ExitCode::from(2);
        }
    };

    let result = match command {
        Commands::Difficulty { query } => execute_difficulty(cli.format, query),
        Commands::Aggregate { strategy, file } => {
            execute_aggregate(cli.format, &config, strategy, file)
        }
        Commands::Critique {
            score,
            reasoning,
            issues,
        } => execute_critique(cli.format, score, reasoning, issues),
        Commands::Run {
            query,
            command,
            args,
            difficulty,
        } => execute_run(cli.format, &config, query, command, args, difficulty),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn load_config(path: Option<&str>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => {
            EngineConfig::from_path(path).map_err(|e| format!("{} ({})", e, e.reason()))
        }
        None => Ok(EngineConfig::default()),
    }
}

fn execute_difficulty(format: OutputFormat, query: Option<String>) -> Result<(), String> {
    let query = get_input(query, "query")?;
    if query.trim().is_empty() {
        return Err("query cannot be empty".to_string());
    }
    let estimate = HeuristicEstimator::new().estimate(&query);
    output_response(format, &estimate.to_map())
}

fn execute_aggregate(
    format: OutputFormat,
    config: &EngineConfig,
    strategy: Option<String>,
    file: Option<String>,
) -> Result<(), String> {
    let raw = match file {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path, e))?,
        None => get_input(None, "candidates")?,
    };
    let candidates = parse_candidates(&raw)?;

    let mut aggregator_config = config.aggregator.clone();
    if let Some(strategy) = strategy {
        if strategy != aggregator_config.strategy {
            aggregator_config.weights = None;
        }
        aggregator_config.strategy = strategy;
    }
    let aggregator = aggregator_config
        .build()
        .map_err(|e| format!("{} ({})", e, e.reason()))?;

    let aggregation = aggregator
        .aggregate(&candidates)
        .map_err(|e| format!("{} ({})", e, e.reason()))?;
    let decision = ExpectedValuePolicy::default().decide_aggregation(&aggregation);

    let response = AggregateResponse {
        answer: aggregation.answer,
        confidence: aggregation.confidence,
        strategy: aggregator.name().to_string(),
        decision: decision.decision.as_str().to_string(),
        ev_answer: decision.ev_answer,
        metadata: aggregation.metadata.into_iter().collect(),
    };
    output_response(format, &response)
}

/// Accepts `["a", "b"]` as well as full candidate objects.
fn parse_candidates(raw: &str) -> Result<Vec<Candidate>, String> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| format!("Candidates must be a JSON array: {}", e))?;
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| match value {
            serde_json::Value::String(content) => {
                Ok(Candidate::new(format!("candidate-{}", i), content))
            }
            other => {
                let candidate: Candidate = serde_json::from_value(other)
                    .map_err(|e| format!("Invalid candidate at index {}: {}", i, e))?;
                if candidate.id().is_empty() {
                    Ok(candidate.with_id(format!("candidate-{}", i)))
                } else {
                    Ok(candidate)
                }
            }
        })
        .collect()
}

fn execute_critique(
    format: OutputFormat,
    score: Option<f64>,
    reasoning: Option<String>,
    issues: Vec<String>,
) -> Result<(), String> {
    let verification = VerificationResult {
        score,
        reasoning,
        issues,
        ..VerificationResult::default()
    };
    let critique = CritiqueResult::from_verification_result(&verification);

    let response = CritiqueResponse {
        severity: critique.severity(),
        severity_level: critique.severity_level().as_str().to_string(),
        actionable: critique.is_actionable(),
        should_refine: critique.should_refine(),
        issues: critique.issues().to_vec(),
        suggestions: critique.suggestions().to_vec(),
        feedback: critique.feedback().map(str::to_string),
    };
    output_response(format, &response)
}

fn execute_run(
    format: OutputFormat,
    config: &EngineConfig,
    query: Option<String>,
    command: String,
    args: Vec<String>,
    difficulty: Option<LevelArg>,
) -> Result<(), String> {
    let query = get_input(query, "query")?;
    let engine = config
        .build_adaptive()
        .map_err(|e| format!("{} ({})", e, e.reason()))?;
    let sandbox = config
        .build_sandbox()
        .map_err(|e| format!("{} ({})", e, e.reason()))?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    let outcome = runtime.block_on(async {
        let generator = CommandGenerator::new(Arc::new(sandbox), command).with_args(args);
        let generator = config
            .limit_generator(Arc::new(generator))
            .await
            .map_err(|e| format!("{} ({})", e, e.reason()))?;
        let mut opts = RunOptions::new(generator);
        if let Some(level) = difficulty {
            opts = opts.with_difficulty(level.into());
        }
        engine
            .run(&query, opts)
            .await
            .map_err(|e| format!("{} ({})", e, e.reason()))
    })?;

    let decision = engine.decide(&outcome, &ExpectedValuePolicy::default());
    let meta = &outcome.metadata;
    let response = RunResponse {
        answer: outcome.aggregation.answer.clone(),
        confidence: outcome.aggregation.confidence,
        decision: decision.decision.as_str().to_string(),
        difficulty: meta.difficulty.as_str().to_string(),
        actual_n: meta.actual_n,
        max_n: meta.max_n,
        early_stopped: meta.early_stopped,
        consensus: meta.consensus,
        batches: meta.batches,
        failed_attempts: meta.failed_attempts,
        elapsed_ms: meta.elapsed.as_millis() as u64,
    };
    output_response(format, &response)
}

// ============================================================================
// Helpers
// ============================================================================

fn get_input(arg: Option<String>, name: &str) -> Result<String, String> {
    match arg {
        Some(s) if s != "-" => Ok(s),
        _ => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .map_err(|e| format!("Failed to read {} from stdin: {}", name, e))?;
            Ok(input.trim().to_string())
        }
    }
}

fn output_response<T: Serialize>(format: OutputFormat, response: &T) -> Result<(), String> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(response)
                .map_err(|e| format!("Failed to serialize response: {}", e))?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            let value = serde_json::to_value(response)
                .map_err(|e| format!("Failed to serialize response: {}", e))?;
            print_value(&value, 0);
        }
    }
    Ok(())
}

/// Objects print as `key: value` lines, arrays as bullets; nesting indents.
fn print_value(value: &serde_json::Value, indent: usize) {
    let prefix = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map {
                match val {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}{}:", prefix, key);
                        print_value(val, indent + 1);
                    }
                    _ => println!("{}{}: {}", prefix, key, format_simple_value(val)),
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for (i, val) in arr.iter().enumerate() {
                match val {
                    serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                        println!("{}[{}]:", prefix, i);
                        print_value(val, indent + 1);
                    }
                    _ => println!("{}- {}", prefix, format_simple_value(val)),
                }
            }
        }
        _ => println!("{}{}", prefix, format_simple_value(value)),
    }
}

fn format_simple_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}
