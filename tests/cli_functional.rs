//! CLI Functional Tests for the accuracy engine
//!
//! These tests validate accuracy-cli by spawning the actual binary as a
//! subprocess. They test real-world CLI usage patterns.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test cli_functional
//! ```

use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

/// Path to the accuracy-cli binary built for this test run
fn cli_binary_path() -> &'static str {
    env!("CARGO_BIN_EXE_accuracy-cli")
}

/// Run accuracy-cli with the given arguments
fn run_cli(args: &[&str]) -> Output {
    Command::new(cli_binary_path())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("Failed to execute accuracy-cli")
}

/// Run accuracy-cli with `input` piped to stdin
fn run_cli_with_stdin(args: &[&str], input: &str) -> Output {
    let mut child = Command::new(cli_binary_path())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn accuracy-cli");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(input.as_bytes())
        .expect("Failed to write stdin");
    child.wait_with_output().expect("Failed to wait for accuracy-cli")
}

/// Write `contents` to a file unique to this test
fn temp_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("accuracy-cli-{}-{}", std::process::id(), name));
    std::fs::write(&path, contents).expect("Failed to write temp file");
    path
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

// ============================================================================
// Response Types for JSON Parsing
// ============================================================================

#[derive(Debug, Deserialize)]
struct DifficultyResponse {
    level: String,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    answer: String,
    confidence: f64,
    strategy: String,
    decision: String,
}

#[derive(Debug, Deserialize)]
struct CritiqueResponse {
    severity: f64,
    actionable: bool,
    should_refine: bool,
    issues: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    answer: String,
    decision: String,
    difficulty: String,
    actual_n: usize,
    early_stopped: bool,
    consensus: Option<f64>,
}

// ============================================================================
// Test 1: Difficulty Command
// ============================================================================

#[test]
fn test_cli_difficulty_json() {
    let output = run_cli(&["--format", "json", "difficulty", "hi"]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let response: DifficultyResponse =
        serde_json::from_str(&stdout_of(&output)).expect("Failed to parse difficulty JSON");
    assert_eq!(response.level, "easy");
    assert!(response.score.is_some());
}

#[test]
fn test_cli_difficulty_from_stdin() {
    let output = run_cli_with_stdin(&["--format", "json", "difficulty", "-"], "hi\n");
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    let response: DifficultyResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(response.level, "easy");
}

#[test]
fn test_cli_difficulty_rejects_blank_query() {
    let output = run_cli(&["difficulty", "   "]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("query cannot be empty"));
}

#[test]
fn test_cli_difficulty_text_output() {
    let output = run_cli(&["difficulty", "hi"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("level: easy"));
}

// ============================================================================
// Test 2: Aggregate Command
// ============================================================================

#[test]
fn test_cli_aggregate_majority_from_file() {
    let path = temp_file("majority.json", r#"["4", "4", "5"]"#);
    let output = run_cli(&[
        "--format",
        "json",
        "aggregate",
        "--file",
        path.to_str().unwrap(),
    ]);
    let _ = std::fs::remove_file(&path);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let response: AggregateResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(response.answer, "4");
    assert_eq!(response.strategy, "majority_vote");
    assert!((response.confidence - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(response.decision, "answer");
}

#[test]
fn test_cli_aggregate_best_of_n_from_stdin() {
    let input = r#"[
        {"id": "a", "content": "rough", "score": 0.4},
        {"id": "b", "content": "polished", "score": 0.9}
    ]"#;
    let output = run_cli_with_stdin(
        &["--format", "json", "aggregate", "--strategy", "best_of_n"],
        input,
    );
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let response: AggregateResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(response.answer, "polished");
    assert_eq!(response.strategy, "best_of_n");
}

#[test]
fn test_cli_aggregate_unknown_strategy() {
    let output = run_cli_with_stdin(&["aggregate", "--strategy", "coin_flip"], r#"["a"]"#);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("aggregator_must_implement_aggregate"));
}

#[test]
fn test_cli_aggregate_empty_array() {
    let output = run_cli_with_stdin(&["aggregate"], "[]");
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("no_candidates"));
}

#[test]
fn test_cli_aggregate_malformed_input() {
    let output = run_cli_with_stdin(&["aggregate"], "not json");
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("JSON array"));
}

// ============================================================================
// Test 3: Critique Command
// ============================================================================

#[test]
fn test_cli_critique_high_score() {
    let output = run_cli(&["--format", "json", "critique", "--score", "0.9"]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let response: CritiqueResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert!((response.severity - 0.1).abs() < 1e-9);
    assert!(!response.actionable);
    assert!(!response.should_refine);
}

#[test]
fn test_cli_critique_with_issues() {
    let output = run_cli(&[
        "--format",
        "json",
        "critique",
        "--score",
        "0.95",
        "--issue",
        "missing units",
    ]);
    assert!(output.status.success());

    let response: CritiqueResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert!(response.actionable);
    assert_eq!(response.issues, vec!["missing units".to_string()]);
}

#[test]
fn test_cli_critique_unscored() {
    let output = run_cli(&["--format", "json", "critique"]);
    assert!(output.status.success());
    let response: CritiqueResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert!((response.severity - 0.5).abs() < 1e-9);
}

// ============================================================================
// Test 4: Run Command
// ============================================================================

#[test]
fn test_cli_run_with_cat_generator() {
    let output = run_cli(&[
        "--format",
        "json",
        "run",
        "--command",
        "cat",
        "--query",
        "42",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let response: RunResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(response.answer, "42");
    assert_eq!(response.decision, "answer");
    assert!(response.early_stopped);
    assert_eq!(response.consensus, Some(1.0));
    assert!(response.actual_n >= 3);
}

#[test]
fn test_cli_run_with_fixed_difficulty() {
    let output = run_cli(&[
        "--format",
        "json",
        "run",
        "--command",
        "echo",
        "--arg",
        "yes",
        "--query",
        "anything",
        "--difficulty",
        "hard",
    ]);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));

    let response: RunResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(response.answer, "yes");
    assert_eq!(response.difficulty, "hard");
}

#[test]
fn test_cli_run_rejects_disallowed_command() {
    let output = run_cli(&["run", "--command", "rm", "--query", "x"]);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("all_generators_failed"));
}

// ============================================================================
// Test 5: Configuration
// ============================================================================

#[test]
fn test_cli_validate_config_default() {
    let output = run_cli(&["--validate-config"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("Configuration is valid."));
}

#[test]
fn test_cli_validate_config_file() {
    let path = temp_file(
        "valid-config.json",
        r#"{"adaptive": {"min_candidates": 2}, "aggregator": {"strategy": "best_of_n"}}"#,
    );
    let output = run_cli(&["--config", path.to_str().unwrap(), "--validate-config"]);
    let _ = std::fs::remove_file(&path);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
}

#[test]
fn test_cli_invalid_config_file() {
    let path = temp_file("invalid-config.json", r#"{"beam": {"depth": 0}}"#);
    let output = run_cli(&["--config", path.to_str().unwrap(), "--validate-config"]);
    let _ = std::fs::remove_file(&path);
    assert!(!output.status.success());
    assert!(stderr_of(&output).contains("invalid_depth"));
}

#[test]
fn test_cli_config_sets_default_strategy() {
    let path = temp_file(
        "strategy-config.json",
        r#"{"aggregator": {"strategy": "best_of_n"}}"#,
    );
    let output = run_cli_with_stdin(
        &["--format", "json", "--config", path.to_str().unwrap(), "aggregate"],
        r#"[{"id": "a", "content": "x", "score": 0.7}]"#,
    );
    let _ = std::fs::remove_file(&path);
    assert!(output.status.success(), "stderr: {}", stderr_of(&output));
    let response: AggregateResponse = serde_json::from_str(&stdout_of(&output)).unwrap();
    assert_eq!(response.strategy, "best_of_n");
}

// ============================================================================
// Test 6: Usage Errors
// ============================================================================

#[test]
fn test_cli_missing_subcommand() {
    let output = run_cli(&[]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_cli_unknown_subcommand() {
    let output = run_cli(&["vote"]);
    assert!(!output.status.success());
}

#[test]
fn test_cli_version() {
    let output = run_cli(&["--version"]);
    assert!(output.status.success());
    assert!(stdout_of(&output).contains("accuracy-cli"));
}
