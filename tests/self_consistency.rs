//! End-to-end tests for adaptive self-consistency
//!
//! Drives the engine through its public API the way an embedding
//! application would: built from configuration, observed through the
//! event bus, and followed by an answer/abstain decision.

use accuracy::core::{
    AdaptiveConfig, AdaptiveSelfConsistency, DifficultyLevel, ExpectedValuePolicy, MajorityVote,
    MockGenerator, RunOptions, SyncFnGenerator,
};
use accuracy::events::observers::MetricsObserver;
use accuracy::{EngineConfig, EventBus};
use std::sync::Arc;

fn responses(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_engine() -> AdaptiveSelfConsistency {
    AdaptiveSelfConsistency::new(AdaptiveConfig::default(), Arc::new(MajorityVote::new())).unwrap()
}

// ==========================================
// Failure Handling
// ==========================================

#[tokio::test]
async fn test_always_failing_generator_reports_reason() {
    let err = default_engine()
        .run("What is 2+2?", RunOptions::new(Arc::new(MockGenerator::failing())))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "all_generators_failed");
}

#[tokio::test]
async fn test_transient_failures_are_absorbed() {
    let generator = MockGenerator::constant("x").with_failures(2);
    let outcome = default_engine()
        .run("q", RunOptions::new(Arc::new(generator)))
        .await
        .unwrap();
    assert_eq!(outcome.aggregation.answer, "x");
    assert!(outcome.metadata.actual_n >= AdaptiveConfig::default().min_candidates);
    assert_eq!(outcome.metadata.failed_attempts, 2);
}

// ==========================================
// Sampling Budget
// ==========================================

#[tokio::test]
async fn test_hard_queries_never_exceed_cap() {
    let generator = MockGenerator::new(responses(&["a", "b", "c", "d", "e"]));
    let outcome = default_engine()
        .run(
            "open question",
            RunOptions::new(Arc::new(generator.clone())).with_difficulty(DifficultyLevel::Hard),
        )
        .await
        .unwrap();
    assert_eq!(outcome.metadata.max_n, 20);
    assert_eq!(outcome.metadata.actual_n, 20);
    assert!(!outcome.metadata.early_stopped);
    assert_eq!(generator.calls(), 20);
}

#[tokio::test]
async fn test_config_caps_max_candidates() {
    let config = AdaptiveConfig::default().with_max_candidates(6);
    let engine = AdaptiveSelfConsistency::new(config, Arc::new(MajorityVote::new())).unwrap();
    let generator = MockGenerator::new(responses(&["a", "b"]));
    let outcome = engine
        .run(
            "q",
            RunOptions::new(Arc::new(generator)).with_difficulty(DifficultyLevel::Hard),
        )
        .await
        .unwrap();
    assert_eq!(outcome.metadata.max_n, 6);
    assert_eq!(outcome.metadata.actual_n, 6);
}

#[tokio::test]
async fn test_agreement_stops_early() {
    let outcome = default_engine()
        .run(
            "q",
            RunOptions::new(Arc::new(MockGenerator::constant("yes")))
                .with_difficulty(DifficultyLevel::Hard),
        )
        .await
        .unwrap();
    assert!(outcome.metadata.early_stopped);
    assert!(outcome.metadata.actual_n < outcome.metadata.max_n);
    assert_eq!(outcome.metadata.consensus, Some(1.0));
}

#[tokio::test]
async fn test_majority_wins_over_noise() {
    let generator = SyncFnGenerator::new(|query: &str| {
        let answer = if query.len() % 2 == 0 { "even" } else { "odd" };
        Ok(accuracy::core::Candidate::new("", answer).into())
    });
    let outcome = default_engine()
        .run("four", RunOptions::new(Arc::new(generator)))
        .await
        .unwrap();
    assert_eq!(outcome.aggregation.answer, "even");
    assert!((outcome.aggregation.confidence - 1.0).abs() < 1e-9);
}

// ==========================================
// Configuration and Observation
// ==========================================

#[tokio::test]
async fn test_engine_from_config_document() {
    let config = EngineConfig::from_json_str(
        r#"{
            "adaptive": { "min_candidates": 2, "early_stop_threshold": 0.5 },
            "aggregator": { "strategy": "best_of_n" }
        }"#,
    )
    .unwrap();
    let engine = config.build_adaptive().unwrap();
    assert_eq!(engine.aggregator().name(), "best_of_n");

    let outcome = engine
        .run("q", RunOptions::new(Arc::new(MockGenerator::constant("42"))))
        .await
        .unwrap();
    assert_eq!(outcome.aggregation.answer, "42");
}

#[tokio::test]
async fn test_metrics_observer_counts_runs() {
    let bus = EventBus::new(256);
    let observer = MetricsObserver::new(&bus);
    let metrics = observer.metrics();
    let task = tokio::spawn(observer.run());

    let engine = default_engine().with_event_bus(bus);
    let unanimous = engine
        .run(
            "q",
            RunOptions::new(Arc::new(MockGenerator::constant("same")))
                .with_difficulty(DifficultyLevel::Medium),
        )
        .await
        .unwrap();
    engine
        .run(
            "q",
            RunOptions::new(Arc::new(MockGenerator::new(responses(&["a", "b"]))))
                .with_difficulty(DifficultyLevel::Easy),
        )
        .await
        .unwrap();

    engine.decide(&unanimous, &ExpectedValuePolicy::default());

    // dropping the engine drops the last sender and ends the observer
    drop(engine);
    task.await.unwrap();

    let m = metrics.lock().unwrap();
    assert_eq!(m.runs_total, 2);
    assert_eq!(m.early_stops_total, 1);
    assert_eq!(m.runs_by_difficulty.get("easy"), Some(&1));
    assert_eq!(m.runs_by_difficulty.get("medium"), Some(&1));
    assert!((m.early_stop_rate() - 0.5).abs() < 1e-9);
    assert_eq!(m.decisions_total.get("answer"), Some(&1));
    assert!(m
        .to_prometheus()
        .contains("accuracy_runs_total{difficulty=\"easy\"} 1"));
}

// ==========================================
// Decision Policy
// ==========================================

#[tokio::test]
async fn test_unanimous_run_is_answered() {
    let outcome = default_engine()
        .run("q", RunOptions::new(Arc::new(MockGenerator::constant("42"))))
        .await
        .unwrap();
    let decision = default_engine().decide(&outcome, &ExpectedValuePolicy::default());
    assert!(decision.is_answer());
    assert_eq!(decision.candidate.unwrap().content(), "42");
}

#[tokio::test]
async fn test_split_run_abstains_under_strict_policy() {
    let generator = MockGenerator::new(responses(&["a", "b", "c", "d"]));
    let outcome = default_engine()
        .run(
            "q",
            RunOptions::new(Arc::new(generator)).with_difficulty(DifficultyLevel::Medium),
        )
        .await
        .unwrap();
    // a four-way split keeps majority confidence at or below 0.3
    let strict = ExpectedValuePolicy::new(1.0, 4.0, 0.0);
    assert!(!strict.decide_aggregation(&outcome.aggregation).is_answer());
}
