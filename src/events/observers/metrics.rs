//! Metrics Observer
//!
//! Aggregates engine events into Prometheus-compatible metrics:
//! - Counters: generator calls, failures, rejections, runs, searches, decisions
//! - Histograms: candidates per run, run latency

use crate::events::{EngineEvent, EventBus};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Histogram bucket boundaries for run latency (milliseconds)
pub const LATENCY_BUCKETS: [u64; 7] = [10, 50, 100, 500, 1000, 5000, 10000];

/// Histogram bucket boundaries for candidates used per run
pub const CANDIDATE_BUCKETS: [u64; 6] = [1, 3, 5, 10, 20, 50];

/// Fixed-bucket cumulative histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bounds: Vec<u64>,
    counts: Vec<u64>,
    sum: u64,
    count: u64,
}

impl Histogram {
    pub fn new(bounds: &[u64]) -> Self {
        Self {
            bounds: bounds.to_vec(),
            counts: vec![0; bounds.len()],
            sum: 0,
            count: 0,
        }
    }

    pub fn observe(&mut self, value: u64) {
        if let Some(i) = self.bounds.iter().position(|&b| value <= b) {
            self.counts[i] += 1;
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        out.push_str(&format!("# HELP {} {}\n", name, help));
        out.push_str(&format!("# TYPE {} histogram\n", name));
        let mut cumulative = 0u64;
        for (bound, count) in self.bounds.iter().zip(&self.counts) {
            cumulative += count;
            out.push_str(&format!("{}_bucket{{le=\"{}\"}} {}\n", name, bound, cumulative));
        }
        out.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", name, self.count));
        out.push_str(&format!("{}_sum {}\n", name, self.sum));
        out.push_str(&format!("{}_count {}\n", name, self.count));
    }
}

/// Metrics collected from engine events
#[derive(Debug, Clone)]
pub struct Metrics {
    pub batches_total: u64,
    pub generation_calls_total: u64,
    /// Failed generator calls, by reason code
    pub generation_failures_total: BTreeMap<String, u64>,
    /// Discarded candidates, by rejection reason
    pub candidates_rejected_total: BTreeMap<String, u64>,
    pub consensus_checks_total: u64,
    pub runs_total: u64,
    pub early_stops_total: u64,
    /// Completed runs, by difficulty level
    pub runs_by_difficulty: BTreeMap<String, u64>,
    pub candidates_per_run: Histogram,
    pub run_latency_ms: Histogram,
    pub depths_explored_total: u64,
    pub searches_total: u64,
    pub search_evaluations_total: u64,
    /// Decisions, by label
    pub decisions_total: BTreeMap<String, u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            batches_total: 0,
            generation_calls_total: 0,
            generation_failures_total: BTreeMap::new(),
            candidates_rejected_total: BTreeMap::new(),
            consensus_checks_total: 0,
            runs_total: 0,
            early_stops_total: 0,
            runs_by_difficulty: BTreeMap::new(),
            candidates_per_run: Histogram::new(&CANDIDATE_BUCKETS),
            run_latency_ms: Histogram::new(&LATENCY_BUCKETS),
            depths_explored_total: 0,
            searches_total: 0,
            search_evaluations_total: 0,
            decisions_total: BTreeMap::new(),
        }
    }
}

fn bump(map: &mut BTreeMap<String, u64>, key: &str) {
    *map.entry(key.to_string()).or_insert(0) += 1;
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the counters.
    pub fn record(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::BatchRequested { size, .. } => {
                self.batches_total += 1;
                self.generation_calls_total += *size as u64;
            }
            EngineEvent::CandidateRejected { reason, .. } => {
                bump(&mut self.candidates_rejected_total, reason);
            }
            EngineEvent::GenerationFailed { reason, .. } => {
                bump(&mut self.generation_failures_total, reason);
            }
            EngineEvent::ConsensusChecked { .. } => {
                self.consensus_checks_total += 1;
            }
            EngineEvent::RunCompleted {
                actual_n,
                early_stopped,
                difficulty,
                elapsed_ms,
                ..
            } => {
                self.runs_total += 1;
                if *early_stopped {
                    self.early_stops_total += 1;
                }
                bump(&mut self.runs_by_difficulty, difficulty.as_str());
                self.candidates_per_run.observe(*actual_n as u64);
                self.run_latency_ms.observe(*elapsed_ms);
            }
            EngineEvent::DepthExplored { .. } => {
                self.depths_explored_total += 1;
            }
            EngineEvent::SearchCompleted { evaluations, .. } => {
                self.searches_total += 1;
                self.search_evaluations_total += *evaluations as u64;
            }
            EngineEvent::DecisionMade { decision, .. } => {
                bump(&mut self.decisions_total, decision);
            }
        }
    }

    /// Share of completed runs that stopped early.
    pub fn early_stop_rate(&self) -> f64 {
        if self.runs_total == 0 {
            0.0
        } else {
            self.early_stops_total as f64 / self.runs_total as f64
        }
    }

    /// Format metrics as Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();

        counter(
            &mut out,
            "accuracy_batches_total",
            "Generation batches requested",
            self.batches_total,
        );
        counter(
            &mut out,
            "accuracy_generation_calls_total",
            "Generator calls issued",
            self.generation_calls_total,
        );
        labeled_counter(
            &mut out,
            "accuracy_generation_failures_total",
            "Failed generator calls",
            "reason",
            &self.generation_failures_total,
        );
        labeled_counter(
            &mut out,
            "accuracy_candidates_rejected_total",
            "Candidates discarded by the filter",
            "reason",
            &self.candidates_rejected_total,
        );
        counter(
            &mut out,
            "accuracy_consensus_checks_total",
            "Consensus checks performed",
            self.consensus_checks_total,
        );
        labeled_counter(
            &mut out,
            "accuracy_runs_total",
            "Completed self-consistency runs",
            "difficulty",
            &self.runs_by_difficulty,
        );
        counter(
            &mut out,
            "accuracy_early_stops_total",
            "Runs that stopped on consensus",
            self.early_stops_total,
        );
        self.candidates_per_run.render(
            "accuracy_candidates_per_run",
            "Candidates aggregated per run",
            &mut out,
        );
        self.run_latency_ms.render(
            "accuracy_run_latency_ms",
            "Run wall-clock time in milliseconds",
            &mut out,
        );
        counter(
            &mut out,
            "accuracy_search_depths_total",
            "Beam search depths explored",
            self.depths_explored_total,
        );
        counter(
            &mut out,
            "accuracy_searches_total",
            "Completed beam searches",
            self.searches_total,
        );
        counter(
            &mut out,
            "accuracy_search_evaluations_total",
            "Verifier evaluations during search",
            self.search_evaluations_total,
        );
        labeled_counter(
            &mut out,
            "accuracy_decisions_total",
            "Answer/abstain decisions",
            "decision",
            &self.decisions_total,
        );

        out
    }

    /// Human-readable summary
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("=== Accuracy Engine Metrics ===\n\n");
        out.push_str(&format!(
            "Runs: {} (early stop rate {:.1}%, avg candidates {:.1}, avg latency {:.1}ms)\n",
            self.runs_total,
            self.early_stop_rate() * 100.0,
            self.candidates_per_run.mean(),
            self.run_latency_ms.mean(),
        ));
        out.push_str(&format!(
            "Generation: {} calls in {} batches\n",
            self.generation_calls_total, self.batches_total
        ));
        for (reason, count) in &self.generation_failures_total {
            out.push_str(&format!("  failed {}: {}\n", reason, count));
        }
        for (reason, count) in &self.candidates_rejected_total {
            out.push_str(&format!("  rejected {}: {}\n", reason, count));
        }
        out.push_str(&format!(
            "Search: {} searches, {} depths, {} evaluations\n",
            self.searches_total, self.depths_explored_total, self.search_evaluations_total
        ));
        for (decision, count) in &self.decisions_total {
            out.push_str(&format!("Decision {}: {}\n", decision, count));
        }
        out
    }
}

fn counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!("# HELP {} {}\n", name, help));
    out.push_str(&format!("# TYPE {} counter\n", name));
    out.push_str(&format!("{} {}\n", name, value));
}

fn labeled_counter(
    out: &mut String,
    name: &str,
    help: &str,
    label: &str,
    values: &BTreeMap<String, u64>,
) {
    out.push_str(&format!("# HELP {} {}\n", name, help));
    out.push_str(&format!("# TYPE {} counter\n", name));
    for (key, value) in values {
        out.push_str(&format!("{}{{{}=\"{}\"}} {}\n", name, label, key, value));
    }
}

/// Observer that collects metrics from engine events
pub struct MetricsObserver {
    receiver: broadcast::Receiver<EngineEvent>,
    metrics: Arc<Mutex<Metrics>>,
}

impl MetricsObserver {
    pub fn new(bus: &EventBus) -> Self {
        Self {
            receiver: bus.subscribe(),
            metrics: Arc::new(Mutex::new(Metrics::new())),
        }
    }

    /// Shared handle for reading metrics while the observer runs.
    pub fn metrics(&self) -> Arc<Mutex<Metrics>> {
        Arc::clone(&self.metrics)
    }

    /// Collect until the bus closes. Spawn this on the runtime.
    pub async fn run(mut self) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => self.process_event(&event),
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }

    fn process_event(&self, event: &EngineEvent) {
        let mut metrics = match self.metrics.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        metrics.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::difficulty::DifficultyLevel;
    use std::time::Duration;

    fn completed(actual_n: usize, early: bool, ms: u64) -> EngineEvent {
        EngineEvent::run_completed(
            actual_n,
            early,
            Some(1.0),
            DifficultyLevel::Medium,
            Duration::from_millis(ms),
        )
    }

    // ==========================================
    // Recording Tests
    // ==========================================

    #[test]
    fn test_batches_count_calls() {
        let mut m = Metrics::new();
        m.record(&EngineEvent::batch_requested(1, 4, 0));
        m.record(&EngineEvent::batch_requested(2, 3, 4));
        assert_eq!(m.batches_total, 2);
        assert_eq!(m.generation_calls_total, 7);
    }

    #[test]
    fn test_failures_and_rejections_by_reason() {
        let mut m = Metrics::new();
        m.record(&EngineEvent::generation_failed(0, "timeout"));
        m.record(&EngineEvent::generation_failed(1, "timeout"));
        m.record(&EngineEvent::candidate_rejected("empty_content"));
        assert_eq!(m.generation_failures_total.get("timeout"), Some(&2));
        assert_eq!(m.candidates_rejected_total.get("empty_content"), Some(&1));
    }

    #[test]
    fn test_run_completion() {
        let mut m = Metrics::new();
        m.record(&completed(4, true, 20));
        m.record(&completed(10, false, 200));
        assert_eq!(m.runs_total, 2);
        assert_eq!(m.early_stops_total, 1);
        assert!((m.early_stop_rate() - 0.5).abs() < f64::EPSILON);
        assert!((m.candidates_per_run.mean() - 7.0).abs() < f64::EPSILON);
        assert_eq!(m.runs_by_difficulty.get("medium"), Some(&2));
    }

    #[test]
    fn test_histogram_overflow_counts_only_in_inf() {
        let mut h = Histogram::new(&[10, 100]);
        h.observe(5);
        h.observe(5000);
        let mut out = String::new();
        h.render("x", "test", &mut out);
        assert!(out.contains("x_bucket{le=\"10\"} 1"));
        assert!(out.contains("x_bucket{le=\"100\"} 1"));
        assert!(out.contains("x_bucket{le=\"+Inf\"} 2"));
        assert!(out.contains("x_sum 5005"));
    }

    #[test]
    fn test_empty_rates_are_zero() {
        let m = Metrics::new();
        assert_eq!(m.early_stop_rate(), 0.0);
        assert_eq!(m.run_latency_ms.mean(), 0.0);
    }

    // ==========================================
    // Format Tests
    // ==========================================

    #[test]
    fn test_prometheus_format() {
        let mut m = Metrics::new();
        m.record(&EngineEvent::batch_requested(1, 4, 0));
        m.record(&EngineEvent::candidate_rejected("malformed_content"));
        m.record(&completed(4, true, 12));
        m.record(&EngineEvent::search_completed(
            3,
            21,
            false,
            0.9,
            Duration::from_millis(5),
        ));

        let out = m.to_prometheus();
        assert!(out.contains("accuracy_generation_calls_total 4"));
        assert!(out.contains("accuracy_candidates_rejected_total{reason=\"malformed_content\"} 1"));
        assert!(out.contains("accuracy_runs_total{difficulty=\"medium\"} 1"));
        assert!(out.contains("accuracy_candidates_per_run_bucket{le=\"5\"} 1"));
        assert!(out.contains("accuracy_search_evaluations_total 21"));
    }

    #[test]
    fn test_report_format() {
        let mut m = Metrics::new();
        m.record(&completed(3, true, 10));
        let report = m.report();
        assert!(report.contains("Accuracy Engine Metrics"));
        assert!(report.contains("Runs: 1"));
    }

    // ==========================================
    // Observer Integration Tests
    // ==========================================

    #[tokio::test]
    async fn test_observer_run_processes_events() {
        let bus = EventBus::new(100);
        let observer = MetricsObserver::new(&bus);
        let metrics = observer.metrics();
        let handle = tokio::spawn(observer.run());

        bus.emit(EngineEvent::batch_requested(1, 3, 0));
        bus.emit(completed(3, true, 5));
        bus.emit(EngineEvent::decision_made(
            &crate::core::decision::DecisionResult::decide(None, 0.9, 0.8, 0.0),
        ));
        drop(bus);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Timeout")
            .expect("Observer task should complete");

        let m = metrics.lock().unwrap();
        assert_eq!(m.batches_total, 1);
        assert_eq!(m.runs_total, 1);
        assert_eq!(m.decisions_total.get("answer"), Some(&1));
    }
}
