//! Query Difficulty Estimation
//!
//! Classifies a query as easy, medium or hard. The level drives how many
//! candidates adaptive self-consistency is allowed to generate.
//!
//! # Thresholds
//!
//! ```text
//! score < 0.35           → easy
//! 0.35 <= score <= 0.65  → medium
//! score > 0.65           → hard
//! missing / NaN          → medium
//! ```
//!
//! # Untrusted input
//!
//! `DifficultyEstimate::from_map` reads only a fixed set of string keys and
//! matches the level label against the closed `DifficultyLevel` set. Unknown
//! labels are discarded (the level is then derived from the score) and
//! unknown keys are ignored; no identifier is ever created from input.

use crate::core::candidate::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Scores strictly below this are easy.
pub const EASY_UPPER_BOUND: f64 = 0.35;
/// Scores strictly above this are hard.
pub const HARD_LOWER_BOUND: f64 = 0.65;

const KEY_LEVEL: &str = "level";
const KEY_SCORE: &str = "score";
const KEY_CONFIDENCE: &str = "confidence";
const KEY_REASONING: &str = "reasoning";
const KEY_FEATURES: &str = "features";
const KEY_METADATA: &str = "metadata";

/// Difficulty classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    /// All recognized levels, in increasing difficulty.
    pub const ALL: [DifficultyLevel; 3] = [
        DifficultyLevel::Easy,
        DifficultyLevel::Medium,
        DifficultyLevel::Hard,
    ];

    /// Wire label for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }
}

impl std::fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyLevel {
    type Err = DifficultyError;

    /// Exact, case-sensitive match against the three labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| DifficultyError::InvalidLevel {
                value: s.to_string(),
            })
    }
}

/// Errors constructing a `DifficultyEstimate`.
#[derive(Debug, Clone, PartialEq)]
pub enum DifficultyError {
    /// Level label is not one of easy/medium/hard
    InvalidLevel {
        /// The rejected label
        value: String,
    },
    /// Score outside `[0, 1]`
    InvalidScore {
        /// The rejected score
        value: f64,
    },
    /// Confidence outside `[0, 1]`
    InvalidConfidence {
        /// The rejected confidence
        value: f64,
    },
}

impl DifficultyError {
    /// Stable reason code for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            DifficultyError::InvalidLevel { .. } => "invalid_level",
            DifficultyError::InvalidScore { .. } => "invalid_score",
            DifficultyError::InvalidConfidence { .. } => "invalid_confidence",
        }
    }
}

impl std::fmt::Display for DifficultyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DifficultyError::InvalidLevel { value } => {
                write!(f, "Invalid difficulty level: {:?}", value)
            }
            DifficultyError::InvalidScore { value } => {
                write!(f, "Difficulty score must be in [0, 1], got {}", value)
            }
            DifficultyError::InvalidConfidence { value } => {
                write!(f, "Difficulty confidence must be in [0, 1], got {}", value)
            }
        }
    }
}

impl std::error::Error for DifficultyError {}

/// Map a difficulty score onto a level.
///
/// `None` and NaN map to `Medium`.
pub fn to_level(score: Option<f64>) -> DifficultyLevel {
    match score {
        Some(s) if s.is_nan() => DifficultyLevel::Medium,
        Some(s) if s < EASY_UPPER_BOUND => DifficultyLevel::Easy,
        Some(s) if s > HARD_LOWER_BOUND => DifficultyLevel::Hard,
        _ => DifficultyLevel::Medium,
    }
}

/// Map an arbitrary JSON value onto a level; non-numeric values are medium.
pub fn level_for_value(value: &Value) -> DifficultyLevel {
    to_level(value.as_f64())
}

/// Construction attributes for `DifficultyEstimate`.
#[derive(Debug, Clone, Default)]
pub struct DifficultyAttrs {
    pub level: Option<DifficultyLevel>,
    pub score: Option<f64>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub features: Metadata,
    pub metadata: Metadata,
}

impl DifficultyAttrs {
    pub fn with_level(mut self, level: DifficultyLevel) -> Self {
        self.level = Some(level);
        self
    }

    /// Set the level from a label, rejecting anything but easy/medium/hard.
    pub fn with_level_label(mut self, label: &str) -> Result<Self, DifficultyError> {
        self.level = Some(label.parse()?);
        Ok(self)
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: Value) -> Self {
        self.features.insert(key.into(), value);
        self
    }
}

/// Validated difficulty classification of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct DifficultyEstimate {
    level: DifficultyLevel,
    score: Option<f64>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    features: Metadata,
    metadata: Metadata,
}

fn check_unit(value: Option<f64>) -> bool {
    value.map_or(true, |v| (0.0..=1.0).contains(&v))
}

impl DifficultyEstimate {
    /// Build an estimate, deriving the level from the score when absent.
    pub fn new(attrs: DifficultyAttrs) -> Result<Self, DifficultyError> {
        if !check_unit(attrs.score) {
            return Err(DifficultyError::InvalidScore {
                value: attrs.score.unwrap_or_default(),
            });
        }
        if !check_unit(attrs.confidence) {
            return Err(DifficultyError::InvalidConfidence {
                value: attrs.confidence.unwrap_or_default(),
            });
        }

        let level = attrs.level.unwrap_or_else(|| to_level(attrs.score));

        Ok(Self {
            level,
            score: attrs.score,
            confidence: attrs.confidence,
            reasoning: attrs.reasoning,
            features: attrs.features,
            metadata: attrs.metadata,
        })
    }

    /// Shorthand for an estimate that only carries a level.
    pub fn from_level(level: DifficultyLevel) -> Self {
        Self {
            level,
            score: None,
            confidence: None,
            reasoning: None,
            features: Metadata::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn level(&self) -> DifficultyLevel {
        self.level
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    pub fn reasoning(&self) -> Option<&str> {
        self.reasoning.as_deref()
    }

    pub fn features(&self) -> &Metadata {
        &self.features
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Serialize to a string-keyed JSON map.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(KEY_LEVEL.to_string(), Value::from(self.level.as_str()));
        if let Some(score) = self.score {
            map.insert(KEY_SCORE.to_string(), Value::from(score));
        }
        if let Some(confidence) = self.confidence {
            map.insert(KEY_CONFIDENCE.to_string(), Value::from(confidence));
        }
        if let Some(reasoning) = &self.reasoning {
            map.insert(KEY_REASONING.to_string(), Value::from(reasoning.as_str()));
        }
        map.insert(
            KEY_FEATURES.to_string(),
            Value::Object(self.features.clone().into_iter().collect()),
        );
        map.insert(
            KEY_METADATA.to_string(),
            Value::Object(self.metadata.clone().into_iter().collect()),
        );
        map
    }

    /// Deserialize from a string-keyed JSON map.
    ///
    /// Unknown keys are ignored. A level label outside the closed set is
    /// dropped, so the level falls back to the score rule. Non-numeric
    /// score/confidence values are treated as absent.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, DifficultyError> {
        let level = map
            .get(KEY_LEVEL)
            .and_then(Value::as_str)
            .and_then(|label| label.parse::<DifficultyLevel>().ok());

        let object = |key: &str| -> Metadata {
            match map.get(key) {
                Some(Value::Object(obj)) => obj.clone().into_iter().collect(),
                _ => Metadata::new(),
            }
        };

        Self::new(DifficultyAttrs {
            level,
            score: map.get(KEY_SCORE).and_then(Value::as_f64),
            confidence: map.get(KEY_CONFIDENCE).and_then(Value::as_f64),
            reasoning: map
                .get(KEY_REASONING)
                .and_then(Value::as_str)
                .map(str::to_string),
            features: object(KEY_FEATURES),
            metadata: object(KEY_METADATA),
        })
    }
}

/// Something that can classify a query's difficulty.
pub trait DifficultyEstimator: Send + Sync + std::fmt::Debug {
    /// Estimate the difficulty of `query`.
    fn estimate(&self, query: &str) -> DifficultyEstimate;
}

/// Cheap lexical difficulty heuristic.
///
/// Combines four signals, each normalized to `[0, 1]`:
/// query length, multi-step markers, reasoning keywords and the density of
/// mathematical symbols.
#[derive(Debug, Clone)]
pub struct HeuristicEstimator {
    /// Character count treated as maximally long
    pub long_query_chars: usize,
    pub length_weight: f64,
    pub steps_weight: f64,
    pub reasoning_weight: f64,
    pub math_weight: f64,
}

impl Default for HeuristicEstimator {
    fn default() -> Self {
        Self {
            long_query_chars: 600,
            length_weight: 0.25,
            steps_weight: 0.25,
            reasoning_weight: 0.3,
            math_weight: 0.2,
        }
    }
}

const STEP_MARKERS: &[&str] = &[
    "then", "step", "first", "second", "after", "finally", "next", "before",
];

const REASONING_KEYWORDS: &[&str] = &[
    "prove", "why", "explain", "derive", "optimize", "analyze", "compare", "design",
    "justify", "evaluate",
];

impl HeuristicEstimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DifficultyEstimator for HeuristicEstimator {
    fn estimate(&self, query: &str) -> DifficultyEstimate {
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let chars = query.chars().count();
        let length = (chars as f64 / self.long_query_chars.max(1) as f64).min(1.0);

        let step_hits = words.iter().filter(|w| STEP_MARKERS.contains(w)).count();
        let steps = (step_hits as f64 / 3.0).min(1.0);

        let reasoning_hits = words
            .iter()
            .filter(|w| REASONING_KEYWORDS.contains(w))
            .count();
        let reasoning = (reasoning_hits as f64 / 2.0).min(1.0);

        let math_chars = query
            .chars()
            .filter(|c| c.is_ascii_digit() || "+-*/^=<>%√∑∫".contains(*c))
            .count();
        let math = if chars == 0 {
            0.0
        } else {
            (math_chars as f64 / chars as f64 * 4.0).min(1.0)
        };

        let total_weight =
            self.length_weight + self.steps_weight + self.reasoning_weight + self.math_weight;
        let score = if total_weight > 0.0 {
            ((length * self.length_weight
                + steps * self.steps_weight
                + reasoning * self.reasoning_weight
                + math * self.math_weight)
                / total_weight)
                .clamp(0.0, 1.0)
        } else {
            0.5
        };
        let level = to_level(Some(score));

        DifficultyEstimate {
            level,
            score: Some(score),
            confidence: Some((0.5 + (score - 0.5).abs()).min(1.0)),
            reasoning: Some(format!(
                "heuristic: length={:.2} steps={:.2} reasoning={:.2} math={:.2}",
                length, steps, reasoning, math
            )),
            features: [
                ("length", length),
                ("multi_step", steps),
                ("reasoning_keywords", reasoning),
                ("math_density", math),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::from(v)))
            .collect(),
            metadata: Metadata::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==========================================
    // Threshold Tests
    // ==========================================

    #[test]
    fn test_to_level_boundaries() {
        assert_eq!(to_level(Some(0.34)), DifficultyLevel::Easy);
        assert_eq!(to_level(Some(0.35)), DifficultyLevel::Medium);
        assert_eq!(to_level(Some(0.65)), DifficultyLevel::Medium);
        assert_eq!(to_level(Some(0.66)), DifficultyLevel::Hard);
    }

    #[test]
    fn test_to_level_missing_or_nan_is_medium() {
        assert_eq!(to_level(None), DifficultyLevel::Medium);
        assert_eq!(to_level(Some(f64::NAN)), DifficultyLevel::Medium);
        assert_eq!(level_for_value(&json!("high")), DifficultyLevel::Medium);
        assert_eq!(level_for_value(&json!(0.9)), DifficultyLevel::Hard);
    }

    // ==========================================
    // Construction Tests
    // ==========================================

    #[test]
    fn test_new_derives_level_from_score() {
        let e = DifficultyEstimate::new(DifficultyAttrs::default().with_score(0.1)).unwrap();
        assert_eq!(e.level(), DifficultyLevel::Easy);
    }

    #[test]
    fn test_new_keeps_explicit_level() {
        let e = DifficultyEstimate::new(
            DifficultyAttrs::default()
                .with_level(DifficultyLevel::Hard)
                .with_score(0.1),
        )
        .unwrap();
        assert_eq!(e.level(), DifficultyLevel::Hard);
    }

    #[test]
    fn test_new_without_score_defaults_medium() {
        let e = DifficultyEstimate::new(DifficultyAttrs::default()).unwrap();
        assert_eq!(e.level(), DifficultyLevel::Medium);
    }

    #[test]
    fn test_new_rejects_out_of_range_values() {
        let err = DifficultyEstimate::new(DifficultyAttrs::default().with_score(1.5)).unwrap_err();
        assert_eq!(err.reason(), "invalid_score");

        let err =
            DifficultyEstimate::new(DifficultyAttrs::default().with_confidence(-0.1)).unwrap_err();
        assert_eq!(err.reason(), "invalid_confidence");
    }

    #[test]
    fn test_unit_interval_is_inclusive() {
        assert!(DifficultyEstimate::new(
            DifficultyAttrs::default().with_score(0.0).with_confidence(1.0)
        )
        .is_ok());
    }

    #[test]
    fn test_level_label_is_exact() {
        assert!(DifficultyAttrs::default().with_level_label("hard").is_ok());
        let err = DifficultyAttrs::default()
            .with_level_label("Hard")
            .unwrap_err();
        assert_eq!(err.reason(), "invalid_level");
        assert!(DifficultyAttrs::default()
            .with_level_label("extreme")
            .is_err());
    }

    // ==========================================
    // Map Round-trip Tests
    // ==========================================

    #[test]
    fn test_map_roundtrip() {
        let e = DifficultyEstimate::new(
            DifficultyAttrs::default()
                .with_score(0.42)
                .with_confidence(0.8)
                .with_reasoning("two-step arithmetic")
                .with_feature("length", json!(0.1)),
        )
        .unwrap();

        let back = DifficultyEstimate::from_map(&e.to_map()).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_from_map_nulls_unknown_level() {
        let map = json!({"level": "catastrophic", "score": 0.9})
            .as_object()
            .cloned()
            .unwrap();
        let e = DifficultyEstimate::from_map(&map).unwrap();
        assert_eq!(e.level(), DifficultyLevel::Hard);

        let map = json!({"level": "catastrophic"}).as_object().cloned().unwrap();
        assert_eq!(
            DifficultyEstimate::from_map(&map).unwrap().level(),
            DifficultyLevel::Medium
        );
    }

    #[test]
    fn test_from_map_ignores_unknown_keys() {
        let map = json!({"level": "easy", "__proto__": {"x": 1}, "evil_key": "boom"})
            .as_object()
            .cloned()
            .unwrap();
        let e = DifficultyEstimate::from_map(&map).unwrap();
        assert_eq!(e.level(), DifficultyLevel::Easy);
        assert!(!e.to_map().contains_key("evil_key"));
    }

    #[test]
    fn test_from_map_non_numeric_score_is_absent() {
        let map = json!({"score": "0.9"}).as_object().cloned().unwrap();
        let e = DifficultyEstimate::from_map(&map).unwrap();
        assert_eq!(e.score(), None);
        assert_eq!(e.level(), DifficultyLevel::Medium);
    }

    // ==========================================
    // Heuristic Estimator Tests
    // ==========================================

    #[test]
    fn test_heuristic_short_fact_is_easy() {
        let e = HeuristicEstimator::new().estimate("Capital of France?");
        assert_eq!(e.level(), DifficultyLevel::Easy);
        assert!(e.features().contains_key("length"));
    }

    #[test]
    fn test_heuristic_multi_step_proof_is_harder() {
        let easy = HeuristicEstimator::new().estimate("Capital of France?");
        let hard = HeuristicEstimator::new().estimate(
            "First derive the closed form of sum k^2 for k=1..n, then prove it by induction, \
             explain why the base case holds and finally compare it to 3*n^3/(n+1).",
        );
        assert!(hard.score().unwrap() > easy.score().unwrap());
        assert_ne!(hard.level(), DifficultyLevel::Easy);
    }

    #[test]
    fn test_heuristic_scores_are_in_range() {
        let long = "why ".repeat(500);
        for q in ["", "x", "2+2=?", long.as_str()] {
            let e = HeuristicEstimator::new().estimate(q);
            let s = e.score().unwrap();
            assert!((0.0..=1.0).contains(&s), "score {} out of range for {:?}", s, q);
        }
    }
}
