//! Answer/abstain decisions and critique feedback.
//!
//! `DecisionResult` records whether the engine commits to an answer. The
//! policy is expected-value based: answer only when answering is worth
//! more than abstaining.
//!
//! `CritiqueResult` turns verifier output into refinement feedback with a
//! severity in `[0, 1]`.

use crate::core::aggregation::Aggregation;
use crate::core::candidate::{Candidate, Metadata};
use crate::core::generator::VerificationResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Severity above which a critique is actionable without explicit issues.
pub const ACTIONABLE_THRESHOLD: f64 = 0.3;
/// Default `should_refine` threshold.
pub const DEFAULT_REFINE_THRESHOLD: f64 = 0.3;
/// Lower bound of the `High` severity band.
pub const HIGH_SEVERITY_THRESHOLD: f64 = 0.7;
/// Severity assumed when the verifier produced no score.
pub const UNSCORED_SEVERITY: f64 = 0.5;

/// Invalid decision or critique input.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionError {
    /// A decision label outside `answer` / `abstain`
    InvalidDecision {
        /// The rejected label
        value: String,
    },
    /// Severity outside `[0, 1]`
    InvalidSeverity {
        /// The rejected value
        value: f64,
    },
    /// Confidence outside `[0, 1]`
    InvalidConfidence {
        /// The rejected value
        value: f64,
    },
}

impl DecisionError {
    pub fn reason(&self) -> &'static str {
        match self {
            DecisionError::InvalidDecision { .. } => "invalid_decision",
            DecisionError::InvalidSeverity { .. } => "invalid_severity",
            DecisionError::InvalidConfidence { .. } => "invalid_confidence",
        }
    }
}

impl std::fmt::Display for DecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionError::InvalidDecision { value } => {
                write!(f, "Invalid decision '{}', expected answer or abstain", value)
            }
            DecisionError::InvalidSeverity { value } => {
                write!(f, "Severity {} is outside [0, 1]", value)
            }
            DecisionError::InvalidConfidence { value } => {
                write!(f, "Confidence {} is outside [0, 1]", value)
            }
        }
    }
}

impl std::error::Error for DecisionError {}

/// Whether to commit to an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Answer,
    Abstain,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Answer => "answer",
            Decision::Abstain => "abstain",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "answer" => Ok(Decision::Answer),
            "abstain" => Ok(Decision::Abstain),
            other => Err(DecisionError::InvalidDecision {
                value: other.to_string(),
            }),
        }
    }
}

/// Inputs for `DecisionResult::new`.
#[derive(Debug, Clone, Default)]
pub struct DecisionAttrs {
    /// `"answer"` or `"abstain"`
    pub decision: String,
    pub candidate: Option<Candidate>,
    pub confidence: f64,
    pub ev_answer: Option<f64>,
    pub ev_abstain: Option<f64>,
    pub reasoning: Option<String>,
    pub metadata: Metadata,
}

/// An answer/abstain decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Candidate>,
    pub confidence: f64,
    #[serde(default)]
    pub ev_answer: f64,
    #[serde(default)]
    pub ev_abstain: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl DecisionResult {
    /// Build from attributes, parsing the decision label strictly.
    ///
    /// Expected values default to 0.0.
    pub fn new(attrs: DecisionAttrs) -> Result<Self, DecisionError> {
        let decision = attrs.decision.parse()?;
        if !(0.0..=1.0).contains(&attrs.confidence) {
            return Err(DecisionError::InvalidConfidence {
                value: attrs.confidence,
            });
        }
        Ok(Self {
            decision,
            candidate: attrs.candidate,
            confidence: attrs.confidence,
            ev_answer: attrs.ev_answer.unwrap_or(0.0),
            ev_abstain: attrs.ev_abstain.unwrap_or(0.0),
            reasoning: attrs.reasoning,
            metadata: attrs.metadata,
        })
    }

    /// Answer iff `ev_answer > ev_abstain`; ties abstain.
    pub fn decide(
        candidate: Option<Candidate>,
        confidence: f64,
        ev_answer: f64,
        ev_abstain: f64,
    ) -> Self {
        let decision = if ev_answer > ev_abstain {
            Decision::Answer
        } else {
            Decision::Abstain
        };
        Self {
            decision,
            candidate,
            confidence: confidence.clamp(0.0, 1.0),
            ev_answer,
            ev_abstain,
            reasoning: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn is_answer(&self) -> bool {
        self.decision == Decision::Answer
    }
}

/// Payoffs used to turn a confidence into expected values.
///
/// ```text
/// ev_answer  = c * reward_correct - (1 - c) * penalty_incorrect
/// ev_abstain = abstain_value
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedValuePolicy {
    pub reward_correct: f64,
    pub penalty_incorrect: f64,
    pub abstain_value: f64,
}

impl Default for ExpectedValuePolicy {
    /// Symmetric payoffs: answer once confidence exceeds 0.5.
    fn default() -> Self {
        Self {
            reward_correct: 1.0,
            penalty_incorrect: 1.0,
            abstain_value: 0.0,
        }
    }
}

impl ExpectedValuePolicy {
    pub fn new(reward_correct: f64, penalty_incorrect: f64, abstain_value: f64) -> Self {
        Self {
            reward_correct,
            penalty_incorrect,
            abstain_value,
        }
    }

    pub fn ev_answer(&self, confidence: f64) -> f64 {
        let c = confidence.clamp(0.0, 1.0);
        c * self.reward_correct - (1.0 - c) * self.penalty_incorrect
    }

    /// Confidence at which answering and abstaining break even.
    pub fn break_even_confidence(&self) -> f64 {
        let span = self.reward_correct + self.penalty_incorrect;
        if span <= 0.0 {
            return 1.0;
        }
        ((self.abstain_value + self.penalty_incorrect) / span).clamp(0.0, 1.0)
    }

    pub fn decide(&self, candidate: Option<Candidate>, confidence: f64) -> DecisionResult {
        DecisionResult::decide(
            candidate,
            confidence,
            self.ev_answer(confidence),
            self.abstain_value,
        )
    }

    /// Decide on an aggregated answer.
    pub fn decide_aggregation(&self, aggregation: &Aggregation) -> DecisionResult {
        let candidate = aggregation
            .candidate
            .clone()
            .or_else(|| Some(Candidate::new("aggregate", aggregation.answer.clone())));
        let mut result = self.decide(candidate, aggregation.confidence);
        if let Some(strategy) = aggregation.metadata.get("strategy") {
            result
                .metadata
                .insert("strategy".to_string(), strategy.clone());
        }
        result
    }
}

/// Bands of critique severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
}

impl SeverityLevel {
    /// low `< 0.3`, medium `[0.3, 0.7)`, high `>= 0.7`
    pub fn from_severity(severity: f64) -> Self {
        if severity >= HIGH_SEVERITY_THRESHOLD {
            SeverityLevel::High
        } else if severity >= ACTIONABLE_THRESHOLD {
            SeverityLevel::Medium
        } else {
            SeverityLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SeverityLevel::Low => "low",
            SeverityLevel::Medium => "medium",
            SeverityLevel::High => "high",
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs for `CritiqueResult::new`.
#[derive(Debug, Clone, Default)]
pub struct CritiqueAttrs {
    pub severity: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub feedback: Option<String>,
    pub metadata: Metadata,
}

/// Refinement feedback on a candidate.
///
/// Deserialization validates like `new`; a serialized `actionable` flag is
/// ignored and re-derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CritiqueRecord")]
pub struct CritiqueResult {
    severity: f64,
    issues: Vec<String>,
    suggestions: Vec<String>,
    feedback: Option<String>,
    actionable: bool,
    metadata: Metadata,
}

/// Wire form of `CritiqueResult`.
#[derive(Deserialize)]
#[serde(default)]
struct CritiqueRecord {
    severity: f64,
    issues: Vec<String>,
    suggestions: Vec<String>,
    feedback: Option<String>,
    metadata: Metadata,
}

impl Default for CritiqueRecord {
    fn default() -> Self {
        Self {
            severity: f64::NAN,
            issues: Vec::new(),
            suggestions: Vec::new(),
            feedback: None,
            metadata: Metadata::new(),
        }
    }
}

impl TryFrom<CritiqueRecord> for CritiqueResult {
    type Error = DecisionError;

    fn try_from(record: CritiqueRecord) -> Result<Self, Self::Error> {
        CritiqueResult::new(CritiqueAttrs {
            severity: record.severity,
            issues: record.issues,
            suggestions: record.suggestions,
            feedback: record.feedback,
            metadata: record.metadata,
        })
    }
}

impl CritiqueResult {
    /// # Errors
    ///
    /// `invalid_severity` when severity is outside `[0, 1]`.
    pub fn new(attrs: CritiqueAttrs) -> Result<Self, DecisionError> {
        if !(0.0..=1.0).contains(&attrs.severity) {
            return Err(DecisionError::InvalidSeverity {
                value: attrs.severity,
            });
        }
        Ok(Self::build(attrs))
    }

    fn build(attrs: CritiqueAttrs) -> Self {
        let actionable = !attrs.issues.is_empty() || attrs.severity > ACTIONABLE_THRESHOLD;
        Self {
            severity: attrs.severity,
            issues: attrs.issues,
            suggestions: attrs.suggestions,
            feedback: attrs.feedback,
            actionable,
            metadata: attrs.metadata,
        }
    }

    /// Severity is `1 - score` (clamped), or 0.5 when unscored.
    pub fn from_verification_result(result: &VerificationResult) -> Self {
        let severity = match result.score {
            Some(score) if !score.is_nan() => (1.0 - score).clamp(0.0, 1.0),
            _ => UNSCORED_SEVERITY,
        };
        Self::build(CritiqueAttrs {
            severity,
            issues: result.issues.clone(),
            suggestions: result.suggestions.clone(),
            feedback: result.reasoning.clone(),
            metadata: result.metadata.clone(),
        })
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }

    pub fn issues(&self) -> &[String] {
        &self.issues
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn is_actionable(&self) -> bool {
        self.actionable
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn should_refine(&self) -> bool {
        self.should_refine_with(DEFAULT_REFINE_THRESHOLD)
    }

    /// Strictly above `threshold`.
    pub fn should_refine_with(&self, threshold: f64) -> bool {
        self.severity > threshold
    }

    pub fn severity_level(&self) -> SeverityLevel {
        SeverityLevel::from_severity(self.severity)
    }

    /// Combine two critiques.
    ///
    /// Issues and suggestions concatenate in argument order, severity is the
    /// max, feedbacks join with a newline, and `b` wins metadata collisions.
    pub fn merge(a: &CritiqueResult, b: &CritiqueResult) -> CritiqueResult {
        let feedback = match (&a.feedback, &b.feedback) {
            (Some(x), Some(y)) => Some(format!("{}\n{}", x, y)),
            (Some(x), None) | (None, Some(x)) => Some(x.clone()),
            (None, None) => None,
        };
        let mut metadata = a.metadata.clone();
        metadata.extend(b.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

        Self::build(CritiqueAttrs {
            severity: a.severity.max(b.severity),
            issues: a.issues.iter().chain(&b.issues).cloned().collect(),
            suggestions: a.suggestions.iter().chain(&b.suggestions).cloned().collect(),
            feedback,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn critique(severity: f64, issues: &[&str]) -> CritiqueResult {
        CritiqueResult::new(CritiqueAttrs {
            severity,
            issues: issues.iter().map(|s| s.to_string()).collect(),
            ..CritiqueAttrs::default()
        })
        .unwrap()
    }

    // ==========================================
    // Decision Tests
    // ==========================================

    #[test]
    fn test_decision_parse_is_strict() {
        assert_eq!("answer".parse::<Decision>().unwrap(), Decision::Answer);
        assert_eq!("abstain".parse::<Decision>().unwrap(), Decision::Abstain);
        for bad in ["Answer", "maybe", ""] {
            assert_eq!(
                bad.parse::<Decision>().unwrap_err().reason(),
                "invalid_decision"
            );
        }
    }

    #[test]
    fn test_new_defaults_expected_values() {
        let result = DecisionResult::new(DecisionAttrs {
            decision: "abstain".to_string(),
            confidence: 0.4,
            ..DecisionAttrs::default()
        })
        .unwrap();
        assert_eq!(result.decision, Decision::Abstain);
        assert_eq!(result.ev_answer, 0.0);
        assert_eq!(result.ev_abstain, 0.0);
    }

    #[test]
    fn test_new_rejects_unknown_decision() {
        let err = DecisionResult::new(DecisionAttrs {
            decision: "defer".to_string(),
            ..DecisionAttrs::default()
        })
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_decision");
    }

    #[test]
    fn test_new_rejects_bad_confidence() {
        let err = DecisionResult::new(DecisionAttrs {
            decision: "answer".to_string(),
            confidence: 1.5,
            ..DecisionAttrs::default()
        })
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_confidence");
    }

    #[test]
    fn test_decide_prefers_answer_only_when_strictly_better() {
        assert!(DecisionResult::decide(None, 0.9, 0.5, 0.1).is_answer());
        assert!(!DecisionResult::decide(None, 0.9, 0.1, 0.1).is_answer());
        assert!(!DecisionResult::decide(None, 0.9, -0.2, 0.0).is_answer());
    }

    #[test]
    fn test_decision_serializes_lowercase() {
        let result = DecisionResult::decide(None, 0.8, 0.6, 0.0);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["decision"], json!("answer"));
    }

    // ==========================================
    // ExpectedValuePolicy Tests
    // ==========================================

    #[test]
    fn test_policy_expected_values() {
        let policy = ExpectedValuePolicy::new(1.0, 4.0, 0.0);
        // 0.9 - 0.1 * 4
        assert!((policy.ev_answer(0.9) - 0.5).abs() < 1e-9);
        assert!((policy.break_even_confidence() - 0.8).abs() < 1e-9);
        assert!(policy.decide(None, 0.9).is_answer());
        assert!(!policy.decide(None, 0.7).is_answer());
    }

    #[test]
    fn test_policy_on_aggregation() {
        let mut metadata = Metadata::new();
        metadata.insert("strategy".to_string(), json!("majority_vote"));
        let aggregation = Aggregation {
            answer: "42".to_string(),
            confidence: 0.75,
            candidate: None,
            metadata,
        };
        let result = ExpectedValuePolicy::default().decide_aggregation(&aggregation);
        assert!(result.is_answer());
        assert_eq!(result.candidate.unwrap().content(), "42");
        assert_eq!(result.metadata["strategy"], json!("majority_vote"));
    }

    // ==========================================
    // CritiqueResult Tests
    // ==========================================

    #[test]
    fn test_critique_rejects_bad_severity() {
        for bad in [-0.1, 1.01, f64::NAN] {
            let err = CritiqueResult::new(CritiqueAttrs {
                severity: bad,
                ..CritiqueAttrs::default()
            })
            .unwrap_err();
            assert_eq!(err.reason(), "invalid_severity");
        }
    }

    #[test]
    fn test_actionable_rule() {
        assert!(!critique(0.3, &[]).is_actionable());
        assert!(critique(0.31, &[]).is_actionable());
        assert!(critique(0.0, &["typo"]).is_actionable());
    }

    #[test]
    fn test_from_verification_result() {
        let vr = VerificationResult::scored(0.8)
            .with_reasoning("mostly right")
            .with_issue("off by one")
            .with_suggestion("recheck bounds");
        let c = CritiqueResult::from_verification_result(&vr);
        assert!((c.severity() - 0.2).abs() < 1e-9);
        assert_eq!(c.feedback(), Some("mostly right"));
        assert_eq!(c.issues(), ["off by one".to_string()]);
        assert_eq!(c.suggestions(), ["recheck bounds".to_string()]);
        assert!(c.is_actionable());
    }

    #[test]
    fn test_from_unscored_verification() {
        let c = CritiqueResult::from_verification_result(&VerificationResult::default());
        assert_eq!(c.severity(), 0.5);
        assert!(c.is_actionable());
    }

    #[test]
    fn test_from_out_of_range_score_clamps() {
        let c = CritiqueResult::from_verification_result(&VerificationResult::scored(1.7));
        assert_eq!(c.severity(), 0.0);
    }

    #[test]
    fn test_should_refine_is_strict() {
        assert!(!critique(0.3, &[]).should_refine());
        assert!(critique(0.30001, &[]).should_refine());
        assert!(!critique(0.5, &[]).should_refine_with(0.5));
        assert!(critique(0.5, &[]).should_refine_with(0.4));
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(critique(0.29, &[]).severity_level(), SeverityLevel::Low);
        assert_eq!(critique(0.3, &[]).severity_level(), SeverityLevel::Medium);
        assert_eq!(critique(0.69, &[]).severity_level(), SeverityLevel::Medium);
        assert_eq!(critique(0.7, &[]).severity_level(), SeverityLevel::High);
    }

    #[test]
    fn test_merge_low_severities_not_actionable() {
        let merged = CritiqueResult::merge(&critique(0.2, &[]), &critique(0.3, &[]));
        assert_eq!(merged.severity(), 0.3);
        assert!(!merged.is_actionable());
    }

    #[test]
    fn test_merge_combines_fields() {
        let mut a_meta = Metadata::new();
        a_meta.insert("k".to_string(), json!("a"));
        a_meta.insert("only_a".to_string(), json!(1));
        let a = CritiqueResult::new(CritiqueAttrs {
            severity: 0.1,
            issues: vec!["i1".to_string()],
            suggestions: vec!["s1".to_string()],
            feedback: Some("first".to_string()),
            metadata: a_meta,
        })
        .unwrap();

        let mut b_meta = Metadata::new();
        b_meta.insert("k".to_string(), json!("b"));
        let b = CritiqueResult::new(CritiqueAttrs {
            severity: 0.6,
            issues: vec!["i2".to_string()],
            feedback: None,
            metadata: b_meta,
            ..CritiqueAttrs::default()
        })
        .unwrap();

        let merged = CritiqueResult::merge(&a, &b);
        assert_eq!(merged.issues(), ["i1".to_string(), "i2".to_string()]);
        assert_eq!(merged.suggestions(), ["s1".to_string()]);
        assert_eq!(merged.feedback(), Some("first"));
        assert_eq!(merged.severity(), 0.6);
        assert_eq!(merged.metadata()["k"], json!("b"));
        assert_eq!(merged.metadata()["only_a"], json!(1));
    }

    #[test]
    fn test_merge_joins_feedback() {
        let with = |text: &str| {
            CritiqueResult::new(CritiqueAttrs {
                feedback: Some(text.to_string()),
                ..CritiqueAttrs::default()
            })
            .unwrap()
        };
        let merged = CritiqueResult::merge(&with("one"), &with("two"));
        assert_eq!(merged.feedback(), Some("one\ntwo"));
    }
    // ==========================================
    // Critique Serde Tests
    // ==========================================

    #[test]
    fn test_critique_deserialize_rejects_bad_severity() {
        let err = serde_json::from_value::<CritiqueResult>(json!({
            "severity": 4.0,
            "issues": ["x"],
            "actionable": false
        }))
        .unwrap_err();
        assert!(err.to_string().contains("outside [0, 1]"));
    }

    #[test]
    fn test_critique_deserialize_requires_severity() {
        assert!(serde_json::from_value::<CritiqueResult>(json!({"issues": []})).is_err());
    }

    #[test]
    fn test_critique_deserialize_derives_actionable() {
        let parsed: CritiqueResult = serde_json::from_value(json!({
            "severity": 0.1,
            "issues": ["missing units"],
            "actionable": false
        }))
        .unwrap();
        assert!(parsed.is_actionable());
        assert_eq!(parsed.severity_level(), SeverityLevel::Low);

        let parsed: CritiqueResult =
            serde_json::from_value(json!({"severity": 0.2, "actionable": true})).unwrap();
        assert!(!parsed.is_actionable());
    }

    #[test]
    fn test_critique_serde_round_trip() {
        let original = critique(0.6, &["vague"]);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: CritiqueResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }
}
