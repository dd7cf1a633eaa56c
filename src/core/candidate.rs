//! Candidate answers produced by an external generator.
//!
//! A `Candidate` is the unit that flows through consensus checking,
//! aggregation and search scoring. It is immutable once built: the
//! builder-style setters consume `self` and every field is read through
//! an accessor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Open, string-keyed diagnostic data attached to engine values.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A single generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    id: String,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    metadata: Metadata,
}

impl Candidate {
    /// Create a candidate with the given id and content.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            model: None,
            score: None,
            metadata: Metadata::new(),
        }
    }

    /// Attach the producing model's identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Attach a score (e.g. log-probability or verifier output).
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replace the id, keeping everything else.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let c = Candidate::new("c1", "42")
            .with_model("local-7b")
            .with_score(0.9)
            .with_metadata("tokens", serde_json::json!(12));

        assert_eq!(c.id(), "c1");
        assert_eq!(c.content(), "42");
        assert_eq!(c.model(), Some("local-7b"));
        assert_eq!(c.score(), Some(0.9));
        assert_eq!(c.metadata()["tokens"], serde_json::json!(12));
    }

    #[test]
    fn test_serde_skips_absent_optionals() {
        let json = serde_json::to_string(&Candidate::new("a", "x")).unwrap();
        assert!(!json.contains("score"));
        assert!(!json.contains("model"));
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn test_deserialize_minimal_candidate() {
        let c: Candidate = serde_json::from_str(r#"{"content": "Paris"}"#).unwrap();
        assert_eq!(c.id(), "");
        assert_eq!(c.content(), "Paris");
        assert!(c.score().is_none());
    }
}
