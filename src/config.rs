//! Engine configuration
//!
//! A single serde document describing every tunable part of the engine.
//! Missing sections and fields take their defaults, so `{}` is a valid
//! configuration.
//!
//! ```json
//! {
//!   "adaptive": { "min_candidates": 3, "early_stop_threshold": 0.8 },
//!   "aggregator": { "strategy": "weighted", "weights": { "majority_vote": 0.7, "length": 0.3 } },
//!   "beam": { "beam_width": 4, "depth": 2 },
//!   "rate_limit": { "max_requests": 60, "window_ms": 60000 },
//!   "sandbox": { "allowed_commands": ["python3"], "timeout_ms": 5000 }
//! }
//! ```

use crate::core::adaptive::{AdaptiveConfig, AdaptiveSelfConsistency};
use crate::core::aggregation::{AggregationStrategy, Aggregator, Weighted};
use crate::core::error::ConfigError;
use crate::core::generator::Generator;
use crate::core::search::{BeamSearch, BeamSearchConfig};
use crate::services::rate_limiter::{
    RateLimitConfig, RateLimitedGenerator, RateLimiter, DEFAULT_RATE_LIMIT_KEY,
};
use crate::services::sandbox::{CommandSandbox, SandboxConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Which aggregator the engine uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// `majority_vote`, `best_of_n` or `weighted`
    pub strategy: String,
    /// Per-strategy weights for `weighted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<BTreeMap<String, f64>>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            strategy: "majority_vote".to_string(),
            weights: None,
        }
    }
}

impl AggregatorConfig {
    pub fn build(&self) -> Result<Arc<dyn Aggregator>, ConfigError> {
        match (self.strategy.as_str(), &self.weights) {
            ("weighted", Some(weights)) => {
                let pairs = weights.iter().map(|(name, w)| (name.as_str(), *w));
                Ok(Arc::new(Weighted::from_weights(pairs)?))
            }
            (name, _) => Ok(Arc::new(AggregationStrategy::from_name(name)?)),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub adaptive: AdaptiveConfig,
    pub aggregator: AggregatorConfig,
    pub beam: BeamSearchConfig,
    /// Throttle applied to the generator; `None` = unlimited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
    pub sandbox: SandboxConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json_str(&json)
    }

    /// Check every section without building anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.adaptive.validate()?;
        self.aggregator.build()?;
        self.beam.validate()?;
        if let Some(limit) = &self.rate_limit {
            limit
                .validate()
                .map_err(|e| ConfigError::InvalidRateLimit {
                    message: e.to_string(),
                })?;
        }
        self.sandbox
            .validate()
            .map_err(|e| ConfigError::InvalidSandbox {
                message: e.to_string(),
            })
    }

    pub fn build_adaptive(&self) -> Result<AdaptiveSelfConsistency, ConfigError> {
        AdaptiveSelfConsistency::new(self.adaptive.clone(), self.aggregator.build()?)
    }

    pub fn build_beam_search(&self) -> Result<BeamSearch, ConfigError> {
        BeamSearch::new(self.beam.clone())
    }

    pub fn build_sandbox(&self) -> Result<CommandSandbox, ConfigError> {
        CommandSandbox::new(self.sandbox.clone()).map_err(|e| ConfigError::InvalidSandbox {
            message: e.to_string(),
        })
    }

    /// Wrap `generator` in the configured rate limit, if any.
    ///
    /// Spawns the limiter actor, so this must run inside a tokio runtime.
    pub async fn limit_generator(
        &self,
        generator: Arc<dyn Generator>,
    ) -> Result<Arc<dyn Generator>, ConfigError> {
        let Some(limit) = self.rate_limit else {
            return Ok(generator);
        };
        let (handle, _task) = RateLimiter::new().spawn();
        handle
            .configure(DEFAULT_RATE_LIMIT_KEY, limit)
            .await
            .map_err(|e| ConfigError::InvalidRateLimit {
                message: e.to_string(),
            })?;
        Ok(Arc::new(RateLimitedGenerator::new(generator, handle)))
    }
}
