//! Crate-wide configuration.
//!
//! Every setting has a sensible default and an `ASKBASE_`-prefixed
//! environment override, so an embedder can run with zero configuration
//! and an operator can tune a deployment without code changes.

use crate::agent::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::broker::BrokerConfig;
use crate::llm::LlmHttpConfig;
use crate::{Error, Result};

/// Top-level configuration for the question-answering pipeline.
#[derive(Debug, Clone)]
pub struct AskbaseConfig {
    /// Call-broker throttling settings.
    pub broker: BrokerConfig,
    /// HTTP timeouts for the inference client.
    pub llm_http: LlmHttpConfig,
    /// Inference model identifier.
    pub model: String,
    /// Whether result caching is enabled.
    pub cache_enabled: bool,
    /// Redis connection URL, used when the `redis` feature is active and
    /// caching is enabled.
    pub redis_url: String,
    /// Minimum synthesis confidence for answering without a human.
    pub confidence_threshold: f64,
}

impl Default for AskbaseConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            llm_http: LlmHttpConfig::default(),
            model: "gemini-2.0-flash".to_string(),
            cache_enabled: true,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl AskbaseConfig {
    /// Loads configuration from the environment, reading a `.env` file if
    /// one is present.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default().with_env_overrides()
    }

    /// Applies `ASKBASE_*` environment variable overrides. Unparseable
    /// values are ignored and the defaults kept.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.broker = self.broker.with_env_overrides();
        self.llm_http = self.llm_http.with_env_overrides();

        if let Ok(v) = std::env::var("ASKBASE_MODEL") {
            if !v.trim().is_empty() {
                self.model = v;
            }
        }
        if let Ok(v) = std::env::var("ASKBASE_CACHE_ENABLED") {
            if let Ok(enabled) = v.parse::<bool>() {
                self.cache_enabled = enabled;
            }
        }
        if let Ok(v) = std::env::var("ASKBASE_REDIS_URL") {
            if !v.trim().is_empty() {
                self.redis_url = v;
            }
        }
        if let Ok(v) = std::env::var("ASKBASE_CONFIDENCE_THRESHOLD") {
            if let Ok(threshold) = v.parse::<f64>() {
                self.confidence_threshold = threshold;
            }
        }

        self
    }

    /// Validates that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an out-of-range confidence
    /// threshold, a zero requests-per-minute ceiling, or an empty model.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(Error::InvalidInput(format!(
                "confidence threshold {} outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if self.broker.rpm == 0 {
            return Err(Error::InvalidInput(
                "broker rpm must be at least 1".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::InvalidInput("model must not be empty".to_string()));
        }
        Ok(())
    }
}
