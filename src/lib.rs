//! # Askbase
//!
//! Question answering core for a small, curated knowledge base.
//!
//! Askbase turns a free-text question into either a confident answer or a
//! human escalation. The pipeline is a cascading search (cache, keyword,
//! full-text, model-assisted semantic) feeding a confidence-gated answer
//! synthesizer. Every call to the quota-constrained inference dependency is
//! funneled through a single rate-limited [`broker::CallBroker`].
//!
//! ## Features
//!
//! - Three-tier retrieval cascade with short-circuiting and result caching
//! - Serialized call broker enforcing a requests-per-minute ceiling with
//!   exponential-backoff retries
//! - Query expansion over a domain synonym table
//! - Confidence gate deciding between answering and escalating to a human
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use askbase::llm::GeminiClient;
//! use askbase::{
//!     AgentService, AskbaseConfig, CallBroker, InMemoryKnowledgeStore, InMemoryStore,
//!     ResultCache, SearchService,
//! };
//!
//! let config = AskbaseConfig::from_env();
//! let broker = Arc::new(CallBroker::new(config.broker.clone()));
//! let provider: Arc<dyn askbase::InferenceProvider> =
//!     Arc::new(GeminiClient::new().with_model(config.model.clone()));
//! let cache = Arc::new(ResultCache::new(Arc::new(InMemoryStore::new())));
//! let store = Arc::new(InMemoryKnowledgeStore::with_records(records));
//! let search = Arc::new(SearchService::new(
//!     store, Arc::clone(&cache), Arc::clone(&provider), Arc::clone(&broker),
//! ));
//! let agent = AgentService::new(search, provider, broker, cache)
//!     .with_confidence_threshold(config.confidence_threshold);
//!
//! let outcome = agent.process_question("Когда зарплата?")?;
//! if outcome.call_manager {
//!     // forward to a human
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod agent;
pub mod broker;
pub mod cache;
pub mod config;
pub mod llm;
pub mod models;
pub mod observability;
pub mod search;
pub mod storage;
pub mod text;

// Re-exports for convenience
pub use agent::AgentService;
pub use broker::{BrokerConfig, BrokerStats, CallBroker};
pub use cache::{CacheStats, CacheStore, InMemoryStore, ResultCache};
pub use config::AskbaseConfig;
pub use llm::{GeminiClient, InferenceProvider};
pub use models::{
    IntentAnalysis, KnowledgeRecord, QuestionOutcome, RecordId, RecordStatus, SynthesisVerdict,
};
pub use observability::{LogFormat, init_logging};
pub use search::SearchService;
pub use storage::{InMemoryKnowledgeStore, KnowledgeStore};

/// Error type for askbase operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty queries, malformed parameters |
/// | `OperationFailed` | Inference HTTP errors, store failures, broker wait timeouts |
/// | `RetryExhausted` | The call broker spent its whole retry budget on one task |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - The inference API returns a non-success status or unparseable body
    /// - A knowledge store lookup fails
    /// - A caller times out waiting on the broker
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A brokered call failed after exhausting its retry budget.
    ///
    /// Carries the last underlying error from the inference dependency.
    #[error("call failed after {attempts} attempts: {cause}")]
    RetryExhausted {
        /// Number of attempts made (initial call plus retries).
        attempts: u32,
        /// The last underlying error.
        cause: String,
    },
}

/// Result type alias for askbase operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized to avoid duplicate implementations across the codebase.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidInput("empty query".to_string());
        assert_eq!(err.to_string(), "invalid input: empty query");

        let err = Error::OperationFailed {
            operation: "generate".to_string(),
            cause: "connect error".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operation 'generate' failed: connect error"
        );

        let err = Error::RetryExhausted {
            attempts: 4,
            cause: "503 overloaded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "call failed after 4 attempts: 503 overloaded"
        );
    }

    #[test]
    fn test_current_timestamp_is_recent() {
        // 2024-01-01T00:00:00Z
        assert!(current_timestamp() > 1_704_067_200);
    }
}
