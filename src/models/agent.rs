//! Intent, synthesis, and escalation types.

use super::RecordId;
use serde::{Deserialize, Serialize};

/// Result of the intent-analysis stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAnalysis {
    /// Short summary of what the user is asking for.
    pub intent: String,
    /// Key entities extracted from the question.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Alternative search queries to try, best first.
    #[serde(default)]
    pub search_queries: Vec<String>,
}

impl IntentAnalysis {
    /// Identity fallback used when intent analysis is unavailable:
    /// the raw question is its own search query.
    #[must_use]
    pub fn identity(question: &str) -> Self {
        Self {
            intent: question.to_string(),
            entities: Vec::new(),
            search_queries: vec![question.to_string()],
        }
    }
}

/// Result of the answer-synthesis stage.
///
/// Derived, never persisted; consumed immediately by the confidence gate.
#[derive(Debug, Clone)]
pub struct SynthesisVerdict {
    /// Whether the model composed an answer it stands behind.
    pub found: bool,
    /// The composed answer text (empty when not found).
    pub answer: String,
    /// Model confidence in [0, 1].
    pub confidence: f64,
    /// Ids of the records the answer was sourced from.
    pub sources: Vec<RecordId>,
    /// Why the model is (or is not) confident.
    pub reason: String,
}

impl SynthesisVerdict {
    /// The not-found verdict.
    #[must_use]
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            found: false,
            answer: String::new(),
            confidence: 0.0,
            sources: Vec::new(),
            reason: reason.into(),
        }
    }
}

/// Outcome of processing one question end to end.
///
/// Consumed by the chat-platform collaborator to decide between delivering
/// the answer and forwarding the question to a human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionOutcome {
    /// Whether a confident answer was composed.
    pub found: bool,
    /// The answer text (empty when escalating).
    pub answer: String,
    /// Synthesis confidence in [0, 1].
    pub confidence: f64,
    /// Source record ids backing the answer.
    pub sources: Vec<RecordId>,
    /// Whether the question should be routed to a human.
    pub call_manager: bool,
    /// Intent data, kept attached even on escalation for downstream logging.
    pub intent: IntentAnalysis,
    /// Synthesis rationale.
    #[serde(default)]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_fallback_searches_the_raw_question() {
        let intent = IntentAnalysis::identity("Как оформить отпуск?");
        assert_eq!(intent.intent, "Как оформить отпуск?");
        assert!(intent.entities.is_empty());
        assert_eq!(intent.search_queries, vec!["Как оформить отпуск?"]);
    }

    #[test]
    fn test_not_found_verdict_has_zero_confidence() {
        let verdict = SynthesisVerdict::not_found("no candidates");
        assert!(!verdict.found);
        assert!(verdict.answer.is_empty());
        assert!(verdict.confidence.abs() < f64::EPSILON);
        assert_eq!(verdict.reason, "no candidates");
    }

    #[test]
    fn test_intent_tolerates_missing_optional_fields() {
        let intent: IntentAnalysis = serde_json::from_str(r#"{"intent": "зарплата"}"#).unwrap();
        assert!(intent.search_queries.is_empty());
        assert!(intent.entities.is_empty());
    }
}
