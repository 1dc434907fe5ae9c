//! Question-answering agent: intent analysis, candidate gathering, answer
//! synthesis, and the confidence gate.
//!
//! The agent never answers on low evidence. Whenever synthesis fails, finds
//! nothing, or lands under the confidence threshold, the outcome routes the
//! question to a human instead of delivering a shaky answer.

use crate::broker::CallBroker;
use crate::cache::{
    AGENT_NAMESPACE, DEFAULT_TTL, INTENT_NAMESPACE, NEGATIVE_TTL, ResultCache,
};
use crate::llm::{InferenceProvider, extract_json_from_response};
use crate::models::{IntentAnalysis, KnowledgeRecord, QuestionOutcome, RecordId, SynthesisVerdict};
use crate::search::SearchService;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Minimum synthesis confidence for delivering an answer without a human.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Confidence assigned when synthesis output is unusable but exactly one
/// candidate record exists, whose answer is returned verbatim.
const FALLBACK_CONFIDENCE: f64 = 0.85;

/// At most this many candidate records are handed to synthesis.
const MAX_SYNTHESIS_CANDIDATES: usize = 5;

/// At most this many intent-suggested queries are searched per question.
const MAX_SEARCH_QUERIES: usize = 2;

/// Strict response contract requested from the synthesis prompt. `sources`
/// are 1-based indices into the enumerated candidate list.
#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    sources: Vec<usize>,
    #[serde(default)]
    reason: String,
}

/// End-to-end question-answering agent.
pub struct AgentService {
    search: Arc<SearchService>,
    provider: Arc<dyn InferenceProvider>,
    broker: Arc<CallBroker>,
    cache: Arc<ResultCache>,
    confidence_threshold: f64,
}

impl AgentService {
    /// Creates an agent over a search service, an inference provider
    /// throttled by `broker`, and a result cache.
    #[must_use]
    pub fn new(
        search: Arc<SearchService>,
        provider: Arc<dyn InferenceProvider>,
        broker: Arc<CallBroker>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            search,
            provider,
            broker,
            cache,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }

    /// Overrides the confidence threshold, clamped to [0, 1].
    #[must_use]
    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Processes one user question end to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank question and propagates
    /// knowledge-store failures. Inference and cache failures degrade into
    /// an escalating outcome instead of an error.
    pub fn process_question(&self, question: &str) -> Result<QuestionOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("question is empty".to_string()));
        }

        if let Some(cached) = self.cache.get::<QuestionOutcome>(AGENT_NAMESPACE, question) {
            return Ok(cached);
        }

        metrics::counter!("agent_questions_total").increment(1);

        let intent = self.analyze_intent(question);
        let candidates = self.gather_candidates(question, &intent)?;

        if candidates.is_empty() {
            tracing::info!(intent = %intent.intent, "no candidates, escalating to a human");
            metrics::counter!("agent_escalations_total", "cause" => "no_candidates").increment(1);
            let outcome = escalation(intent, "no matching records");
            self.cache
                .set(AGENT_NAMESPACE, question, &outcome, NEGATIVE_TTL);
            return Ok(outcome);
        }

        let verdict = self.synthesize_answer(question, &candidates);
        let call_manager = !verdict.found || verdict.confidence < self.confidence_threshold;
        if call_manager {
            metrics::counter!("agent_escalations_total", "cause" => "low_confidence").increment(1);
        }

        tracing::info!(
            found = verdict.found,
            confidence = verdict.confidence,
            call_manager,
            sources = verdict.sources.len(),
            "question processed"
        );

        let ttl = if verdict.found { DEFAULT_TTL } else { NEGATIVE_TTL };
        let outcome = QuestionOutcome {
            found: verdict.found,
            answer: verdict.answer,
            confidence: verdict.confidence,
            sources: verdict.sources,
            call_manager,
            intent,
            reason: verdict.reason,
        };
        self.cache.set(AGENT_NAMESPACE, question, &outcome, ttl);

        Ok(outcome)
    }

    /// Analyzes what the user is asking for and which queries to search.
    ///
    /// Falls back to the identity analysis (the raw question as its own
    /// query) when the model is unavailable or returns garbage.
    #[must_use]
    pub fn analyze_intent(&self, question: &str) -> IntentAnalysis {
        if let Some(cached) = self.cache.get::<IntentAnalysis>(INTENT_NAMESPACE, question) {
            return cached;
        }

        let prompt = intent_prompt(question);
        let provider = Arc::clone(&self.provider);
        let response = match self.broker.call(move || provider.generate(&prompt)) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "intent analysis unavailable, using raw question");
                return IntentAnalysis::identity(question);
            },
        };

        let json = extract_json_from_response(&response);
        match serde_json::from_str::<IntentAnalysis>(json) {
            Ok(mut intent) => {
                if intent.search_queries.is_empty() {
                    intent.search_queries.push(question.to_string());
                }
                self.cache
                    .set(INTENT_NAMESPACE, question, &intent, DEFAULT_TTL);
                intent
            },
            Err(err) => {
                tracing::warn!(error = %err, "intent response unparseable, using raw question");
                IntentAnalysis::identity(question)
            },
        }
    }

    /// Composes an answer from candidate records, or declines.
    #[must_use]
    pub fn synthesize_answer(
        &self,
        question: &str,
        candidates: &[KnowledgeRecord],
    ) -> SynthesisVerdict {
        if candidates.is_empty() {
            return SynthesisVerdict::not_found("no candidates");
        }
        let candidates = &candidates[..candidates.len().min(MAX_SYNTHESIS_CANDIDATES)];

        let prompt = synthesis_prompt(question, candidates);
        let provider = Arc::clone(&self.provider);
        let response = match self.broker.call(move || provider.generate(&prompt)) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "synthesis unavailable");
                return fallback_verdict(candidates, "synthesis unavailable");
            },
        };

        let json = extract_json_from_response(&response);
        match serde_json::from_str::<SynthesisResponse>(json) {
            Ok(parsed) => {
                if !parsed.found {
                    let reason = if parsed.reason.is_empty() {
                        "model declined to answer".to_string()
                    } else {
                        parsed.reason
                    };
                    return SynthesisVerdict::not_found(reason);
                }
                let sources = resolve_sources(&parsed.sources, candidates);
                SynthesisVerdict {
                    found: true,
                    answer: parsed.answer,
                    confidence: parsed.confidence.clamp(0.0, 1.0),
                    sources,
                    reason: parsed.reason,
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "synthesis response unparseable");
                fallback_verdict(candidates, "unparseable synthesis response")
            },
        }
    }

    /// Gathers candidate records by running the cascade over the best
    /// intent-suggested queries, deduplicated by record id.
    fn gather_candidates(
        &self,
        question: &str,
        intent: &IntentAnalysis,
    ) -> Result<Vec<KnowledgeRecord>> {
        let raw_question = [question.to_string()];
        let queries: &[String] = if intent.search_queries.is_empty() {
            &raw_question
        } else {
            &intent.search_queries
        };

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for query in queries.iter().take(MAX_SEARCH_QUERIES) {
            for rec in self.search.search(query)? {
                if seen.insert(rec.id) {
                    candidates.push(rec);
                }
                if candidates.len() >= MAX_SYNTHESIS_CANDIDATES {
                    return Ok(candidates);
                }
            }
        }
        Ok(candidates)
    }
}

/// Builds an escalating outcome with no answer.
fn escalation(intent: IntentAnalysis, reason: &str) -> QuestionOutcome {
    QuestionOutcome {
        found: false,
        answer: String::new(),
        confidence: 0.0,
        sources: Vec::new(),
        call_manager: true,
        intent,
        reason: reason.to_string(),
    }
}

/// When synthesis output is unusable: a single candidate's answer is good
/// enough to return verbatim, anything else declines.
fn fallback_verdict(candidates: &[KnowledgeRecord], reason: &str) -> SynthesisVerdict {
    if let [only] = candidates {
        return SynthesisVerdict {
            found: true,
            answer: only.display_answer().to_string(),
            confidence: FALLBACK_CONFIDENCE,
            sources: vec![only.id],
            reason: "fallback to single match".to_string(),
        };
    }
    SynthesisVerdict::not_found(reason)
}

/// Maps 1-based candidate indices from the model onto record ids, dropping
/// out-of-range indices.
fn resolve_sources(indices: &[usize], candidates: &[KnowledgeRecord]) -> Vec<RecordId> {
    let mut seen = HashSet::new();
    indices
        .iter()
        .filter_map(|&idx| idx.checked_sub(1).and_then(|i| candidates.get(i)))
        .map(|rec| rec.id)
        .filter(|id| seen.insert(*id))
        .collect()
}

fn intent_prompt(question: &str) -> String {
    format!(
        r#"Проанализируй вопрос сотрудника и определи его намерение.

Вопрос: {question}

Верни только JSON без дополнительного текста:
{{
  "intent": "краткое описание намерения",
  "entities": ["ключевые сущности"],
  "search_queries": ["2-3 поисковых запроса, лучший первым"]
}}"#
    )
}

fn synthesis_prompt(question: &str, candidates: &[KnowledgeRecord]) -> String {
    let mut context = String::new();
    for (i, rec) in candidates.iter().enumerate() {
        let _ = writeln!(
            context,
            "Запись {}:\nВопрос: {}\nОтвет: {}\n",
            i + 1,
            rec.display_question(),
            rec.display_answer()
        );
    }

    format!(
        r#"Составь ответ на вопрос сотрудника, используя только записи базы знаний ниже.
Если записи не отвечают на вопрос, не придумывай ответ.

Вопрос: {question}

{context}

Верни только JSON без дополнительного текста:
{{
  "found": true,
  "answer": "ответ для сотрудника",
  "confidence": 0.95,
  "sources": [1],
  "reason": "краткое объяснение"
}}

Если ответа нет: {{"found": false, "answer": "", "confidence": 0.0, "sources": [], "reason": "почему"}}"#
    )
}
