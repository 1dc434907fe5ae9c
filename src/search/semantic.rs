//! Model-assisted semantic retrieval.
//!
//! Ranks candidate records by meaning via the inference dependency. The
//! model's output is untrusted text parsed by a chain of progressively
//! weaker parsers; anything unparseable degrades to "no matches". This
//! tier never raises to the caller.

use super::lexical;
use crate::broker::CallBroker;
use crate::llm::{InferenceProvider, extract_json_from_response};
use crate::models::{KnowledgeRecord, MAX_SEARCH_RESULTS, RecordId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

/// Soft cap on how many candidates are sent to the model. Larger candidate
/// sets are pre-filtered through the lexical tiers first.
pub const CANDIDATE_CAP: usize = 100;

static ID_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""id"\s*:\s*(\d+)"#).expect("valid pattern"));
static BARE_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid pattern"));

/// Strict response contract requested from the model.
#[derive(Debug, Deserialize)]
struct SemanticResponse {
    #[serde(default)]
    found: bool,
    #[serde(default)]
    matches: Vec<SemanticMatch>,
}

#[derive(Debug, Deserialize)]
struct SemanticMatch {
    id: i64,
    #[serde(default)]
    #[allow(dead_code)]
    similarity: f64,
    #[serde(default)]
    #[allow(dead_code)]
    reason: String,
}

/// Semantic retriever delegating ranking to the inference dependency
/// through the call broker.
pub struct SemanticRetriever {
    provider: Arc<dyn InferenceProvider>,
    broker: Arc<CallBroker>,
}

impl SemanticRetriever {
    /// Creates a retriever. All provider calls go through `broker`.
    #[must_use]
    pub fn new(provider: Arc<dyn InferenceProvider>, broker: Arc<CallBroker>) -> Self {
        Self { provider, broker }
    }

    /// Ranks `candidates` against `query` by meaning, returning a subset in
    /// model-assigned order, capped at [`MAX_SEARCH_RESULTS`].
    ///
    /// Degrades to an empty result on any broker, provider, or parse
    /// failure.
    #[must_use]
    pub fn search(&self, query: &str, candidates: &[KnowledgeRecord]) -> Vec<KnowledgeRecord> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let pool = Self::narrow_candidates(candidates, query);
        let prompt = build_prompt(query, &pool);

        let provider = Arc::clone(&self.provider);
        let response = match self.broker.call(move || provider.generate(&prompt)) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "semantic search degraded to no matches");
                metrics::counter!("semantic_search_failures_total").increment(1);
                return Vec::new();
            },
        };

        let ids = parse_match_ids(&response);
        hydrate(&pool, &ids)
    }

    /// Pre-filters oversized candidate sets through the lexical tiers so
    /// the prompt stays within the model's usable context.
    fn narrow_candidates(candidates: &[KnowledgeRecord], query: &str) -> Vec<KnowledgeRecord> {
        if candidates.len() <= CANDIDATE_CAP {
            return candidates.to_vec();
        }

        let mut seen = HashSet::new();
        let mut narrowed = Vec::new();
        for rec in lexical::search_by_keywords(candidates, query)
            .into_iter()
            .chain(lexical::search_full_text(candidates, query))
        {
            if seen.insert(rec.id) {
                narrowed.push(rec.clone());
            }
        }

        if narrowed.is_empty() {
            // Lexical filters found nothing; let the model see the head of
            // the candidate set rather than nothing at all.
            candidates[..CANDIDATE_CAP].to_vec()
        } else {
            narrowed.truncate(CANDIDATE_CAP);
            narrowed
        }
    }
}

/// Builds the ranking prompt enumerating every candidate with its id.
fn build_prompt(query: &str, candidates: &[KnowledgeRecord]) -> String {
    let mut context = String::new();
    for rec in candidates {
        let _ = writeln!(
            context,
            "id {}:\nВопрос: {}\nОтвет: {}\n",
            rec.id,
            rec.display_question(),
            rec.display_answer()
        );
    }

    format!(
        r#"Найди записи базы знаний, отвечающие на вопрос пользователя по смыслу.

Вопрос пользователя: {query}

База знаний:
{context}

Верни только JSON без дополнительного текста:
{{
  "found": true,
  "matches": [
    {{"id": 1, "similarity": 0.95, "reason": "краткое объяснение"}}
  ]
}}

Если ничего не подходит: {{"found": false, "matches": []}}"#
    )
}

/// Parses match ids out of a model response.
///
/// Ordered parser attempts, strongest first:
/// 1. strict JSON (after Markdown fence stripping);
/// 2. a regex scan for `"id": <n>` fragments;
/// 3. any bare integers, as a last resort.
///
/// Each output is capped at [`MAX_SEARCH_RESULTS`] ids.
fn parse_match_ids(response: &str) -> Vec<RecordId> {
    let json = extract_json_from_response(response);

    if let Ok(parsed) = serde_json::from_str::<SemanticResponse>(json) {
        if !parsed.found {
            return Vec::new();
        }
        return parsed
            .matches
            .into_iter()
            .map(|m| RecordId::new(m.id))
            .take(MAX_SEARCH_RESULTS)
            .collect();
    }

    let from_id_fields: Vec<RecordId> = ID_FIELD_RE
        .captures_iter(response)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .map(RecordId::new)
        .take(MAX_SEARCH_RESULTS)
        .collect();
    if !from_id_fields.is_empty() {
        tracing::debug!("semantic response parsed via id-field fallback");
        return from_id_fields;
    }

    let bare: Vec<RecordId> = BARE_INT_RE
        .find_iter(response)
        .filter_map(|m| m.as_str().parse::<i64>().ok())
        .map(RecordId::new)
        .take(MAX_SEARCH_RESULTS)
        .collect();
    if !bare.is_empty() {
        tracing::debug!("semantic response parsed via bare-integer fallback");
    }
    bare
}

/// Maps parsed ids back onto the candidate pool, preserving the model's
/// ordering, dropping ids that are not in the pool, deduplicating.
fn hydrate(pool: &[KnowledgeRecord], ids: &[RecordId]) -> Vec<KnowledgeRecord> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(**id))
        .filter_map(|id| pool.iter().find(|rec| rec.id == *id).cloned())
        .take(MAX_SEARCH_RESULTS)
        .collect()
}
