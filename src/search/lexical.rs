//! Lexical retrieval tiers: keyword match and full-text match.
//!
//! Both tiers operate on expanded query terms and approved records only.
//! No ranking is applied within a tier; results come back in storage order.

use crate::models::KnowledgeRecord;
use crate::text;
use std::collections::BTreeSet;

/// Builds the term set for lexical matching: expansion terms plus keywords
/// extracted from the expanded query. Falls back to naive whitespace
/// splitting when expansion yields nothing (e.g. an all-stop-word query).
#[must_use]
pub fn match_terms(query: &str) -> BTreeSet<String> {
    let mut terms = text::expand_query(query);
    let expanded_joined = terms.iter().cloned().collect::<Vec<_>>().join(" ");
    terms.extend(text::extract_keywords(&expanded_joined, text::DEFAULT_MIN_KEYWORD_LENGTH));
    terms.extend(text::extract_keywords(query, text::DEFAULT_MIN_KEYWORD_LENGTH));

    if terms.is_empty() {
        terms = query
            .to_lowercase()
            .split_whitespace()
            .map(ToString::to_string)
            .collect();
    }

    terms
}

/// Symmetric-tolerant substring containment: short terms match inside
/// longer keywords and vice versa. Both sides are compared lowercased.
fn contains_either_way(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    a.contains(&b) || b.contains(&a)
}

/// Keyword tier: a record qualifies when any expanded term matches any of
/// its associated keywords by symmetric substring containment.
#[must_use]
pub fn search_by_keywords<'a>(
    records: &'a [KnowledgeRecord],
    query: &str,
) -> Vec<&'a KnowledgeRecord> {
    let terms = match_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .filter(|rec| rec.is_approved())
        .filter(|rec| {
            rec.keywords.iter().any(|keyword| {
                terms.iter().any(|term| contains_either_way(keyword, term))
            })
        })
        .collect()
}

/// Full-text tier: the same term set, substring-matched against the
/// record's question/answer and their processed variants.
#[must_use]
pub fn search_full_text<'a>(
    records: &'a [KnowledgeRecord],
    query: &str,
) -> Vec<&'a KnowledgeRecord> {
    let terms = match_terms(query);
    if terms.is_empty() {
        return Vec::new();
    }

    records
        .iter()
        .filter(|rec| rec.is_approved())
        .filter(|rec| {
            let haystacks = [
                Some(rec.question.as_str()),
                Some(rec.answer.as_str()),
                rec.question_processed.as_deref(),
                rec.answer_processed.as_deref(),
            ];
            haystacks.iter().flatten().any(|field| {
                let lowered = field.to_lowercase();
                terms.iter().any(|term| lowered.contains(term.as_str()))
            })
        })
        .collect()
}
