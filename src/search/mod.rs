//! Cascading search over the knowledge base.
//!
//! Four tiers, cheapest first, each consulted only when everything before
//! it came up empty: cached result, keyword match, full-text match, then
//! model-assisted semantic ranking. A hit at any tier short-circuits the
//! rest, so the expensive semantic tier runs only for genuinely novel
//! queries.

mod lexical;
mod semantic;

pub use semantic::SemanticRetriever;

use crate::broker::CallBroker;
use crate::cache::{DEFAULT_TTL, ResultCache, SEARCH_NAMESPACE};
use crate::llm::InferenceProvider;
use crate::models::{CachedSearch, KnowledgeRecord, MAX_SEARCH_RESULTS};
use crate::storage::KnowledgeStore;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;

/// Cascading search service.
pub struct SearchService {
    store: Arc<dyn KnowledgeStore>,
    cache: Arc<ResultCache>,
    semantic: SemanticRetriever,
}

impl SearchService {
    /// Creates a search service over a knowledge store, a result cache, and
    /// an inference provider throttled by `broker`.
    #[must_use]
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        cache: Arc<ResultCache>,
        provider: Arc<dyn InferenceProvider>,
        broker: Arc<CallBroker>,
    ) -> Self {
        Self {
            store,
            cache,
            semantic: SemanticRetriever::new(provider, broker),
        }
    }

    /// Runs the cascade for a query, returning matching records capped at
    /// [`MAX_SEARCH_RESULTS`].
    ///
    /// Results come back in tier-assigned order: storage order for the
    /// lexical tiers, model-assigned order for the semantic tier.
    ///
    /// # Errors
    ///
    /// Returns an error only when the knowledge store is unreachable. Cache
    /// and inference failures degrade within their tiers.
    pub fn search(&self, query: &str) -> Result<Vec<KnowledgeRecord>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.cache.get::<CachedSearch>(SEARCH_NAMESPACE, query) {
            return self.rehydrate(&cached);
        }

        let started = Instant::now();
        let records = self.store.approved_records()?;
        let results = self.run_tiers(query, &records);

        let elapsed = started.elapsed();
        metrics::histogram!("search_duration_seconds").record(elapsed.as_secs_f64());

        // Only non-empty results are cached. An empty cascade result must
        // stay recomputable so records approved later become visible
        // immediately; unanswerable questions are negatively cached at the
        // agent layer instead.
        if results.is_empty() {
            tracing::info!(query_len = query.len(), "search found nothing");
            return Ok(Vec::new());
        }

        let ids = results.iter().map(|rec| rec.id).collect();
        self.cache
            .set(SEARCH_NAMESPACE, query, &CachedSearch::hit(ids), DEFAULT_TTL);

        Ok(results)
    }

    /// Deletes every cached search result, e.g. after records are edited or
    /// re-curated. Returns how many entries were removed.
    pub fn invalidate_cache(&self) -> usize {
        self.cache.invalidate(&format!("{SEARCH_NAMESPACE}:*"))
    }

    fn run_tiers(&self, query: &str, records: &[KnowledgeRecord]) -> Vec<KnowledgeRecord> {
        if records.is_empty() {
            return Vec::new();
        }

        let keyword_hits = lexical::search_by_keywords(records, query);
        if !keyword_hits.is_empty() {
            tracing::debug!(count = keyword_hits.len(), "keyword tier matched");
            metrics::counter!("search_tier_hits_total", "tier" => "keyword").increment(1);
            return cap(keyword_hits.into_iter().cloned().collect());
        }

        let full_text_hits = lexical::search_full_text(records, query);
        if !full_text_hits.is_empty() {
            tracing::debug!(count = full_text_hits.len(), "full-text tier matched");
            metrics::counter!("search_tier_hits_total", "tier" => "full_text").increment(1);
            return cap(full_text_hits.into_iter().cloned().collect());
        }

        let semantic_hits = self.semantic.search(query, records);
        if !semantic_hits.is_empty() {
            tracing::debug!(count = semantic_hits.len(), "semantic tier matched");
            metrics::counter!("search_tier_hits_total", "tier" => "semantic").increment(1);
        }
        cap(semantic_hits)
    }

    /// Resolves a cached id list back to current records. Ids that no
    /// longer resolve, or resolve to records since un-approved, are dropped
    /// while the cached ordering is preserved.
    fn rehydrate(&self, cached: &CachedSearch) -> Result<Vec<KnowledgeRecord>> {
        if !cached.found {
            return Ok(Vec::new());
        }
        let mut records = self.store.records_by_ids(&cached.ids)?;
        records.truncate(MAX_SEARCH_RESULTS);
        Ok(records)
    }
}

fn cap(mut records: Vec<KnowledgeRecord>) -> Vec<KnowledgeRecord> {
    records.truncate(MAX_SEARCH_RESULTS);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use crate::cache::InMemoryStore;
    use crate::models::{RecordId, RecordStatus};
    use crate::storage::InMemoryKnowledgeStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Provider that counts invocations and returns a fixed response.
    struct CountingProvider {
        response: String,
        calls: AtomicU32,
    }

    impl CountingProvider {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl InferenceProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn record(id: i64, question: &str, answer: &str, keywords: &[&str]) -> KnowledgeRecord {
        KnowledgeRecord {
            id: RecordId::new(id),
            question: question.to_string(),
            answer: answer.to_string(),
            question_processed: None,
            answer_processed: None,
            status: RecordStatus::Approved,
            keywords: keywords.iter().map(ToString::to_string).collect(),
            created_at: 0,
            approved_at: Some(0),
        }
    }

    fn fast_broker() -> Arc<CallBroker> {
        Arc::new(CallBroker::new(BrokerConfig {
            rpm: 60_000,
            max_retries: 0,
            wait_timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(1),
        }))
    }

    fn service(
        records: Vec<KnowledgeRecord>,
        provider: Arc<CountingProvider>,
    ) -> SearchService {
        SearchService::new(
            Arc::new(InMemoryKnowledgeStore::with_records(records)),
            Arc::new(ResultCache::new(Arc::new(InMemoryStore::new()))),
            provider,
            fast_broker(),
        )
    }

    #[test]
    fn test_keyword_hit_short_circuits_the_model() {
        let provider = CountingProvider::new("{}");
        let svc = service(
            vec![record(1, "Когда выплачивается зарплата?", "5-го и 20-го", &["зарплата"])],
            Arc::clone(&provider),
        );

        let results = svc.search("когда зарплата?").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_full_text_hit_short_circuits_the_model() {
        let provider = CountingProvider::new("{}");
        let svc = service(
            vec![record(1, "вопрос про парковку", "во дворе", &[])],
            Arc::clone(&provider),
        );

        let results = svc.search("парковку").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_semantic_tier_runs_only_when_lexical_misses() {
        let provider = CountingProvider::new(
            r#"{"found": true, "matches": [{"id": 1, "similarity": 0.9, "reason": "смысл"}]}"#,
        );
        let svc = service(
            vec![record(1, "график выплат", "дважды в месяц", &[])],
            Arc::clone(&provider),
        );

        let results = svc.search("деньги приходят редко").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.value(), 1);
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn test_repeat_query_is_served_from_cache() {
        let provider = CountingProvider::new(
            r#"{"found": true, "matches": [{"id": 1, "similarity": 0.9, "reason": "смысл"}]}"#,
        );
        let svc = service(
            vec![record(1, "график выплат", "дважды в месяц", &[])],
            Arc::clone(&provider),
        );

        let first = svc.search("деньги приходят редко").unwrap();
        let second = svc.search("деньги приходят редко").unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn test_empty_result_is_not_cached() {
        let provider = CountingProvider::new(r#"{"found": false, "matches": []}"#);
        let svc = service(
            vec![record(1, "совсем другое", "ответ", &[])],
            Arc::clone(&provider),
        );

        assert!(svc.search("про жирафов").unwrap().is_empty());
        assert!(svc.search("про жирафов").unwrap().is_empty());
        // No entry was written, so the cascade re-ran both times
        assert_eq!(provider.call_count(), 2);
    }

    #[test]
    fn test_record_approved_after_a_miss_is_found_immediately() {
        let provider = CountingProvider::new(r#"{"found": false, "matches": []}"#);
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let svc = SearchService::new(
            Arc::clone(&store) as Arc<dyn KnowledgeStore>,
            Arc::new(ResultCache::new(Arc::new(InMemoryStore::new()))),
            Arc::clone(&provider) as Arc<dyn InferenceProvider>,
            fast_broker(),
        );

        assert!(svc.search("когда зарплата?").unwrap().is_empty());

        // A curator approves a matching record after the missed query
        store.replace(vec![record(
            1,
            "Когда выплачивается зарплата?",
            "5-го и 20-го",
            &["зарплата"],
        )]);

        let results = svc.search("когда зарплата?").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id.value(), 1);
    }

    #[test]
    fn test_rehydration_drops_records_unapproved_since_caching() {
        let provider = CountingProvider::new("{}");
        let store = Arc::new(InMemoryKnowledgeStore::with_records(vec![record(
            1,
            "Когда выплачивается зарплата?",
            "5-го и 20-го",
            &["зарплата"],
        )]));
        let svc = SearchService::new(
            Arc::clone(&store) as Arc<dyn KnowledgeStore>,
            Arc::new(ResultCache::new(Arc::new(InMemoryStore::new()))),
            provider,
            fast_broker(),
        );

        assert_eq!(svc.search("зарплата").unwrap().len(), 1);

        // The record gets rejected after the result was cached
        let mut rejected = record(1, "Когда выплачивается зарплата?", "5-го и 20-го", &["зарплата"]);
        rejected.status = RecordStatus::Rejected;
        store.replace(vec![rejected]);

        assert!(svc.search("зарплата").unwrap().is_empty());
    }

    #[test]
    fn test_empty_knowledge_base_skips_the_model() {
        let provider = CountingProvider::new("{}");
        let svc = service(Vec::new(), Arc::clone(&provider));

        assert!(svc.search("любой вопрос").unwrap().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_blank_query_returns_empty() {
        let provider = CountingProvider::new("{}");
        let svc = service(
            vec![record(1, "q", "a", &["kw"])],
            Arc::clone(&provider),
        );

        assert!(svc.search("   ").unwrap().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn test_results_are_capped() {
        let provider = CountingProvider::new("{}");
        let records: Vec<KnowledgeRecord> = (0..25)
            .map(|i| record(i, "зарплата всегда", "ответ", &["зарплата"]))
            .collect();
        let svc = service(records, provider);

        let results = svc.search("зарплата").unwrap();
        assert_eq!(results.len(), MAX_SEARCH_RESULTS);
    }

    #[test]
    fn test_invalidate_cache_forces_recomputation() {
        let provider = CountingProvider::new(
            r#"{"found": true, "matches": [{"id": 1, "similarity": 0.9, "reason": "смысл"}]}"#,
        );
        let svc = service(
            vec![record(1, "график выплат", "дважды в месяц", &[])],
            Arc::clone(&provider),
        );

        svc.search("деньги приходят редко").unwrap();
        assert_eq!(svc.invalidate_cache(), 1);
        svc.search("деньги приходят редко").unwrap();
        assert_eq!(provider.call_count(), 2);
    }
}
