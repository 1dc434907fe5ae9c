//! Knowledge record storage boundary.
//!
//! Persistence (schema, migrations, curation) lives in a collaborating
//! service; the search pipeline only ever reads approved records through
//! this trait.

use crate::models::{KnowledgeRecord, RecordId};
use crate::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// Read-only access to the curated knowledge base.
pub trait KnowledgeStore: Send + Sync {
    /// Fetches every approved record, in storage order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn approved_records(&self) -> Result<Vec<KnowledgeRecord>>;

    /// Fetches approved records by id, in the order the ids are given.
    /// Ids that do not resolve (or are no longer approved) are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn records_by_ids(&self, ids: &[RecordId]) -> Result<Vec<KnowledgeRecord>> {
        let all = self.approved_records()?;
        let by_id: HashMap<RecordId, KnowledgeRecord> =
            all.into_iter().map(|rec| (rec.id, rec)).collect();
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }
}

/// Process-local knowledge store.
///
/// Used in tests and by embedders that load the record set up front.
pub struct InMemoryKnowledgeStore {
    records: RwLock<Vec<KnowledgeRecord>>,
}

impl InMemoryKnowledgeStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    /// Creates a store seeded with records.
    #[must_use]
    pub fn with_records(records: Vec<KnowledgeRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Replaces the record set.
    pub fn replace(&self, records: Vec<KnowledgeRecord>) {
        if let Ok(mut guard) = self.records.write() {
            *guard = records;
        }
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn approved_records(&self) -> Result<Vec<KnowledgeRecord>> {
        Ok(self
            .records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|rec| rec.is_approved())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
