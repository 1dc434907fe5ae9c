//! Search result payloads.

use super::RecordId;
use serde::{Deserialize, Serialize};

/// Maximum number of records any search returns.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Cached cascade result.
///
/// Holds record ids only, never record content: cached entries must not
/// drift from the source of truth, so consumers re-hydrate records by id
/// and preserve this ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSearch {
    /// Matching record ids, most relevant first.
    #[serde(rename = "qa_ids")]
    pub ids: Vec<RecordId>,
    /// Whether the cascade found anything.
    pub found: bool,
}

impl CachedSearch {
    /// Builds a cache payload from an ordered id list.
    ///
    /// Only non-empty cascade results are ever cached, so this is the sole
    /// constructor; empty results are recomputed on every ask.
    #[must_use]
    pub fn hit(ids: Vec<RecordId>) -> Self {
        Self { ids, found: true }
    }
}
