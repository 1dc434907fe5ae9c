//! Core domain types.

mod agent;
mod record;
mod search;

pub use agent::{IntentAnalysis, QuestionOutcome, SynthesisVerdict};
pub use record::{KnowledgeRecord, RecordId, RecordStatus};
pub use search::{CachedSearch, MAX_SEARCH_RESULTS};
