//! Knowledge record types and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a knowledge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Curation status of a knowledge record.
///
/// Only `Approved` records are eligible for retrieval. Status transitions
/// are owned by the curation workflow, not by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// Awaiting curator review.
    #[default]
    Pending,
    /// Reviewed and eligible for retrieval.
    Approved,
    /// Rejected by a curator.
    Rejected,
    /// Captured from an escalation that nobody has answered yet.
    Unanswered,
}

impl RecordStatus {
    /// Returns the status as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Unanswered => "unanswered",
        }
    }
}

/// A curated question/answer record.
///
/// Owned by the persistence collaborator; the search pipeline treats it as
/// an immutable read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    /// Unique identifier.
    pub id: RecordId,
    /// The question as entered by a curator.
    pub question: String,
    /// The answer as entered by a curator.
    pub answer: String,
    /// Optional cleaned-up question variant.
    pub question_processed: Option<String>,
    /// Optional cleaned-up answer variant.
    pub answer_processed: Option<String>,
    /// Current curation status.
    pub status: RecordStatus,
    /// Search keywords associated with this record.
    pub keywords: Vec<String>,
    /// Creation timestamp (Unix epoch seconds).
    pub created_at: u64,
    /// Approval timestamp (Unix epoch seconds), if approved.
    pub approved_at: Option<u64>,
}

impl KnowledgeRecord {
    /// Returns the processed question when present, the raw question otherwise.
    #[must_use]
    pub fn display_question(&self) -> &str {
        self.question_processed.as_deref().unwrap_or(&self.question)
    }

    /// Returns the processed answer when present, the raw answer otherwise.
    #[must_use]
    pub fn display_answer(&self) -> &str {
        self.answer_processed.as_deref().unwrap_or(&self.answer)
    }

    /// Returns true if this record is eligible for retrieval.
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self.status, RecordStatus::Approved)
    }
}
