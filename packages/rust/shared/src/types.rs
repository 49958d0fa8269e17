//! Core domain types shared by the lookup, llm, and core crates.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// KbRecord
// ---------------------------------------------------------------------------

/// One row of the lookup table: ties a search-API source id to a KB code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbRecord {
    /// Internal row identifier.
    pub id: u32,
    /// Human-readable knowledge-base code (e.g. `KB0034986`).
    pub kb_id: String,
    /// Opaque source identifier returned by the search API.
    pub source_id: String,
    /// Search index the source id belongs to.
    pub index_id: String,
}

// ---------------------------------------------------------------------------
// RetrievedDocument
// ---------------------------------------------------------------------------

/// The document an answer was grounded on, returned to the caller with the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    /// Knowledge-base code resolved through the lookup table.
    pub kb_id: String,
    /// File name without extension.
    pub doc_title: String,
    /// Full path of the local file.
    pub doc_path: String,
    /// Source id chosen by the search step.
    pub source_id: String,
    /// `fromDocument` of the winning result group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_document: Option<String>,
    /// Highest similarity score seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    /// Short excerpt from the matching chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

// ---------------------------------------------------------------------------
// TokenUsage
// ---------------------------------------------------------------------------

/// Token accounting for one language model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build a usage record; the total is always `input + output`.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}
