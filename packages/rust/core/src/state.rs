//! Pipeline state and the partial updates steps produce.
//!
//! One [`PipelineState`] lives for one question. Steps never mutate it
//! directly: each returns a [`StateUpdate`] naming only the fields it changes,
//! and the pipeline merges it with [`PipelineState::apply`].

use kbanswer_shared::{RetrievedDocument, TokenUsage};
use serde::Serialize;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Route
// ---------------------------------------------------------------------------

/// Terminal step chosen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Answer is grounded in the KB article; send it to the end user.
    ForwardToUser,
    /// Hand the ticket to a human attendant.
    ForwardToAttendant,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForwardToUser => "forward_to_user",
            Self::ForwardToAttendant => "forward_to_attendant",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Everything known about one question as it moves through the pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineState {
    /// The user's question.
    pub user_query: String,
    /// UUID v7 tagging this invocation in logs.
    pub run_id: String,
    /// Source id of the best-scoring chunk.
    pub doc_reference: Option<String>,
    /// Every distinct source id the search returned.
    pub doc_references: Vec<String>,
    /// `fromDocument` of the best result group.
    pub from_document: Option<String>,
    pub best_similarity_score: Option<f64>,
    pub best_chunks_snippet: Option<String>,
    /// KB code resolved from `doc_reference`.
    pub kb_id: Option<String>,
    /// Full text of the local document.
    #[serde(skip_serializing)]
    pub raw_text_content: Option<String>,
    pub retrieved_document: Option<RetrievedDocument>,
    /// Answer shown to the caller (or the explanation of why there is none).
    pub final_response: Option<String>,
    pub token_usage: Option<TokenUsage>,
    /// Last step failure, if any.
    pub error: Option<String>,
    pub is_kb_relevant: Option<bool>,
    pub needs_consultant: Option<bool>,
    /// Terminal step that ran.
    pub route: Option<Route>,
}

impl PipelineState {
    /// Fresh state for `user_query` with a new run id.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            run_id: Uuid::now_v7().to_string(),
            ..Default::default()
        }
    }

    /// Merge a step's partial update.
    pub fn apply(&mut self, update: StateUpdate) {
        update.doc_reference.apply_to(&mut self.doc_reference);
        match update.doc_references {
            Patch::Keep => {}
            Patch::Set(refs) => self.doc_references = refs,
            Patch::Clear => self.doc_references.clear(),
        }
        update.from_document.apply_to(&mut self.from_document);
        update
            .best_similarity_score
            .apply_to(&mut self.best_similarity_score);
        update
            .best_chunks_snippet
            .apply_to(&mut self.best_chunks_snippet);
        update.kb_id.apply_to(&mut self.kb_id);
        update.raw_text_content.apply_to(&mut self.raw_text_content);
        update
            .retrieved_document
            .apply_to(&mut self.retrieved_document);
        update.final_response.apply_to(&mut self.final_response);
        update.token_usage.apply_to(&mut self.token_usage);
        update.error.apply_to(&mut self.error);
        update.is_kb_relevant.apply_to(&mut self.is_kb_relevant);
        update.needs_consultant.apply_to(&mut self.needs_consultant);
        update.route.apply_to(&mut self.route);
    }

    /// Whether an earlier step failed.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// StateUpdate
// ---------------------------------------------------------------------------

/// How a step changes one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    /// Leave the field as it is.
    Keep,
    /// Overwrite the field.
    Set(T),
    /// Reset the field to empty.
    Clear,
}

// Manual impl: a derived one would demand `T: Default`.
impl<T> Default for Patch<T> {
    fn default() -> Self {
        Self::Keep
    }
}

impl<T> Patch<T> {
    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Self::Keep => {}
            Self::Set(value) => *slot = Some(value),
            Self::Clear => *slot = None,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Set(v),
            None => Self::Clear,
        }
    }
}

/// Fields a step wants to change. Everything defaults to [`Patch::Keep`].
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub doc_reference: Patch<String>,
    pub doc_references: Patch<Vec<String>>,
    pub from_document: Patch<String>,
    pub best_similarity_score: Patch<f64>,
    pub best_chunks_snippet: Patch<String>,
    pub kb_id: Patch<String>,
    pub raw_text_content: Patch<String>,
    pub retrieved_document: Patch<RetrievedDocument>,
    pub final_response: Patch<String>,
    pub token_usage: Patch<TokenUsage>,
    pub error: Patch<String>,
    pub is_kb_relevant: Patch<bool>,
    pub needs_consultant: Patch<bool>,
    pub route: Patch<Route>,
}

impl StateUpdate {
    /// An update that only records a failure.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Patch::Set(message.into()),
            ..Default::default()
        }
    }
}
