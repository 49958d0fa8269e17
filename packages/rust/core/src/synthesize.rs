//! Synthesis step: answer from the article and classify the answer.
//!
//! The model is told to end its reply with a `RELEVANT` / `IRRELEVANT` line.
//! That line decides routing and never reaches the user.

use std::path::Path;
use std::sync::LazyLock;

use kbanswer_llm::LlmClient;
use kbanswer_shared::KbAnswerError;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::prompt::PromptTemplate;
use crate::state::{Patch, PipelineState, StateUpdate};

/// Optional label in front of the marker, e.g. `Classification: RELEVANT`.
static MARKER_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(classification|classificação|classificacao|status)\s*:").unwrap()
});

/// Markdown decoration allowed around a marker.
const DECORATION: &[char] = &['*', '_', '`', '[', ']', '#', '.'];

/// Classification the model gave its own answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    Relevant,
    Irrelevant,
}

impl Relevance {
    pub fn is_relevant(self) -> bool {
        matches!(self, Self::Relevant)
    }
}

/// Model's reply split into the visible answer and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedAnswer {
    pub answer: String,
    /// `None` when the reply carried no marker line.
    pub marker: Option<Relevance>,
}

impl ClassifiedAnswer {
    /// Relevance used for routing; an unmarked reply counts as relevant.
    pub fn relevance(&self) -> Relevance {
        self.marker.unwrap_or(Relevance::Relevant)
    }
}

fn strip_decoration(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || DECORATION.contains(&c))
}

/// Classify one line, if it is a marker line.
fn marker_line(line: &str) -> Option<Relevance> {
    let mut rest = strip_decoration(line);
    if let Some(label) = MARKER_LABEL.find(rest) {
        rest = strip_decoration(&rest[label.end()..]);
    }

    if rest.eq_ignore_ascii_case("relevant") {
        Some(Relevance::Relevant)
    } else if rest.eq_ignore_ascii_case("irrelevant") {
        Some(Relevance::Irrelevant)
    } else {
        None
    }
}

/// Split a model reply into answer text and classification marker.
///
/// Marker lines are removed; the last one decides. Text mentioning the words
/// inside a sentence is not a marker.
pub fn parse_classification(reply: &str) -> ClassifiedAnswer {
    let mut marker = None;
    let mut kept: Vec<&str> = Vec::new();

    for line in reply.lines() {
        match marker_line(line) {
            Some(found) => marker = Some(found),
            None => kept.push(line),
        }
    }

    ClassifiedAnswer {
        answer: kept.join("\n").trim().to_string(),
        marker,
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// What the synthesis step needs besides the state.
#[derive(Debug, Clone, Copy)]
pub struct AnswerContext<'a> {
    /// `None` when no API key was configured.
    pub llm: Option<&'a LlmClient>,
    /// Custom prompt template; the built-in one otherwise.
    pub prompt_file: Option<&'a Path>,
    /// Env var named in the missing-key message.
    pub api_key_env: &'a str,
}

/// An answer the user sees in place of a model reply; always escalates.
fn escalate(message: impl Into<String>) -> StateUpdate {
    StateUpdate {
        final_response: Patch::Set(message.into()),
        token_usage: Patch::Clear,
        is_kb_relevant: Patch::Set(false),
        needs_consultant: Patch::Set(true),
        ..Default::default()
    }
}

/// Ask the model to answer `user_query` from `raw_text_content`.
///
/// Never fails: configuration and model errors become the visible answer and
/// send the ticket to an attendant.
#[instrument(skip_all, fields(run_id = %state.run_id))]
pub async fn generate_answer(state: &PipelineState, ctx: &AnswerContext<'_>) -> StateUpdate {
    if let Some(err) = &state.error {
        debug!(error = %err, "no answer after earlier failure");
        return escalate(format!("Unable to generate an answer: {err}"));
    }

    let document = state.raw_text_content.as_deref().unwrap_or("");
    if document.is_empty() {
        return escalate(
            "No document content was found to ground the answer. \
             Check the question or the reference returned by the search.",
        );
    }

    let Some(llm) = ctx.llm else {
        warn!(env = ctx.api_key_env, "LLM API key not set");
        return escalate(format!(
            "[config] LLM API key not set. Set the {} environment variable.",
            ctx.api_key_env
        ));
    };

    let template = match PromptTemplate::resolve(ctx.prompt_file) {
        Ok(t) => t,
        Err(KbAnswerError::Config { message }) => return escalate(format!("[config] {message}")),
        Err(e) => return escalate(format!("[config] failed to read prompt: {e}")),
    };
    let prompt = template.render(document, &state.user_query);

    let completion = match llm.invoke(&prompt.system, &prompt.user).await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "answer generation failed");
            return escalate(format!("Error generating answer with the LLM: {e}"));
        }
    };

    let classified = parse_classification(&completion.text);
    let relevance = classified.relevance();

    info!(
        model = %completion.model,
        relevant = relevance.is_relevant(),
        marker_found = classified.marker.is_some(),
        total_tokens = completion.usage.total_tokens,
        "answer generated"
    );

    StateUpdate {
        final_response: Patch::Set(classified.answer),
        token_usage: Patch::Set(completion.usage),
        is_kb_relevant: Patch::Set(relevance.is_relevant()),
        needs_consultant: Patch::Set(!relevance.is_relevant()),
        ..Default::default()
    }
}
