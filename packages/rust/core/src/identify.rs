//! Identification step: ask the search API which document answers the question.

use kbanswer_search::{SearchClient, SearchParams, select_best};
use tracing::{info, instrument, warn};

use crate::state::{Patch, PipelineState, StateUpdate};

/// Query the search API and record the best-scoring chunk's source id.
///
/// Never fails: an empty question or an API failure is stored in `error`
/// and the reference fields are cleared.
#[instrument(skip_all, fields(run_id = %state.run_id))]
pub async fn call_search(
    state: &PipelineState,
    client: &SearchClient,
    params: &SearchParams,
) -> StateUpdate {
    if state.user_query.trim().is_empty() {
        return StateUpdate {
            error: Patch::Set("user query must not be empty".into()),
            doc_reference: Patch::Clear,
            doc_references: Patch::Clear,
            ..Default::default()
        };
    }

    let response = match client.search(&state.user_query, params).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "search API call failed");
            return StateUpdate {
                error: Patch::Set(format!("search API call failed: {e}")),
                doc_reference: Patch::Clear,
                doc_references: Patch::Clear,
                ..Default::default()
            };
        }
    };

    let selection = select_best(&response);

    match &selection.best {
        Some(best) => info!(
            source_id = best.source_id.as_deref().unwrap_or("<none>"),
            score = best.score,
            candidates = selection.source_ids.len(),
            "best chunk selected"
        ),
        None => info!("search returned no scored chunks"),
    }

    let best = selection.best;
    StateUpdate {
        doc_reference: best.as_ref().and_then(|b| b.source_id.clone()).into(),
        doc_references: Patch::Set(selection.source_ids),
        from_document: best.as_ref().and_then(|b| b.from_document.clone()).into(),
        best_similarity_score: best.as_ref().map(|b| b.score).into(),
        best_chunks_snippet: best.and_then(|b| b.snippet).into(),
        error: Patch::Clear,
        ..Default::default()
    }
}
