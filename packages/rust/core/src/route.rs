//! Routing after synthesis, and the two terminal steps.
//!
//! Both terminal steps only log and record where the ticket went. Delivery to
//! a chat channel or a ticketing queue is left to the caller.

use tracing::{info, instrument};

use crate::state::{Patch, PipelineState, Route, StateUpdate};

/// `ForwardToUser` only when the answer was explicitly classified relevant.
pub fn decide_next(state: &PipelineState) -> Route {
    match state.is_kb_relevant {
        Some(true) => Route::ForwardToUser,
        _ => Route::ForwardToAttendant,
    }
}

#[instrument(skip_all, fields(run_id = %state.run_id))]
pub fn forward_to_user(state: &PipelineState) -> StateUpdate {
    info!(
        kb_id = state.kb_id.as_deref().unwrap_or("<none>"),
        "answer forwarded to user"
    );
    StateUpdate {
        route: Patch::Set(Route::ForwardToUser),
        ..Default::default()
    }
}

#[instrument(skip_all, fields(run_id = %state.run_id))]
pub fn forward_to_attendant(state: &PipelineState) -> StateUpdate {
    info!(
        kb_id = state.kb_id.as_deref().unwrap_or("<none>"),
        error = state.error.as_deref().unwrap_or(""),
        "ticket forwarded to attendant"
    );
    StateUpdate {
        route: Patch::Set(Route::ForwardToAttendant),
        ..Default::default()
    }
}

/// Run the terminal step for `route`.
pub fn run_terminal(route: Route, state: &PipelineState) -> StateUpdate {
    match route {
        Route::ForwardToUser => forward_to_user(state),
        Route::ForwardToAttendant => forward_to_attendant(state),
    }
}
