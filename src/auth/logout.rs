use axum::{debug_handler, extract::State, response::Redirect};

use crate::AppState;

/// Local state is cleared even when the backend call fails.
#[debug_handler]
pub(crate) async fn logout(State(state): State<AppState>) -> Redirect {
    if let Err(e) = state.session.sign_out().await {
        tracing::debug!("signed out locally after backend failure: {e}");
    }
    state.ui.reset().await;
    Redirect::to("/login")
}
