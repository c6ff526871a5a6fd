use axum::{debug_handler, extract::{Multipart, State}, response::Redirect};

use crate::{form::FormData, include_res, res, AppResult, AppState};

use super::ProfileEditor;

const CLOSE_BUTTON: &str =
    r#"<button type="submit" formaction="/profile/close" formnovalidate>Close</button>"#;

/// Overlay markup. Without a completed profile it cannot be dismissed.
pub fn overlay(editor: &ProfileEditor, username: &str, closable: bool) -> String {
    let username = if editor.username.is_empty() { username } else { editor.username.as_str() };
    include_res!(str, "/pages/profile_modal.html")
        .replace("{username}", &res::escape(username))
        .replace("{error}", &res::error_line(editor.error.as_deref()))
        .replace("{close}", if closable { CLOSE_BUTTON } else { "" })
}

#[debug_handler]
pub(crate) async fn open(State(state): State<AppState>) -> Redirect {
    state.session.open_profile_editor();
    Redirect::to("/")
}

#[debug_handler]
pub(crate) async fn close(State(state): State<AppState>) -> Redirect {
    if !state.session.snapshot().needs_profile_setup() {
        state.session.close_profile_editor();
        *state.ui.profile_editor.lock().await = ProfileEditor::default();
    }
    Redirect::to("/")
}

#[debug_handler]
pub(crate) async fn save(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<Redirect> {
    let Some(identity) = state.session.identity() else {
        return Ok(Redirect::to("/login"));
    };
    let mut form = FormData::read(multipart).await?;
    let image = form.take_file("avatar");

    let saved = {
        let mut editor = state.ui.profile_editor.lock().await;
        let saved = editor
            .save(&state.services, &identity, form.text("username"), image)
            .await
            .is_ok();
        if saved {
            *editor = ProfileEditor::default();
        }
        saved
    };

    if saved {
        state.session.profile_saved().await;
    }
    Ok(Redirect::to("/"))
}
