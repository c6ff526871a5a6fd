use axum::{debug_handler, extract::{Query, State}, response::{IntoResponse, Redirect, Response}};
use serde::Deserialize;

use crate::auth::SessionState;
use crate::models::SortOrder;
use crate::posts::{self, feed, FeedFilter, FeedScope};
use crate::state::lock;
use crate::{include_res, profiles, res, AppResult, AppState};

#[derive(Deserialize)]
pub struct IndexQuery {
    scope: Option<FeedScope>,
    order: Option<SortOrder>,
    #[serde(default)]
    q: String,
    images: Option<String>,
}

/// Top bar for a signed-in user: name, avatar and the session buttons.
pub fn header(session: &SessionState) -> String {
    if session.identity.is_none() {
        return String::new();
    }
    let profile = &session.profile;
    let identity = if profile.username.is_empty() {
        String::new()
    } else {
        format!(
            r#"<span class="identity"><span>{}</span>{}</span>"#,
            res::escape(&profile.username),
            res::avatar(Some(profile.avatar_url.as_str())),
        )
    };
    include_res!(str, "/pages/header.html").replace("{identity}", &identity)
}

#[debug_handler]
pub async fn index(
    State(state): State<AppState>,
    Query(query): Query<IndexQuery>,
) -> AppResult<Response> {
    let session = state.session.snapshot();
    let Some(identity) = session.identity.clone() else {
        return Ok(Redirect::to("/login").into_response());
    };

    {
        let mut feed = lock(&state.ui.feed);
        if let Some(scope) = query.scope {
            feed.set_scope(scope);
        }
        if let Some(order) = query.order {
            feed.set_order(order);
        }
    }
    feed::load(&state.ui.feed, state.services.store.as_ref(), identity.id).await;

    let mut body = String::new();
    if session.show_profile_editor() {
        let editor = state.ui.profile_editor.lock().await;
        body += &profiles::overlay(&editor, &session.profile.username, !session.needs_profile_setup());
    }
    body += &posts::render_composer(&*state.ui.composer.lock().await);

    let filter = FeedFilter {
        search: query.q,
        images_only: query.images.is_some(),
    };
    body += &posts::render_feed(&lock(&state.ui.feed), &filter);

    Ok(res::page("Home", &header(&session), &body).into_response())
}
