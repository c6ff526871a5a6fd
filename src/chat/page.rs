use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::Message;
use crate::state::lock;
use crate::{include_res, index, res, AppState, ClientError};

use super::{ChatPanel, ChatView};

/// The open panel for `me`, opening a fresh one if needed.
pub(crate) async fn panel_for(state: &AppState, me: Uuid) -> Result<Arc<ChatPanel>, ClientError> {
    if let Some(panel) = state.ui.chat().filter(|panel| panel.me() == me) {
        return Ok(panel);
    }
    let panel = Arc::new(ChatPanel::open(&state.services, me).await?);
    *lock(&state.ui.chat) = Some(panel.clone());
    Ok(panel)
}

fn peers(view: &ChatView) -> String {
    let items: String = view
        .peers
        .iter()
        .map(|peer| {
            format!(
                r#"<li><a href="/chat/{}">{}<span>{}</span></a></li>"#,
                peer.id,
                res::avatar(peer.avatar_url.as_deref()),
                res::escape(&peer.display_name()),
            )
        })
        .collect();
    format!(
        r#"<h2>Select a user to chat with</h2>{}<ul class="peers">{items}</ul>"#,
        res::error_line(view.error.as_deref()),
    )
}

fn message(message: &Message, me: Uuid) -> String {
    let class = if message.sender_id == me { "message mine" } else { "message" };
    format!(
        r#"<div id="m{}" class="{class}"><span>{}</span></div>"#,
        message.id,
        res::escape(&message.content),
    )
}

fn conversation(view: &ChatView, me: Uuid) -> String {
    let Some(peer) = &view.peer else {
        return peers(view);
    };
    let messages = if view.loading {
        "<div>Loading...</div>".to_owned()
    } else {
        view.messages.iter().map(|m| message(m, me)).collect()
    };

    include_res!(str, "/pages/chat/conversation.html")
        .replace("{avatar}", &res::avatar(peer.avatar_url.as_deref()))
        .replace("{peer_id}", &peer.id.to_string())
        .replace("{me}", &me.to_string())
        .replace("{messages}", &messages)
        .replace("{error}", &res::error_line(view.error.as_deref()))
        .replace("{peer_name}", &res::escape(&peer.display_name()))
}

fn render(state: &AppState, view: &ChatView, me: Uuid) -> Html<String> {
    let body = include_res!(str, "/pages/chat/panel.html").replace("{body}", &conversation(view, me));
    res::page("Messages", &index::header(&state.session.snapshot()), &body)
}

/// The panel could not be opened at all: an empty peer list with the reason.
fn unavailable(state: &AppState, error: ClientError, me: Uuid) -> Html<String> {
    tracing::warn!(user = %me, "failed to open chat: {error}");
    let view = ChatView {
        error: Some(error.to_string()),
        ..Default::default()
    };
    render(state, &view, me)
}

#[debug_handler]
pub(crate) async fn chat(State(state): State<AppState>) -> Response {
    let Some(identity) = state.session.identity() else {
        return Redirect::to("/login").into_response();
    };
    let panel = match panel_for(&state, identity.id).await {
        Ok(panel) => panel,
        Err(e) => return unavailable(&state, e, identity.id).into_response(),
    };
    panel.back();
    render(&state, &panel.view(), identity.id).into_response()
}

#[debug_handler]
pub(crate) async fn conversation_page(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
) -> Response {
    let Some(identity) = state.session.identity() else {
        return Redirect::to("/login").into_response();
    };
    let panel = match panel_for(&state, identity.id).await {
        Ok(panel) => panel,
        Err(e) => return unavailable(&state, e, identity.id).into_response(),
    };
    if panel.selected() != Some(peer_id) {
        // failures are kept on the panel and rendered below
        let _ = panel.select_peer(peer_id).await;
    }
    render(&state, &panel.view(), identity.id).into_response()
}

#[derive(Deserialize)]
pub(crate) struct SendForm {
    #[serde(default)]
    content: String,
}

#[debug_handler]
pub(crate) async fn send(
    State(state): State<AppState>,
    Path(peer_id): Path<Uuid>,
    Form(SendForm { content }): Form<SendForm>,
) -> Response {
    let Some(panel) = state.ui.chat() else {
        return Redirect::to("/chat").into_response();
    };
    if panel.selected() == Some(peer_id) {
        if let Err(e) = panel.send(&content).await {
            tracing::warn!(peer = %peer_id, "failed to send message: {e}");
            let page = render(&state, &panel.view(), panel.me());
            return (StatusCode::UNPROCESSABLE_ENTITY, page).into_response();
        }
    }
    Redirect::to(&format!("/chat/{peer_id}")).into_response()
}

/// Dropping the panel releases its subscription.
#[debug_handler]
pub(crate) async fn close(State(state): State<AppState>) -> Redirect {
    let panel = lock(&state.ui.chat).take();
    drop(panel);
    Redirect::to("/")
}
