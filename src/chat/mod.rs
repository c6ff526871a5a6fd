pub mod panel;
mod page;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use panel::{ChatEvent, ChatPanel, ChatView};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat", get(page::chat))
        .route("/chat/ws", get(ws::chat_ws))
        .route("/chat/close", post(page::close))
        .route("/chat/{peer}", get(page::conversation_page).post(page::send))
}
