pub mod editor;
mod page;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use editor::{avatar_path, ProfileEditor, AVATAR_BUCKET};
pub use page::overlay;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profile", get(page::open).post(page::save))
        .route("/profile/close", post(page::close))
}
