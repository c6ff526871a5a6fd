use axum::{routing::{get, post}, Router};

use crate::AppState;

pub mod credentials;
mod login;
mod logout;
pub mod session;

pub use credentials::{CredentialForm, CredentialMode, CredentialOutcome};
pub use session::{ProfileFields, SessionManager, SessionState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::login))
        .route("/logout", post(logout::logout))
}
