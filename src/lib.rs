pub mod auth;
pub mod backend;
pub mod chat;
pub mod config;
pub mod form;
pub mod generate;
pub mod index;
pub mod logging;
pub mod models;
pub mod posts;
pub mod profiles;
pub mod res;
pub mod state;

use axum::{http::StatusCode, response::{IntoResponse, Response}, routing::get, Router};
use thiserror::Error;
use tower_http::trace::TraceLayer;

use backend::BackendError;

pub use state::AppState;

/// Failure of a user action, in the kinds the UI reports differently.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A required field is missing. Nothing was sent.
    #[error("{0}")]
    Validation(String),

    /// The backend refused or could not be reached. Carries its text verbatim.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Object storage refused a post image.
    #[error("Failed to upload image: {0}")]
    Upload(BackendError),

    /// The text-generation service failed. Always a fixed message.
    #[error("{0}")]
    Generation(&'static str),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }
}

/// Every page and endpoint of the local UI.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index::index))
        .route("/style.css", get(res::stylesheet))
        .merge(auth::router())
        .merge(profiles::router())
        .merge(posts::router())
        .merge(chat::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        Self(anyhow::Error::msg(err))
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        Self(anyhow::Error::msg(err.to_owned()))
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(serde_json::Error);
apperr_impl!(axum::Error);
apperr_impl!(axum::extract::multipart::MultipartError);
apperr_impl!(BackendError);
apperr_impl!(ClientError);

/// Post bodies are written in Markdown. Raw HTML in them is shown as text.
pub struct Markdown<T>(pub T);

impl<T> Markdown<T>
where
    T: std::ops::Deref<Target = str>,
{
    pub fn to_html(&self) -> String {
        use pulldown_cmark::{Event, Options, Parser};

        let parser = Parser::new_ext(&self.0, Options::ENABLE_STRIKETHROUGH)
            .map(|event| match event {
                Event::Html(html) | Event::InlineHtml(html) => Event::Text(html),
                _ => event,
            });

        let mut html_output = String::new();
        pulldown_cmark::html::push_html(&mut html_output, parser);
        html_output.replace('{', "&#123;").replace('}', "&#125;")
    }
}
