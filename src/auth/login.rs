use axum::{debug_handler, extract::{Query, State}, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;

use crate::{include_res, res, AppResult, AppState};

use super::{CredentialForm, CredentialMode, CredentialOutcome};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    #[serde(default)]
    pub(crate) mode: CredentialMode,
}

#[derive(Deserialize)]
pub(crate) struct LoginForm {
    #[serde(default)]
    mode: CredentialMode,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn render(form: &CredentialForm) -> Html<String> {
    let body = include_res!(str, "/pages/login.html")
        .replace("{mode_label}", form.mode.label())
        .replace("{mode}", form.mode.as_str())
        .replace("{email}", &res::escape(&form.email))
        .replace("{error}", &res::error_line(form.error.as_deref()))
        .replace("{other_mode}", form.mode.toggled().as_str())
        .replace("{toggle_label}", form.mode.toggle_label());
    res::page(form.mode.label(), "", &body)
}

#[debug_handler]
pub(crate) async fn login_page(
    State(state): State<AppState>,
    Query(LoginQuery { mode }): Query<LoginQuery>,
) -> Response {
    if state.session.identity().is_some() {
        return Redirect::to("/").into_response();
    }
    render(&CredentialForm::new(mode)).into_response()
}

#[debug_handler]
pub(crate) async fn login(
    State(state): State<AppState>,
    Form(LoginForm { mode, email, password }): Form<LoginForm>,
) -> AppResult<Response> {
    let mut form = CredentialForm::new(mode);
    let identity = match form.submit(state.services.auth.as_ref(), &email, &password).await {
        Ok(CredentialOutcome::SignedIn(identity)) => identity,
        Ok(CredentialOutcome::SignedUp(Some(identity))) => identity,
        Ok(CredentialOutcome::SignedUp(None)) | Err(_) => {
            return Ok(render(&form).into_response());
        }
    };

    state.session.signed_in(identity).await;
    Ok(Redirect::to("/").into_response())
}
