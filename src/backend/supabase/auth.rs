use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;

use crate::backend::{AuthEvent, AuthService, BackendResult};
use crate::models::{AuthSession, Credentials, Identity};

use super::{SupabaseClient, check};

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = match (token.expires_at, token.expires_in) {
            (Some(at), _) => OffsetDateTime::from_unix_timestamp(at).ok(),
            (None, Some(secs)) => Some(OffsetDateTime::now_utc() + Duration::seconds(secs)),
            (None, None) => None,
        };
        AuthSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

impl SupabaseClient {
    async fn token_grant(&self, grant_type: &str, body: Value) -> BackendResult<AuthSession> {
        let request = self
            .http
            .post(self.endpoint(["auth", "v1", "token"]))
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let response = check(self.with_key(request, &self.anon_key).send().await?).await?;
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }

    /// Trades the refresh token for a new session. `Ok(false)` when there
    /// was no session to refresh.
    pub(super) async fn refresh_tokens(&self) -> BackendResult<bool> {
        let Some(current) = self.current_session() else {
            return Ok(false);
        };

        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": current.refresh_token }))
            .await?;
        let identity = session.user.clone();
        self.replace_session(Some(session));
        self.emit(AuthEvent::TokenRefreshed(identity));
        Ok(true)
    }

    fn start_session(&self, session: AuthSession) -> Identity {
        let identity = session.user.clone();
        tracing::info!(user = %identity.id, "signed in");
        self.replace_session(Some(session));
        self.emit(AuthEvent::SignedIn(identity.clone()));
        identity
    }
}

#[async_trait]
impl AuthService for SupabaseClient {
    async fn sign_up(&self, credentials: &Credentials) -> BackendResult<Option<Identity>> {
        let request = self
            .http
            .post(self.endpoint(["auth", "v1", "signup"]))
            .json(credentials);
        let response = check(self.with_key(request, &self.anon_key).send().await?).await?;
        let body: Value = response.json().await?;

        // Projects without email confirmation answer with a full session.
        if body.get("access_token").is_some() {
            let token: TokenResponse = serde_json::from_value(body)?;
            return Ok(Some(self.start_session(token.into())));
        }

        let user: Identity = serde_json::from_value(body)?;
        tracing::info!(user = %user.id, "signed up, awaiting confirmation");
        Ok(None)
    }

    async fn sign_in(&self, credentials: &Credentials) -> BackendResult<Identity> {
        let session = self
            .token_grant("password", serde_json::to_value(credentials)?)
            .await?;
        Ok(self.start_session(session))
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let Some(session) = self.current_session() else {
            return Ok(());
        };

        // The local session ends whatever the backend answers.
        self.replace_session(None);
        self.emit(AuthEvent::SignedOut);

        let request = self.http.post(self.endpoint(["auth", "v1", "logout"]));
        check(self.with_key(request, &session.access_token).send().await?).await?;
        Ok(())
    }

    async fn current_user(&self) -> BackendResult<Option<Identity>> {
        if self.current_session().is_none() {
            return Ok(None);
        }

        let token = self.access_token().await?;
        let request = self.http.get(self.endpoint(["auth", "v1", "user"]));
        let response = self.with_key(request, &token).send().await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            tracing::warn!("stored session was rejected, signing out locally");
            self.replace_session(None);
            self.emit(AuthEvent::SignedOut);
            return Ok(None);
        }

        let user: Identity = check(response).await?.json().await?;
        Ok(Some(user))
    }

    async fn refresh_session(&self) -> BackendResult<Option<Identity>> {
        self.refresh_tokens().await?;
        Ok(self.current_session().map(|session| session.user))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
