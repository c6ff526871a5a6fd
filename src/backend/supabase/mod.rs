//! Client for a hosted Supabase project: GoTrue auth, PostgREST tables,
//! storage buckets and the realtime websocket.

mod auth;
mod realtime;
mod rest;
mod storage;

use std::sync::RwLock;

use reqwest::{RequestBuilder, Response, Url};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;

use crate::backend::{AuthEvent, BackendError, BackendResult};
use crate::config::ConfigError;
use crate::models::AuthSession;

const AUTH_EVENT_CAPACITY: usize = 16;
/// Access tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN: Duration = Duration::seconds(60);

pub struct SupabaseClient {
    http: reqwest::Client,
    base: Url,
    anon_key: String,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(http: reqwest::Client, url: &str, anon_key: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: url.to_owned(),
            reason,
        };
        let base = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("not a base url".to_owned()));
        }

        Ok(SupabaseClient {
            http,
            base,
            anon_key: anon_key.to_owned(),
            session: RwLock::new(None),
            events: broadcast::channel(AUTH_EVENT_CAPACITY).0,
        })
    }

    /// `{base}/{segments...}`, each segment percent-encoded.
    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn current_session(&self) -> Option<AuthSession> {
        self.session.read().ok().and_then(|session| session.clone())
    }

    fn replace_session(&self, session: Option<AuthSession>) {
        if let Ok(mut slot) = self.session.write() {
            *slot = session;
        }
    }

    fn emit(&self, event: AuthEvent) {
        tracing::debug!(?event, "auth state changed");
        let _ = self.events.send(event);
    }

    /// Token to authorize table, storage and realtime calls with. Falls back
    /// to the anon key when nobody is signed in.
    async fn access_token(&self) -> BackendResult<String> {
        let Some(session) = self.current_session() else {
            return Ok(self.anon_key.clone());
        };

        let expiring = session
            .expires_at
            .is_some_and(|at| at - OffsetDateTime::now_utc() < REFRESH_MARGIN);
        if !expiring {
            return Ok(session.access_token);
        }

        self.refresh_tokens().await?;
        Ok(self
            .current_session()
            .map(|session| session.access_token)
            .unwrap_or_else(|| self.anon_key.clone()))
    }

    fn with_key(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
    }
}

/// Passes successful responses through and turns failures into
/// [`BackendError::Api`] carrying the backend's own message.
async fn check(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.to_string()
        } else {
            body
        }
    });
    tracing::debug!(status = status.as_u16(), %message, "backend rejected request");
    Err(BackendError::api(status.as_u16(), message))
}

fn error_message(body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(body).ok()?;
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::to_owned)
}
