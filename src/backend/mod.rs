//! Seams to the hosted backend: auth, relational store, object storage and
//! the realtime change feed.
//!
//! Components never reach a backend directly. They receive a [`Services`]
//! bundle built once at startup, either over [`supabase::SupabaseClient`] or
//! over the in-process [`memory::MemoryBackend`].

pub mod memory;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::generate::TextGenerator;
use crate::models::{Credentials, Identity, Message, NewMessage, NewPost, Post, PostQuery, Profile, Upload};

pub const PROFILES: &str = "profiles";
pub const POSTS: &str = "posts";
pub const MESSAGES: &str = "messages";

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Rejection reported by the backend. Displays the backend's own text.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("not signed in")]
    NotSignedIn,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("realtime: {0}")]
    Realtime(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        BackendError::Api {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
    TokenRefreshed(Identity),
}

impl AuthEvent {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            AuthEvent::SignedIn(identity) | AuthEvent::TokenRefreshed(identity) => Some(identity),
            AuthEvent::SignedOut => None,
        }
    }
}

#[async_trait]
pub trait AuthService: Send + Sync {
    /// Returns the new identity when the backend signs the user in right away.
    async fn sign_up(&self, credentials: &Credentials) -> BackendResult<Option<Identity>>;
    async fn sign_in(&self, credentials: &Credentials) -> BackendResult<Identity>;
    async fn sign_out(&self) -> BackendResult<()>;
    async fn current_user(&self) -> BackendResult<Option<Identity>>;
    async fn refresh_session(&self) -> BackendResult<Option<Identity>>;
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_profile(&self, id: Uuid) -> BackendResult<Option<Profile>>;
    /// Insert-or-replace keyed by `profile.id`.
    async fn upsert_profile(&self, profile: &Profile) -> BackendResult<()>;
    async fn list_profiles_except(&self, id: Uuid) -> BackendResult<Vec<Profile>>;
    async fn list_posts(&self, query: &PostQuery) -> BackendResult<Vec<Post>>;
    async fn insert_post(&self, post: &NewPost) -> BackendResult<()>;
    /// Both directions of the conversation, oldest first.
    async fn conversation(&self, a: Uuid, b: Uuid) -> BackendResult<Vec<Message>>;
    async fn insert_message(&self, message: &NewMessage) -> BackendResult<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, bucket: &str, path: &str, file: &Upload) -> BackendResult<()>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[async_trait]
pub trait Realtime: Send + Sync {
    /// Row-insertion events on `table`, for as long as the subscription lives.
    async fn subscribe_inserts(&self, table: &str) -> BackendResult<Subscription>;
}

const SUBSCRIPTION_BUFFER: usize = 64;

/// Consumer end of a realtime feed. Dropping it releases the feed.
#[derive(Debug)]
pub struct Subscription {
    rows: mpsc::Receiver<Value>,
    _release: oneshot::Sender<()>,
}

/// Producer end handed to whatever drives the feed. `released` resolves once
/// the [`Subscription`] is dropped.
#[derive(Debug)]
pub struct SubscriptionSink {
    pub rows: mpsc::Sender<Value>,
    pub released: oneshot::Receiver<()>,
}

impl Subscription {
    pub fn channel() -> (SubscriptionSink, Subscription) {
        let (rows_tx, rows_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (release_tx, release_rx) = oneshot::channel();
        (
            SubscriptionSink {
                rows: rows_tx,
                released: release_rx,
            },
            Subscription {
                rows: rows_rx,
                _release: release_tx,
            },
        )
    }

    /// Next inserted row, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<Value> {
        self.rows.recv().await
    }
}

/// Everything a component may talk to, injected at construction.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthService>,
    pub store: Arc<dyn Store>,
    pub storage: Arc<dyn ObjectStorage>,
    pub realtime: Arc<dyn Realtime>,
    pub generator: Arc<dyn TextGenerator>,
}

impl Services {
    pub fn from_backend<B>(backend: Arc<B>, generator: Arc<dyn TextGenerator>) -> Self
    where
        B: AuthService + Store + ObjectStorage + Realtime + 'static,
    {
        Services {
            auth: backend.clone(),
            store: backend.clone(),
            storage: backend.clone(),
            realtime: backend,
            generator,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_subscription_releases_sink() {
        let (mut sink, subscription) = Subscription::channel();
        drop(subscription);
        assert!((&mut sink.released).await.is_err());
        assert!(sink.rows.send(Value::Null).await.is_err());
    }

    #[test]
    fn api_error_displays_backend_text() {
        let err = BackendError::api(400, "Invalid login credentials");
        assert_eq!(err.to_string(), "Invalid login credentials");
    }
}
