#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blogweb::backend::memory::{MemoryBackend, MemoryClient};
use blogweb::backend::{AuthService, BackendResult, Services, Store};
use blogweb::generate::{GenerationError, TextGenerator};
use blogweb::models::{Credentials, Identity, Message, NewMessage, NewPost, Post, PostQuery, Profile};
use tokio::sync::Notify;
use uuid::Uuid;

/// Answers every prompt with a fixed reply and remembers the prompts.
#[derive(Default)]
pub struct ScriptedGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(ScriptedGenerator {
            reply: Some(text.to_owned()),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(ScriptedGenerator::default())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        self.reply.clone().ok_or(GenerationError::Status(503))
    }
}

pub fn services(client: Arc<MemoryClient>) -> Services {
    Services::from_backend(client, ScriptedGenerator::failing())
}

/// Memory store that holds back reads about one user until [`GatedStore::open`].
/// Profile fetches for that user and conversations with them both wait.
pub struct GatedStore {
    inner: Arc<MemoryClient>,
    held: Uuid,
    gate: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryClient>, held: Uuid) -> Arc<Self> {
        Arc::new(GatedStore {
            inner,
            held,
            gate: Notify::new(),
        })
    }

    pub fn open(&self) {
        self.gate.notify_one();
    }

    /// `client` everywhere, except that the store goes through `self`.
    pub fn services(self: &Arc<Self>, client: Arc<MemoryClient>) -> Services {
        Services {
            store: self.clone(),
            ..services(client)
        }
    }
}

#[async_trait]
impl Store for GatedStore {
    async fn fetch_profile(&self, id: Uuid) -> BackendResult<Option<Profile>> {
        if id == self.held {
            self.gate.notified().await;
        }
        self.inner.fetch_profile(id).await
    }

    async fn upsert_profile(&self, profile: &Profile) -> BackendResult<()> {
        self.inner.upsert_profile(profile).await
    }

    async fn list_profiles_except(&self, id: Uuid) -> BackendResult<Vec<Profile>> {
        self.inner.list_profiles_except(id).await
    }

    async fn list_posts(&self, query: &PostQuery) -> BackendResult<Vec<Post>> {
        self.inner.list_posts(query).await
    }

    async fn insert_post(&self, post: &NewPost) -> BackendResult<()> {
        self.inner.insert_post(post).await
    }

    async fn conversation(&self, a: Uuid, b: Uuid) -> BackendResult<Vec<Message>> {
        if a == self.held || b == self.held {
            self.gate.notified().await;
        }
        self.inner.conversation(a, b).await
    }

    async fn insert_message(&self, message: &NewMessage) -> BackendResult<()> {
        self.inner.insert_message(message).await
    }
}

pub fn credentials(email: &str) -> Credentials {
    Credentials {
        email: email.to_owned(),
        password: "correct horse".to_owned(),
    }
}

/// A client signed in as a fresh account.
pub async fn signed_in(backend: &MemoryBackend, email: &str) -> (Arc<MemoryClient>, Identity) {
    let client = backend.connect();
    client.sign_up(&credentials(email)).await.unwrap();
    let identity = client.sign_in(&credentials(email)).await.unwrap();
    (client, identity)
}

/// Like [`signed_in`], with a completed profile named `username`.
pub async fn with_profile(backend: &MemoryBackend, username: &str) -> (Arc<MemoryClient>, Identity) {
    let (client, identity) = signed_in(backend, &format!("{username}@example.com")).await;
    client
        .upsert_profile(&Profile {
            id: identity.id,
            username: Some(username.to_owned()),
            avatar_url: None,
            is_modal: true,
        })
        .await
        .unwrap();
    (client, identity)
}

/// Polls `check` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
